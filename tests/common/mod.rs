//! Shared utilities for integration testing.
//!
//! Spawns a real dispatch worker and gateway on ephemeral ports, plus raw
//! TCP clients for the HTTP and WebSocket surfaces so the wire formats are
//! exercised byte for byte.

// Each integration binary compiles its own copy; not every helper is used
// from every binary.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use query_gateway::config::{BackendConfig, WebConfig};
use query_gateway::gateway::{MethodRegistry, QueryTranslator, WebGateway};
use query_gateway::lifecycle::Shutdown;
use query_gateway::messages::CommandRequest;
use query_gateway::worker::{CommandHandler, RequestWorker, SendWorker};

/// A running dispatch worker bound to ephemeral ports.
pub struct TestBackend {
    pub query_endpoint: String,
    pub heartbeat_endpoint: String,
    pub shutdown: Shutdown,
    _task: JoinHandle<()>,
}

fn backend_config() -> BackendConfig {
    BackendConfig {
        query_endpoint: "tcp://127.0.0.1:0".into(),
        heartbeat_endpoint: "tcp://127.0.0.1:0".into(),
        poll_interval_ms: 20,
        heartbeat_interval_ms: 100,
        ..BackendConfig::default()
    }
}

/// Start a worker with `ping` (echo), `hold` (never replies) and `slow`
/// (replies after 250 ms) commands attached.
pub async fn spawn_backend() -> TestBackend {
    let config = backend_config();
    let mut worker = RequestWorker::start(&config).await.unwrap();

    let ping: CommandHandler = Arc::new(|request: CommandRequest, sender: SendWorker| {
        let reply = request.reply(request.data());
        sender.queue_send(reply);
    });
    worker.attach("ping", ping);

    let hold: CommandHandler = Arc::new(|_request: CommandRequest, _sender: SendWorker| {});
    worker.attach("hold", hold);

    let slow: CommandHandler = Arc::new(|request: CommandRequest, sender: SendWorker| {
        let reply = request.reply(request.data());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            sender.queue_send(reply);
        });
    });
    worker.attach("slow", slow);

    let query_endpoint = format!("tcp://{}", worker.query_addr());
    let heartbeat_endpoint = format!("tcp://{}", worker.heartbeat_addr());

    let shutdown = Shutdown::new();
    let task = tokio::spawn(worker.run(shutdown.subscribe()));

    TestBackend {
        query_endpoint,
        heartbeat_endpoint,
        shutdown,
        _task: task,
    }
}

/// Start a gateway bound to an ephemeral port, with passthrough translators
/// for the given methods.
pub async fn spawn_gateway(backend: &TestBackend, methods: &[&str]) -> WebGateway {
    let web = WebConfig {
        bind_address: "127.0.0.1:0".into(),
        ..WebConfig::default()
    };

    let mut registry = MethodRegistry::new();
    for method in methods {
        registry.register(*method, QueryTranslator::passthrough(*method));
    }

    let backend_config = BackendConfig {
        query_endpoint: backend.query_endpoint.clone(),
        ..BackendConfig::default()
    };

    WebGateway::start(web, &backend_config, registry, backend.shutdown.subscribe())
        .await
        .unwrap()
}

/// POST a JSON-RPC body and return the raw response (headers and body).
pub async fn http_post_rpc(address: SocketAddr, body: &str) -> String {
    let mut stream = TcpStream::connect(address).await.unwrap();
    let request = format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// Body portion of a raw HTTP response.
pub fn response_body(response: &str) -> &str {
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

/// Minimal raw-socket websocket client.
pub struct WsClient {
    stream: TcpStream,
}

impl WsClient {
    /// Complete the upgrade handshake and return the connected client.
    pub async fn connect(address: SocketAddr) -> WsClient {
        let (client, response) =
            Self::connect_with_key(address, "dGhlIHNhbXBsZSBub25jZQ==").await;
        assert!(
            response.starts_with("HTTP/1.1 101 Switching Protocols"),
            "unexpected handshake response: {response}"
        );
        client
    }

    /// Handshake with an explicit key; returns the raw 101 response too.
    pub async fn connect_with_key(address: SocketAddr, key: &str) -> (WsClient, String) {
        let mut stream = TcpStream::connect(address).await.unwrap();
        let request = format!(
            "GET /ws HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\n\
             Upgrade: websocket\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {key}\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let response = read_until_blank_line(&mut stream).await;
        (WsClient { stream }, response)
    }

    /// Send one masked text frame, as every conforming client must.
    pub async fn send_text(&mut self, text: &str) {
        let frame = client_frame(0x1, text.as_bytes());
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Send raw bytes, bypassing frame construction.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Receive one server text frame (server frames are never masked).
    pub async fn recv_text(&mut self) -> String {
        let mut prefix = [0u8; 2];
        self.stream.read_exact(&mut prefix).await.unwrap();
        assert_eq!(prefix[0] & 0x0f, 0x1, "expected a text frame");
        assert_eq!(prefix[1] & 0x80, 0, "server frames must not be masked");

        let length = match (prefix[1] & 0x7f) as usize {
            126 => {
                let mut extended = [0u8; 2];
                self.stream.read_exact(&mut extended).await.unwrap();
                u16::from_be_bytes(extended) as usize
            }
            127 => {
                let mut extended = [0u8; 8];
                self.stream.read_exact(&mut extended).await.unwrap();
                u64::from_be_bytes(extended) as usize
            }
            short => short,
        };

        let mut payload = vec![0u8; length];
        self.stream.read_exact(&mut payload).await.unwrap();
        String::from_utf8(payload).unwrap()
    }

    /// True once the server has closed the connection.
    pub async fn closed(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(self.stream.read(&mut byte).await, Ok(0))
    }
}

/// Build a masked client frame with the given opcode.
pub fn client_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mask = [0x11u8, 0x22, 0x33, 0x44];
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.push(0x80 | opcode);

    match payload.len() {
        length if length < 126 => frame.push(0x80 | length as u8),
        length if length < 65536 => {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(length as u16).to_be_bytes());
        }
        length => {
            frame.push(0x80 | 127);
            frame.extend_from_slice(&(length as u64).to_be_bytes());
        }
    }

    frame.extend_from_slice(&mask);
    frame.extend(
        payload
            .iter()
            .enumerate()
            .map(|(index, byte)| byte ^ mask[index % 4]),
    );
    frame
}

async fn read_until_blank_line(stream: &mut TcpStream) -> String {
    let mut collected = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let read = stream.read(&mut byte).await.unwrap();
        assert!(read > 0, "connection closed during handshake");
        collected.push(byte[0]);
        if collected.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&collected).into_owned()
}
