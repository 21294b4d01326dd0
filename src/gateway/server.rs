//! Gateway accept loop and per-connection handling.
//!
//! # Responsibilities
//! - Accept raw TCP connections with semaphore backpressure
//! - Drive each connection through the byte-level codec: HTTP requests,
//!   websocket upgrades, then RFC6455 frames
//! - Forward JSON-RPC queries to the backend and reunite the asynchronous
//!   replies with the originating connection and client id
//!
//! # Concurrency
//! Every connection socket is owned by exactly one task. The backend reply
//! loop never writes a socket itself; it pushes a `WriteCommand` onto the
//! owning task's queue. The dealer's write half is serialized behind a
//! mutex with a narrow critical section, its read half is owned solely by
//! the reply loop.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};

use crate::config::schema::{BackendConfig, WebConfig};
use crate::gateway::connection::{ConnectionHandle, ConnectionId, ConnectionState, WriteCommand};
use crate::gateway::correlation::{CorrelationEntry, Correlator, QueryWork, QueryWorkMap};
use crate::gateway::json;
use crate::gateway::methods::{self, MethodRegistry};
use crate::gateway::{GatewayError, QueryError, INVALID_REQUEST};
use crate::http::websocket::{self, OpCode};
use crate::http::{parse_http, HttpReply, HttpRequest, Status};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::messages::message::STATUS_SUCCESS;
use crate::messages::QueryReply;
use crate::observability::metrics;
use crate::transport::dealer::{DealerSink, DealerStream};
use crate::transport::{DealerSocket, Endpoint};

/// Upper bound on one buffered HTTP request, headers and body.
const MAX_REQUEST_LENGTH: usize = 1 << 16;
const WRITE_QUEUE_DEPTH: usize = 32;

const NOT_FOUND_PAGE: &[u8] = b"<html><head><title>Page not found</title></head>\
<body>The page was not found.</body></html>\r\n\r\n";

/// The web-facing gateway. Spawns its accept and reply loops on start.
pub struct WebGateway {
    core: Arc<GatewayCore>,
    local_addr: SocketAddr,
}

impl WebGateway {
    /// Bind the web listener and connect the backend dealer. Failures here
    /// are fatal; the caller aborts startup.
    pub async fn start(
        settings: WebConfig,
        backend: &BackendConfig,
        registry: MethodRegistry,
        signal: ShutdownSignal,
    ) -> Result<Self, GatewayError> {
        let endpoint: Endpoint = backend.query_endpoint.parse()?;
        let dealer = DealerSocket::connect(
            &endpoint,
            backend.client_certificate.as_deref(),
            backend.max_message_length,
        )
        .await?;
        let (sink, stream) = dealer.into_split();

        let listener = TcpListener::bind(&settings.bind_address)
            .await
            .map_err(|source| GatewayError::Bind {
                address: settings.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| GatewayError::Bind {
            address: settings.bind_address.clone(),
            source,
        })?;

        tracing::info!(address = %local_addr, backend = %endpoint, "Web gateway listening");

        let core = Arc::new(GatewayCore {
            settings,
            registry,
            correlator: Correlator::new(),
            connections: DashMap::new(),
            query_sink: Mutex::new(sink),
        });

        tokio::spawn(reply_loop(Arc::clone(&core), stream));
        tokio::spawn(accept_loop(Arc::clone(&core), listener, signal));

        Ok(Self { core, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.core.connections.len()
    }

    /// Correlation entries currently awaiting a backend reply.
    pub fn outstanding_queries(&self) -> usize {
        self.core.correlator.outstanding()
    }

    /// Push one JSON text to every connected websocket client.
    pub fn broadcast(&self, json: &str) {
        for entry in self.core.connections.iter() {
            if entry.value().is_websocket() {
                entry
                    .value()
                    .push(WriteCommand::Broadcast(json.to_string()));
            }
        }
    }
}

/// State shared between the accept loop, connection tasks and reply loop.
struct GatewayCore {
    settings: WebConfig,
    registry: MethodRegistry,
    correlator: Correlator,
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    query_sink: Mutex<DealerSink>,
}

impl GatewayCore {
    fn add_connection(&self, handle: Arc<ConnectionHandle>) {
        let kind = if handle.is_websocket() {
            "Websocket"
        } else {
            "JSON-RPC"
        };
        self.connections.insert(handle.id(), Arc::clone(&handle));
        metrics::connection_opened();
        tracing::debug!(
            connection = %handle.id(),
            kind,
            total = self.connections.len(),
            "Client connection established"
        );
    }

    /// Teardown: erase every correlation entry this connection owns, then
    /// clear its query-work map. O(n) in outstanding queries.
    fn remove_connection(&self, id: ConnectionId, work: &mut QueryWorkMap) {
        for entry in work.values() {
            self.correlator.forget(entry.sequence);
        }
        work.clear();

        if self.connections.remove(&id).is_some() {
            metrics::connection_closed();
            tracing::debug!(
                connection = %id,
                remaining = self.connections.len(),
                "Client disconnected"
            );
        }
    }

    async fn notify_query_work(
        &self,
        connection: &ConnectionHandle,
        work: &mut QueryWorkMap,
        method: &str,
        client_id: u64,
        parameters: &str,
    ) -> Result<(), QueryError> {
        if self.registry.is_empty() {
            // Most commonly a client pointed at the wrong service, so no
            // handlers are available at all.
            tracing::error!("No method handlers available");
            metrics::record_query(method, "unavailable");
            return Err(QueryError::invalid_request());
        }

        let Some(translator) = self.registry.get(method) else {
            tracing::debug!(method, "Method not found");
            metrics::record_query(method, "not_found");
            return Err(QueryError::method_not_found());
        };

        // Duplicate ids are rejected, never overwritten, and no sequence
        // number is allocated for them.
        if work.contains_key(&client_id) {
            metrics::record_query(method, "duplicate");
            return Err(QueryError::internal_error());
        }

        // Client ids are only unique per connection; the minted sequence
        // number correlates the backend reply with (connection, client id).
        // The client never sees this value.
        let sequence = self.correlator.next_sequence();
        work.insert(
            client_id,
            QueryWork {
                client_id,
                sequence,
                method: method.to_string(),
                parameters: parameters.to_string(),
            },
        );
        self.correlator.insert(
            sequence,
            CorrelationEntry {
                connection: connection.id(),
                client_id,
                method: method.to_string(),
            },
        );

        let frames = translator.encode(parameters, sequence);
        let mut sink = self.query_sink.lock().await;
        if let Err(error) = sink.send(frames).await {
            // The work and correlation entries survive a failed send;
            // connection teardown reclaims them.
            tracing::warn!(error = %error, "Query send failure");
            metrics::record_query(method, "send_failure");
            return Err(QueryError::internal_error());
        }

        metrics::record_query(method, "forwarded");
        Ok(())
    }

    /// Route one backend reply back to its originating connection.
    fn handle_backend_reply(&self, reply: QueryReply) {
        let Some(entry) = self.correlator.resolve(reply.sequence) else {
            // Late reply, or the owning connection is already torn down.
            tracing::trace!(sequence = reply.sequence, "Dropping uncorrelated reply");
            return;
        };

        let Some(connection) = self
            .connections
            .get(&entry.connection)
            .map(|handle| Arc::clone(handle.value()))
        else {
            tracing::debug!(connection = %entry.connection, "Dropping reply for removed connection");
            return;
        };

        let json = if reply.status == STATUS_SUCCESS {
            let decoded = match self.registry.get(&entry.method) {
                Some(translator) => translator.decode(&reply.payload),
                None => methods::decode_payload(&reply.payload),
            };
            json::to_json_result(&decoded, entry.client_id)
        } else {
            let message = if reply.payload.is_empty() {
                "Backend error.".to_string()
            } else {
                String::from_utf8_lossy(&reply.payload).into_owned()
            };
            json::to_json_error(reply.status as i64, &message, entry.client_id)
        };

        // Never write from this loop: the connection's own task performs
        // the socket write.
        if !connection.push(WriteCommand::Reply {
            client_id: entry.client_id,
            json,
        }) {
            tracing::debug!(connection = %entry.connection, "Write path closed; reply dropped");
        }
    }

    fn origin_allowed(&self, origin: Option<&str>) -> bool {
        origin_allowed(&self.settings.allowed_origins, origin)
    }
}

fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match origin {
        Some(origin) => allowed.iter().any(|entry| origin.contains(entry.as_str())),
        None => false,
    }
}

async fn accept_loop(core: Arc<GatewayCore>, listener: TcpListener, signal: ShutdownSignal) {
    let limit = Arc::new(Semaphore::new(core.settings.max_connections));
    let mut stop = signal.clone();

    loop {
        // Backpressure first: no accept without a free connection slot.
        let permit = match Arc::clone(&limit).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    stream.set_nodelay(true).ok();
                    tokio::spawn(serve_connection(Arc::clone(&core), stream, peer, permit));
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Failed to accept new connection");
                }
            },
            _ = stop.triggered() => break,
        }
    }

    tracing::info!("Web gateway stopped accepting connections");
}

async fn reply_loop(core: Arc<GatewayCore>, mut stream: DealerStream) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(parts) => match QueryReply::from_parts(&parts) {
                Ok(reply) => core.handle_backend_reply(reply),
                Err(error) => {
                    tracing::warn!(error = %error, "Discarding malformed backend reply");
                }
            },
            Err(error) => {
                tracing::error!(error = %error, "Backend reply stream failed");
                break;
            }
        }
    }
}

async fn serve_connection(
    core: Arc<GatewayCore>,
    stream: TcpStream,
    peer: SocketAddr,
    permit: OwnedSemaphorePermit,
) {
    let _permit = permit;
    let id = ConnectionId::new();
    let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
    let handle = Arc::new(ConnectionHandle::new(id, peer, write_tx));
    let (reader, writer) = stream.into_split();

    tracing::trace!(connection = %id, peer = %peer, "Connection accepted");

    let driver = ConnectionDriver {
        core,
        handle,
        writer,
        buffer: BytesMut::with_capacity(1024),
        work: QueryWorkMap::new(),
        websocket: false,
        registered: false,
    };
    driver.run(reader, write_rx).await;
}

enum Event {
    Read(std::io::Result<usize>),
    Command(Option<WriteCommand>),
}

/// Owns one connection's socket, buffer and query-work map.
struct ConnectionDriver {
    core: Arc<GatewayCore>,
    handle: Arc<ConnectionHandle>,
    writer: OwnedWriteHalf,
    buffer: BytesMut,
    work: QueryWorkMap,
    websocket: bool,
    registered: bool,
}

impl ConnectionDriver {
    async fn run(mut self, mut reader: OwnedReadHalf, mut write_rx: mpsc::Receiver<WriteCommand>) {
        loop {
            let event = tokio::select! {
                read = reader.read_buf(&mut self.buffer) => Event::Read(read),
                command = write_rx.recv() => Event::Command(command),
            };

            let proceed = match event {
                Event::Read(Ok(0)) => false,
                Event::Read(Ok(_)) => self.process_buffer().await,
                Event::Read(Err(error)) => {
                    tracing::debug!(connection = %self.handle.id(), error = %error, "Read failed");
                    false
                }
                Event::Command(Some(command)) => self.apply(command).await,
                Event::Command(None) => false,
            };

            if !proceed {
                break;
            }
        }

        // Closing: reclaim every correlation entry this connection owns.
        self.handle.set_state(ConnectionState::Closing);
        if self.registered {
            self.core.remove_connection(self.handle.id(), &mut self.work);
        }
        self.handle.set_state(ConnectionState::Removed);
    }

    async fn process_buffer(&mut self) -> bool {
        if self.websocket {
            self.process_frames().await
        } else {
            self.process_http().await
        }
    }

    async fn process_http(&mut self) -> bool {
        loop {
            let Some(header_end) = find_sequence(&self.buffer, b"\r\n\r\n") else {
                if self.buffer.len() > MAX_REQUEST_LENGTH {
                    tracing::debug!(connection = %self.handle.id(), "Request header exceeds limit");
                    self.write_reply(Status::BadRequest, "", b"", false).await;
                    return false;
                }
                return true;
            };
            let header_length = header_end + 4;

            // First pass over the header block alone, for framing.
            let head = match parse_http(&self.buffer[..header_length]) {
                Ok(head) => head,
                Err(error) => {
                    tracing::debug!(
                        connection = %self.handle.id(),
                        error = %error,
                        "Failed to parse HTTP request"
                    );
                    self.write_reply(Status::BadRequest, "", b"", false).await;
                    return false;
                }
            };

            let total_length = header_length + head.content_length;
            if total_length > MAX_REQUEST_LENGTH {
                self.write_reply(Status::BadRequest, "", b"", false).await;
                return false;
            }
            if self.buffer.len() < total_length {
                // Body still in flight.
                return true;
            }

            let raw = self.buffer.split_to(total_length);
            let request = match parse_http(&raw) {
                Ok(request) => request,
                Err(error) => {
                    tracing::debug!(
                        connection = %self.handle.id(),
                        error = %error,
                        "Failed to parse HTTP request"
                    );
                    self.write_reply(Status::BadRequest, "", b"", false).await;
                    return false;
                }
            };

            if !self.handle_request(request).await {
                return false;
            }
            if self.websocket {
                // Frames may already sit behind the upgrade request.
                return self.process_frames().await;
            }
        }
    }

    async fn handle_request(&mut self, request: HttpRequest) -> bool {
        if request.upgrade_request {
            return self.handle_upgrade(&request).await;
        }

        if request.json_rpc {
            self.register();
            let body = request.json_body.clone().expect("json_rpc implies a body");
            return self.handle_rpc(body).await;
        }

        // Static assets are an outer layer's concern; the core answers 404.
        tracing::debug!(connection = %self.handle.id(), uri = %request.uri, "Requested path not served");
        let keep_alive = request.keep_alive();
        if !self
            .write_reply(Status::NotFound, "text/html", NOT_FOUND_PAGE, keep_alive)
            .await
        {
            return false;
        }
        keep_alive
    }

    async fn handle_upgrade(&mut self, request: &HttpRequest) -> bool {
        if request.method != "get" {
            tracing::debug!(method = %request.method, "Rejecting upgrade request for method");
            self.write_reply(Status::BadRequest, "", b"", false).await;
            return false;
        }

        if !self.core.origin_allowed(request.header("origin")) {
            tracing::warn!(
                origin = request.header("origin").unwrap_or(""),
                "Rejecting upgrade request for origin"
            );
            self.write_reply(Status::Forbidden, "", b"", false).await;
            return false;
        }

        if let Some(version) = request.header("sec-websocket-version") {
            if version != "13" {
                tracing::debug!(version, "Rejecting upgrade request for version");
                self.write_reply(Status::BadRequest, "", b"", false).await;
                return false;
            }
        }

        let key = request.header("sec-websocket-key").unwrap_or_default();
        let accept = websocket::key_response(key);
        let subprotocol = request.header("sec-websocket-protocol").unwrap_or_default();
        let response = HttpReply::generate_upgrade(&accept, subprotocol);

        // Unbuffered write; the connection must not flip to websocket
        // framing before the handshake reply is out.
        if !self.write_chunks(&[response.as_bytes()]).await {
            return false;
        }

        self.websocket = true;
        self.handle.set_websocket(true);
        self.register();
        tracing::debug!(connection = %self.handle.id(), uri = %request.uri, "Upgraded connection");
        true
    }

    async fn process_frames(&mut self) -> bool {
        loop {
            let header = match websocket::decode_frame(&self.buffer) {
                Ok(Some(header)) => header,
                Ok(None) => return true,
                Err(error) => {
                    tracing::debug!(
                        connection = %self.handle.id(),
                        error = %error,
                        "Invalid websocket frame"
                    );
                    return false;
                }
            };

            if header.payload_length > self.core.settings.max_incoming_frame_length {
                tracing::error!(
                    connection = %self.handle.id(),
                    length = header.payload_length,
                    "Terminating connection for exceeding the maximum incoming frame length"
                );
                return false;
            }

            let total_length = header.header_length + header.payload_length;
            if self.buffer.len() < total_length {
                return true;
            }

            let frame = self.buffer.split_to(total_length);
            let mut payload = frame[header.header_length..].to_vec();
            websocket::unmask(&mut payload, header.mask);

            if header.opcode.is_control() {
                if header.opcode == OpCode::Close {
                    tracing::debug!(connection = %self.handle.id(), "Closing websocket due to close op");
                    return false;
                }
                tracing::debug!(
                    connection = %self.handle.id(),
                    opcode = %header.opcode,
                    "Unhandled websocket op"
                );
                continue;
            }

            match serde_json::from_slice::<Value>(&payload) {
                Ok(request) => {
                    if !self.handle_rpc(request).await {
                        return false;
                    }
                }
                Err(_) => {
                    let body = json::to_json_error(INVALID_REQUEST, "Invalid Request.", 0);
                    if !self.write_frame(OpCode::Text, body.as_bytes()).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn handle_rpc(&mut self, request: Value) -> bool {
        let client_id = request.get("id").and_then(Value::as_u64).unwrap_or(0);
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let parameters = first_parameter(&request);

        tracing::trace!(
            connection = %self.handle.id(),
            method = %method,
            id = client_id,
            "Query received"
        );

        match self
            .core
            .notify_query_work(&self.handle, &mut self.work, &method, client_id, &parameters)
            .await
        {
            Ok(()) => true,
            Err(error) => self.write_query_error(&error, client_id).await,
        }
    }

    async fn write_query_error(&mut self, error: &QueryError, client_id: u64) -> bool {
        let body = json::to_json_error(error.code, error.message, client_id);
        if self.websocket {
            // Routing and correlation failures are reported; the framed
            // channel itself survives.
            self.write_frame(OpCode::Text, body.as_bytes()).await
        } else {
            self.write_reply(error.status, "", body.as_bytes(), false)
                .await;
            false
        }
    }

    async fn apply(&mut self, command: WriteCommand) -> bool {
        match command {
            WriteCommand::Reply { client_id, json } => {
                self.work.remove(&client_id);
                if self.websocket {
                    self.write_frame(OpCode::Text, json.as_bytes()).await
                } else {
                    if !self
                        .write_reply(Status::Ok, "", json.as_bytes(), false)
                        .await
                    {
                        return false;
                    }
                    // JSON-RPC over HTTP closes once nothing is outstanding.
                    !self.work.is_empty()
                }
            }
            WriteCommand::Broadcast(json) => {
                if self.websocket {
                    self.write_frame(OpCode::Text, json.as_bytes()).await
                } else {
                    true
                }
            }
        }
    }

    fn register(&mut self) {
        if self.registered {
            return;
        }
        self.registered = true;
        self.handle.set_state(ConnectionState::Active);
        self.core.add_connection(Arc::clone(&self.handle));
    }

    async fn write_reply(
        &mut self,
        status: Status,
        mime_type: &str,
        body: &[u8],
        keep_alive: bool,
    ) -> bool {
        let header = HttpReply::generate(status, mime_type, body.len(), keep_alive);
        self.write_chunks(&[header.as_bytes(), body]).await
    }

    async fn write_frame(&mut self, opcode: OpCode, payload: &[u8]) -> bool {
        let header = websocket::encode_frame(payload.len(), opcode);
        self.write_chunks(&[&header, payload]).await
    }

    async fn write_chunks(&mut self, chunks: &[&[u8]]) -> bool {
        for chunk in chunks {
            if chunk.is_empty() {
                continue;
            }
            if let Err(error) = self.writer.write_all(chunk).await {
                tracing::debug!(connection = %self.handle.id(), error = %error, "Write failed");
                return false;
            }
        }
        true
    }
}

fn first_parameter(request: &Value) -> String {
    match request
        .get("params")
        .and_then(Value::as_array)
        .and_then(|parameters| parameters.first())
    {
        Some(Value::String(parameter)) => parameter.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn find_sequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
