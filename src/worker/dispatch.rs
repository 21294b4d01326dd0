//! The backend request worker.
//!
//! # Responsibilities
//! - Bind the routed command socket and the heartbeat publisher
//! - Poll, bounded by the configured interval, on the command socket and the
//!   wakeup queue
//! - Dispatch received commands to handlers registered by name
//! - Relay queued replies verbatim onto the command socket
//! - Publish a heartbeat frame once per configured interval
//!
//! # State Machine
//! ```text
//! Idle → Polling → Dispatching → Idle   (heartbeat tick interleaved)
//! ```
//!
//! Startup bind failures are fatal. Runtime receive or dispatch errors are
//! logged and the loop continues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::schema::BackendConfig;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::messages::{CommandRequest, Identity, OutgoingMessage};
use crate::observability::metrics;
use crate::transport::{auth, Authenticator, Endpoint, Multipart, PubSocket, RouterSocket};
use crate::worker::sender::SendWorker;
use crate::worker::WorkerError;

/// A registered command handler: receives the parsed request and a relay
/// handle for queueing its reply.
pub type CommandHandler = Arc<dyn Fn(CommandRequest, SendWorker) + Send + Sync>;

/// Single-owner dispatch loop over the backend transport.
pub struct RequestWorker {
    router: RouterSocket,
    heartbeat: PubSocket,
    wakeup_rx: mpsc::Receiver<OutgoingMessage>,
    sender: SendWorker,
    handlers: HashMap<String, CommandHandler>,
    secure: bool,
    log_requests: bool,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    heartbeat_at: Instant,
    heartbeat_counter: u32,
}

impl RequestWorker {
    /// Bind the query and heartbeat services. Any failure here is fatal and
    /// the caller aborts startup.
    pub async fn start(config: &BackendConfig) -> Result<Self, WorkerError> {
        let authenticator = match &config.server_certificate {
            Some(certificate) => {
                // Fail fast: an unreadable server certificate is fatal.
                auth::load_identity(certificate)?;
                let authenticator =
                    Authenticator::new(config.client_certificates_path.as_deref())?;
                match authenticator.allowed_count() {
                    Some(count) => {
                        tracing::info!(clients = count, "Peer authentication enabled")
                    }
                    None => tracing::info!("Peer authentication enabled for any certificate"),
                }
                Some(Arc::new(authenticator))
            }
            None => None,
        };
        let secure = authenticator.is_some();

        let query_endpoint: Endpoint = config.query_endpoint.parse()?;
        let router = RouterSocket::bind(
            &query_endpoint,
            authenticator,
            config.max_message_length,
        )
        .await?;
        tracing::info!(endpoint = %query_endpoint, "Bound query service");

        let heartbeat_endpoint: Endpoint = config.heartbeat_endpoint.parse()?;
        let heartbeat = PubSocket::bind(&heartbeat_endpoint).await?;
        tracing::info!(endpoint = %heartbeat_endpoint, "Bound heartbeat service");

        let (wakeup_tx, wakeup_rx) = mpsc::channel(config.send_queue_depth);
        let heartbeat_interval = Duration::from_millis(config.heartbeat_interval_ms);

        Ok(Self {
            router,
            heartbeat,
            wakeup_rx,
            sender: SendWorker::new(wakeup_tx),
            handlers: HashMap::new(),
            secure,
            log_requests: config.log_requests,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            heartbeat_interval,
            heartbeat_at: Instant::now() + heartbeat_interval,
            heartbeat_counter: 0,
        })
    }

    /// Register a handler for `command`. Re-registering a name overwrites
    /// the previous handler.
    pub fn attach(&mut self, command: impl Into<String>, handler: CommandHandler) {
        self.handlers.insert(command.into(), handler);
    }

    /// Relay handle for queueing replies from anywhere.
    pub fn sender(&self) -> SendWorker {
        self.sender.clone()
    }

    /// Bound address of the query service.
    pub fn query_addr(&self) -> std::net::SocketAddr {
        self.router.local_addr()
    }

    /// Bound address of the heartbeat service.
    pub fn heartbeat_addr(&self) -> std::net::SocketAddr {
        self.heartbeat.local_addr()
    }

    /// Run until the shutdown flag is raised. The flag is observed at the
    /// top of every iteration; `poll` blocks for at most the poll interval.
    pub async fn run(mut self, signal: ShutdownSignal) {
        while !signal.is_triggered() {
            self.poll().await;
        }
        tracing::info!("Request worker stopped");
    }

    /// One loop iteration: wait on {command socket, wakeup queue}, bounded
    /// by the poll interval, then publish a heartbeat if one is due.
    pub async fn poll(&mut self) {
        tokio::select! {
            inbound = self.router.recv() => {
                if let Some((identity, parts)) = inbound {
                    self.dispatch(identity, parts);
                }
            }
            queued = self.wakeup_rx.recv() => {
                if let Some(message) = queued {
                    self.relay(message);
                }
            }
            _ = tokio::time::sleep(self.poll_interval) => {}
        }

        if Instant::now() >= self.heartbeat_at {
            self.publish_heartbeat();
        }
    }

    fn dispatch(&self, identity: Identity, parts: Multipart) {
        let request = match CommandRequest::from_parts(identity, parts, self.secure) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(error = %error, "Discarding malformed request");
                return;
            }
        };

        match self.handlers.get(request.command()) {
            Some(handler) => {
                if self.log_requests {
                    tracing::debug!(
                        command = request.command(),
                        origin = %request.origin(),
                        "Service request"
                    );
                }
                metrics::record_command(request.command());
                handler.as_ref()(request, self.sender.clone());
            }
            None => {
                // No reply: which failure to send is ambiguous at this
                // layer, so the client sees a timeout.
                tracing::warn!(
                    command = request.command(),
                    origin = %request.origin(),
                    "Unhandled service request"
                );
            }
        }
    }

    fn relay(&self, message: OutgoingMessage) {
        match message.into_parts() {
            Ok((identity, parts)) => {
                if let Err(error) = self.router.send(&identity, parts) {
                    tracing::warn!(error = %error, "Failed to relay reply");
                }
            }
            Err(error) => tracing::warn!(error = %error, "Discarding unroutable reply"),
        }
    }

    fn publish_heartbeat(&mut self) {
        self.heartbeat_at = Instant::now() + self.heartbeat_interval;
        tracing::debug!(counter = self.heartbeat_counter, "Publish service heartbeat");
        self.heartbeat.publish(vec![Bytes::copy_from_slice(
            &self.heartbeat_counter.to_le_bytes(),
        )]);
        self.heartbeat_counter = self.heartbeat_counter.wrapping_add(1);
        metrics::record_heartbeat();
    }
}
