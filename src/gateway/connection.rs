//! Connection identity and the cross-task write handle.
//!
//! # Responsibilities
//! - Mint unique connection ids for correlation and tracing
//! - Track the Accepted → Active → Closing → Removed lifecycle
//! - Let the backend reply path marshal writes onto the task that owns the
//!   connection's socket

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use tokio::sync::mpsc;

/// Uniqueness is all that matters here, so relaxed ordering is enough.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle states of one accepted peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Active,
    Closing,
    Removed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> ConnectionState {
        match value {
            0 => ConnectionState::Accepted,
            1 => ConnectionState::Active,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Removed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Accepted => 0,
            ConnectionState::Active => 1,
            ConnectionState::Closing => 2,
            ConnectionState::Removed => 3,
        }
    }
}

/// Commands marshalled onto the connection's owning task.
#[derive(Debug, Clone)]
pub enum WriteCommand {
    /// Deliver a JSON-RPC response for the given client id.
    Reply { client_id: u64, json: String },
    /// Push a JSON text to a websocket client.
    Broadcast(String),
}

/// Shared handle to one connection's write path.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    websocket: AtomicBool,
    state: AtomicU8,
    writer: mpsc::Sender<WriteCommand>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, peer: SocketAddr, writer: mpsc::Sender<WriteCommand>) -> Self {
        Self {
            id,
            peer,
            websocket: AtomicBool::new(false),
            state: AtomicU8::new(ConnectionState::Accepted.as_u8()),
            writer,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_websocket(&self) -> bool {
        self.websocket.load(Ordering::Relaxed)
    }

    pub fn set_websocket(&self, upgraded: bool) {
        self.websocket.store(upgraded, Ordering::Relaxed);
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Queue a write command. `false` means the owning task is gone and the
    /// command was dropped.
    pub fn push(&self, command: WriteCommand) -> bool {
        self.writer.try_send(command).is_ok()
    }
}
