//! Sequence minting and the shared correlation map.
//!
//! Client ids are only unique per connection, so every forwarded query is
//! assigned a process-scoped sequence number that the backend echoes back.
//! The map from sequence to (connection, client id) is shared between the
//! web loop and the backend reply loop; inserts and removes are atomic,
//! lookups never block each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

use crate::gateway::connection::ConnectionId;

/// One outstanding query, keyed by client id inside its connection's map.
#[derive(Debug, Clone)]
pub struct QueryWork {
    pub client_id: u64,
    pub sequence: u32,
    pub method: String,
    pub parameters: String,
}

/// Per-connection map of outstanding queries. Owned by the connection's
/// task; at most one entry per client id.
pub type QueryWorkMap = HashMap<u64, QueryWork>;

/// Reverse mapping stored under the minted sequence number.
#[derive(Debug, Clone)]
pub struct CorrelationEntry {
    pub connection: ConnectionId,
    pub client_id: u64,
    pub method: String,
}

/// Instance-owned sequence counter plus the shared correlation map.
#[derive(Debug, Default)]
pub struct Correlator {
    sequence: AtomicU32,
    entries: DashMap<u32, CorrelationEntry>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next sequence number. Wraps on overflow; only a bounded
    /// number of entries are ever outstanding.
    pub fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, sequence: u32, entry: CorrelationEntry) {
        self.entries.insert(sequence, entry);
    }

    /// Remove and return the entry for `sequence`, if it is still live.
    pub fn resolve(&self, sequence: u32) -> Option<CorrelationEntry> {
        self.entries.remove(&sequence).map(|(_, entry)| entry)
    }

    /// Drop the entry for `sequence` without delivering it.
    pub fn forget(&self, sequence: u32) {
        self.entries.remove(&sequence);
    }

    pub fn outstanding(&self) -> usize {
        self.entries.len()
    }
}
