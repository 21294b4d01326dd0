//! Listening end of the identity-routed transport.
//!
//! # Responsibilities
//! - Accept peer connections on the bound endpoint
//! - Mint a 5-byte identity per peer (0x00 + 32-bit counter) and tag every
//!   inbound message with it
//! - Route outbound messages to the peer named by an identity frame
//! - Run the optional authentication handshake before admitting a peer
//!
//! The `RouterSocket` value is owned by exactly one loop. Internally each
//! peer's read half is drained by a forwarder task into a single inbound
//! channel; write halves sit behind bounded per-peer queues so `send` never
//! blocks the owning loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::error::TransportError;
use crate::messages::Identity;
use crate::transport::codec::{Multipart, MultipartCodec};
use crate::transport::{Authenticator, Endpoint, AUTH_COMMAND, AUTH_OK};

const INBOUND_QUEUE_DEPTH: usize = 256;
const PEER_QUEUE_DEPTH: usize = 64;

type PeerTable = Arc<DashMap<Identity, mpsc::Sender<Multipart>>>;

/// Routed server socket. Single-owner; replies go out by identity.
pub struct RouterSocket {
    local_addr: std::net::SocketAddr,
    inbound_rx: mpsc::Receiver<(Identity, Multipart)>,
    peers: PeerTable,
    accept_task: JoinHandle<()>,
}

impl RouterSocket {
    /// Bind the endpoint and start accepting peers.
    pub async fn bind(
        endpoint: &Endpoint,
        authenticator: Option<Arc<Authenticator>>,
        max_message_length: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(endpoint.authority())
            .await
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let peers: PeerTable = Arc::new(DashMap::new());
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let identities = Arc::new(AtomicU32::new(1));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&peers),
            inbound_tx,
            authenticator,
            max_message_length,
            identities,
        ));

        Ok(Self {
            local_addr,
            inbound_rx,
            peers,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Receive the next inbound message with its originating identity.
    pub async fn recv(&mut self) -> Option<(Identity, Multipart)> {
        self.inbound_rx.recv().await
    }

    /// Queue `parts` for the peer named by `identity`.
    pub fn send(&self, identity: &Identity, parts: Multipart) -> Result<(), TransportError> {
        let peer = self.peers.get(identity).ok_or(TransportError::Unroutable)?;
        peer.try_send(parts).map_err(|_| TransportError::Congested)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl Drop for RouterSocket {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    peers: PeerTable,
    inbound_tx: mpsc::Sender<(Identity, Multipart)>,
    authenticator: Option<Arc<Authenticator>>,
    max_message_length: usize,
    identities: Arc<AtomicU32>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                stream.set_nodelay(true).ok();
                let identity = mint_identity(&identities);
                tracing::debug!(peer = %peer_addr, identity = ?identity, "Transport peer connected");
                tokio::spawn(serve_peer(
                    stream,
                    identity,
                    Arc::clone(&peers),
                    inbound_tx.clone(),
                    authenticator.clone(),
                    max_message_length,
                ));
            }
            Err(error) => {
                // Transient accept failures must not stop the service.
                tracing::warn!(error = %error, "Transport accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }
    }
}

fn mint_identity(identities: &AtomicU32) -> Identity {
    let value = identities.fetch_add(1, Ordering::Relaxed);
    let mut identity = Vec::with_capacity(5);
    identity.push(0u8);
    identity.extend_from_slice(&value.to_be_bytes());
    Bytes::from(identity)
}

async fn serve_peer(
    stream: TcpStream,
    identity: Identity,
    peers: PeerTable,
    inbound_tx: mpsc::Sender<(Identity, Multipart)>,
    authenticator: Option<Arc<Authenticator>>,
    max_message_length: usize,
) {
    let framed = Framed::new(stream, MultipartCodec::new(max_message_length));
    let (mut sink, mut stream) = framed.split();

    if let Some(authenticator) = authenticator {
        let admitted = match stream.next().await {
            Some(Ok(parts)) => {
                parts.len() == 2
                    && parts[0].as_ref() == AUTH_COMMAND
                    && authenticator.verify(&parts[1])
            }
            _ => false,
        };
        if !admitted {
            tracing::warn!(identity = ?identity, "Rejected unauthenticated transport peer");
            return;
        }
        if sink.send(vec![Bytes::from_static(AUTH_OK)]).await.is_err() {
            return;
        }
    }

    let (writer_tx, mut writer_rx) = mpsc::channel::<Multipart>(PEER_QUEUE_DEPTH);
    peers.insert(identity.clone(), writer_tx);

    let writer_task = tokio::spawn(async move {
        while let Some(parts) = writer_rx.recv().await {
            if sink.send(parts).await.is_err() {
                break;
            }
        }
    });

    while let Some(inbound) = stream.next().await {
        match inbound {
            Ok(parts) => {
                if inbound_tx.send((identity.clone(), parts)).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                tracing::debug!(identity = ?identity, error = %error, "Transport peer read failed");
                break;
            }
        }
    }

    peers.remove(&identity);
    writer_task.abort();
    tracing::debug!(identity = ?identity, "Transport peer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DealerSocket;

    #[tokio::test]
    async fn routes_requests_and_replies_by_identity() {
        let endpoint: Endpoint = "tcp://127.0.0.1:0".parse().unwrap();
        let mut router = RouterSocket::bind(&endpoint, None, 1 << 16).await.unwrap();
        let bound: Endpoint = format!("tcp://{}", router.local_addr()).parse().unwrap();

        let mut dealer = DealerSocket::connect(&bound, None, 1 << 16).await.unwrap();
        dealer
            .send(vec![Bytes::from_static(b"hello")])
            .await
            .unwrap();

        let (identity, parts) = router.recv().await.unwrap();
        assert_eq!(parts, vec![Bytes::from_static(b"hello")]);

        router
            .send(&identity, vec![Bytes::from_static(b"world")])
            .unwrap();
        let reply = dealer.recv().await.unwrap().unwrap();
        assert_eq!(reply, vec![Bytes::from_static(b"world")]);
    }

    #[tokio::test]
    async fn send_to_unknown_identity_is_unroutable() {
        let endpoint: Endpoint = "tcp://127.0.0.1:0".parse().unwrap();
        let router = RouterSocket::bind(&endpoint, None, 1 << 16).await.unwrap();

        let ghost = Bytes::from_static(&[0, 9, 9, 9, 9]);
        assert!(matches!(
            router.send(&ghost, vec![Bytes::from_static(b"x")]),
            Err(TransportError::Unroutable)
        ));
    }

    #[tokio::test]
    async fn distinct_peers_get_distinct_identities() {
        let endpoint: Endpoint = "tcp://127.0.0.1:0".parse().unwrap();
        let mut router = RouterSocket::bind(&endpoint, None, 1 << 16).await.unwrap();
        let bound: Endpoint = format!("tcp://{}", router.local_addr()).parse().unwrap();

        let mut first = DealerSocket::connect(&bound, None, 1 << 16).await.unwrap();
        let mut second = DealerSocket::connect(&bound, None, 1 << 16).await.unwrap();

        first.send(vec![Bytes::from_static(b"a")]).await.unwrap();
        second.send(vec![Bytes::from_static(b"b")]).await.unwrap();

        let (identity_a, _) = router.recv().await.unwrap();
        let (identity_b, _) = router.recv().await.unwrap();
        assert_ne!(identity_a, identity_b);
    }
}
