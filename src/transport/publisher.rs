//! One-way fan-out socket pair used by the heartbeat service.
//!
//! Subscribers receive every message published after they connect. A slow
//! subscriber drops messages rather than stalling the publisher; a closed
//! subscriber is forgotten on the next publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::error::TransportError;
use crate::transport::codec::{Multipart, MultipartCodec};
use crate::transport::Endpoint;

const SUBSCRIBER_QUEUE_DEPTH: usize = 16;
const MAX_PUBLISH_LENGTH: usize = 1 << 12;

type SubscriberTable = Arc<DashMap<u64, mpsc::Sender<Multipart>>>;

/// Publishing side; owned by the loop that emits heartbeats.
pub struct PubSocket {
    local_addr: std::net::SocketAddr,
    subscribers: SubscriberTable,
    accept_task: JoinHandle<()>,
}

impl PubSocket {
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(endpoint.authority())
            .await
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let subscribers: SubscriberTable = Arc::new(DashMap::new());
        let keys = Arc::new(AtomicU64::new(1));

        let accept_task = {
            let subscribers = Arc::clone(&subscribers);
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, _)) => {
                            let key = keys.fetch_add(1, Ordering::Relaxed);
                            let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
                            subscribers.insert(key, tx);
                            tokio::spawn(serve_subscriber(
                                stream,
                                key,
                                rx,
                                Arc::clone(&subscribers),
                            ));
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "Publisher accept failed");
                            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        }
                    }
                }
            })
        };

        Ok(Self {
            local_addr,
            subscribers,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Fan `parts` out to every live subscriber, best effort.
    pub fn publish(&self, parts: Multipart) {
        let mut stale = Vec::new();
        for entry in self.subscribers.iter() {
            use tokio::sync::mpsc::error::TrySendError;
            match entry.value().try_send(parts.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(subscriber = entry.key(), "Dropping publish for slow subscriber");
                }
                Err(TrySendError::Closed(_)) => stale.push(*entry.key()),
            }
        }
        for key in stale {
            self.subscribers.remove(&key);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_subscriber(
    stream: TcpStream,
    key: u64,
    mut queue: mpsc::Receiver<Multipart>,
    subscribers: SubscriberTable,
) {
    let framed = Framed::new(stream, MultipartCodec::new(MAX_PUBLISH_LENGTH));
    let (mut sink, mut stream) = framed.split();

    loop {
        tokio::select! {
            queued = queue.recv() => match queued {
                Some(parts) => {
                    if sink.send(parts).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            // Subscribers have nothing to say; any read means disconnect
            // or garbage.
            inbound = stream.next() => match inbound {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    subscribers.remove(&key);
}

/// Subscribing side, used by heartbeat consumers.
pub struct SubSocket {
    framed: Framed<TcpStream, MultipartCodec>,
}

impl SubSocket {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(endpoint.authority())
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(Self {
            framed: Framed::new(stream, MultipartCodec::new(MAX_PUBLISH_LENGTH)),
        })
    }

    pub async fn recv(&mut self) -> Option<Result<Multipart, TransportError>> {
        self.framed
            .next()
            .await
            .map(|item| item.map_err(TransportError::Io))
    }
}
