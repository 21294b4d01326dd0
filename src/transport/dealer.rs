//! Connecting end of the identity-routed transport.
//!
//! Dealers never see identity frames; the router prepends the minted
//! identity on receive and strips it on reply.

use std::path::Path;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::TransportError;
use crate::transport::codec::{Multipart, MultipartCodec};
use crate::transport::{auth, Endpoint, AUTH_COMMAND, AUTH_OK};

/// Write half of a split dealer.
pub type DealerSink = SplitSink<Framed<TcpStream, MultipartCodec>, Multipart>;
/// Read half of a split dealer.
pub type DealerStream = SplitStream<Framed<TcpStream, MultipartCodec>>;

/// Client socket for the routed transport.
pub struct DealerSocket {
    sink: DealerSink,
    stream: DealerStream,
}

impl DealerSocket {
    /// Connect to a router endpoint, presenting `identity_certificate` when
    /// the remote side authenticates peers.
    pub async fn connect(
        endpoint: &Endpoint,
        identity_certificate: Option<&Path>,
        max_message_length: usize,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(endpoint.authority())
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        stream.set_nodelay(true).ok();

        let framed = Framed::new(stream, MultipartCodec::new(max_message_length));
        let (mut sink, mut stream) = framed.split();

        if let Some(path) = identity_certificate {
            let certificate = auth::load_identity(path)?;
            sink.send(vec![
                Bytes::from_static(AUTH_COMMAND),
                Bytes::from(certificate),
            ])
            .await?;

            match stream.next().await {
                Some(Ok(parts)) if parts.len() == 1 && parts[0].as_ref() == AUTH_OK => {}
                _ => return Err(TransportError::Rejected),
            }
        }

        Ok(Self { sink, stream })
    }

    pub async fn send(&mut self, parts: Multipart) -> Result<(), TransportError> {
        self.sink.send(parts).await.map_err(TransportError::Io)
    }

    pub async fn recv(&mut self) -> Option<Result<Multipart, TransportError>> {
        self.stream
            .next()
            .await
            .map(|item| item.map_err(TransportError::Io))
    }

    /// Split into independently-owned halves, one per owning task.
    pub fn into_split(self) -> (DealerSink, DealerStream) {
        (self.sink, self.stream)
    }
}
