//! Command messages carried over the routed transport.
//!
//! Request layout after the transport strips the identity frame:
//! `[empty delimiter?][command][correlation id, 4 bytes LE][data]`.
//! Replies mirror the identity/delimiter prefix of the request; the data
//! frame of a reply starts with a 4-byte little-endian status code (zero on
//! success) followed by the payload.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::MessageError;
use crate::messages::route::{Identity, Route};
use crate::transport::Multipart;

/// Status code of a successful reply.
pub const STATUS_SUCCESS: u32 = 0;

/// One received command: reply route, command name and argument bytes.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    route: Route,
    command: String,
    id: u32,
    data: Bytes,
}

impl CommandRequest {
    /// Parse the frames received for one routed request.
    ///
    /// The identity frame has already been stripped by the transport; a
    /// leading empty frame marks a delimited (REQ-style) peer and is echoed
    /// on reply.
    pub fn from_parts(
        identity: Identity,
        mut parts: Multipart,
        secure: bool,
    ) -> Result<Self, MessageError> {
        let delimited = parts.first().map(|frame| frame.is_empty()).unwrap_or(false);
        if delimited {
            parts.remove(0);
        }

        if parts.len() != 3 {
            return Err(MessageError::BadFrameCount(parts.len()));
        }

        let data = parts.pop().expect("length checked");
        let id_frame = parts.pop().expect("length checked");
        let command_frame = parts.pop().expect("length checked");

        let command =
            String::from_utf8(command_frame.to_vec()).map_err(|_| MessageError::BadCommand)?;

        let id_bytes: [u8; 4] = id_frame
            .as_ref()
            .try_into()
            .map_err(|_| MessageError::BadCorrelation)?;

        let mut route = Route::new(secure, delimited);
        route.enqueue(identity);

        Ok(Self {
            route,
            command,
            id: u32::from_le_bytes(id_bytes),
            data,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Correlation token minted by the requesting gateway.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Hex rendering of the originating identity, for logs.
    pub fn origin(&self) -> String {
        match self.route.peek() {
            Some(identity) => {
                let mut rendered = String::with_capacity(2 + identity.len() * 2);
                rendered.push('[');
                for byte in identity.iter() {
                    rendered.push_str(&format!("{byte:02x}"));
                }
                rendered.push(']');
                rendered
            }
            None => "[unrouted]".to_string(),
        }
    }

    /// Build a successful reply mirroring this request's route.
    pub fn reply(&self, payload: &[u8]) -> OutgoingMessage {
        OutgoingMessage {
            route: self.route.clone(),
            command: self.command.clone(),
            id: self.id,
            status: STATUS_SUCCESS,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Build an error reply carrying `status` and no payload.
    pub fn reply_error(&self, status: u32) -> OutgoingMessage {
        OutgoingMessage {
            route: self.route.clone(),
            command: self.command.clone(),
            id: self.id,
            status,
            payload: Bytes::new(),
        }
    }
}

/// A reply waiting to be written onto the transport.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    route: Route,
    command: String,
    id: u32,
    status: u32,
    payload: Bytes,
}

impl OutgoingMessage {
    /// Split into the routing identity and the frames to send.
    ///
    /// The first queued identity addresses the peer; any further hops are
    /// re-emitted as leading frames so intermediate routers can unwind them.
    pub fn into_parts(mut self) -> Result<(Identity, Multipart), MessageError> {
        let identity = self.route.dequeue().ok_or(MessageError::EmptyRoute)?;

        let mut parts: Multipart = Vec::with_capacity(4 + self.route.len());
        while let Some(hop) = self.route.dequeue() {
            parts.push(hop);
        }

        if self.route.delimited() {
            parts.push(Bytes::new());
        }

        parts.push(Bytes::from(self.command.into_bytes()));
        parts.push(Bytes::copy_from_slice(&self.id.to_le_bytes()));

        let mut data = BytesMut::with_capacity(4 + self.payload.len());
        data.put_u32_le(self.status);
        data.extend_from_slice(&self.payload);
        parts.push(data.freeze());

        Ok((identity, parts))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// A backend reply as seen by the querying (dealer) side.
#[derive(Debug, Clone)]
pub struct QueryReply {
    pub command: String,
    pub sequence: u32,
    pub status: u32,
    pub payload: Bytes,
}

impl QueryReply {
    /// Parse the frames a dealer receives: `[delimiter?][command][id][data]`.
    pub fn from_parts(parts: &Multipart) -> Result<Self, MessageError> {
        let offset = usize::from(parts.first().map(|frame| frame.is_empty()).unwrap_or(false));

        if parts.len() - offset != 3 {
            return Err(MessageError::BadFrameCount(parts.len()));
        }

        let command = String::from_utf8(parts[offset].to_vec())
            .map_err(|_| MessageError::BadCommand)?;

        let sequence_bytes: [u8; 4] = parts[offset + 1]
            .as_ref()
            .try_into()
            .map_err(|_| MessageError::BadCorrelation)?;

        let data = &parts[offset + 2];
        if data.len() < 4 {
            return Err(MessageError::ShortData);
        }

        let status_bytes: [u8; 4] = data[..4].try_into().expect("length checked");

        Ok(Self {
            command,
            sequence: u32::from_le_bytes(sequence_bytes),
            status: u32::from_le_bytes(status_bytes),
            payload: data.slice(4..),
        })
    }
}
