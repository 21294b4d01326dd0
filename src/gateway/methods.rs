//! Method registry: maps JSON-RPC method names onto backend commands.
//!
//! Each translator knows how to encode a query for the wire (embedding the
//! minted sequence number as the correlation token) and how to decode a
//! reply payload into the JSON value placed under `result`.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::transport::Multipart;

type EncodeFn = Arc<dyn Fn(&str, u32) -> Multipart + Send + Sync>;
type DecodeFn = Arc<dyn Fn(&[u8]) -> Value + Send + Sync>;

/// Encoder/decoder pair for one backend command.
#[derive(Clone)]
pub struct QueryTranslator {
    command: String,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl QueryTranslator {
    /// Translator that forwards the first positional parameter verbatim and
    /// decodes the reply payload as JSON (falling back to a string).
    pub fn passthrough(command: impl Into<String>) -> Self {
        let command = command.into();
        let wire_command = command.clone();
        Self {
            command,
            encode: Arc::new(move |parameters: &str, sequence: u32| {
                vec![
                    Bytes::copy_from_slice(wire_command.as_bytes()),
                    Bytes::copy_from_slice(&sequence.to_le_bytes()),
                    Bytes::copy_from_slice(parameters.as_bytes()),
                ]
            }),
            decode: Arc::new(|payload: &[u8]| decode_payload(payload)),
        }
    }

    /// Translator with custom wire encoding and reply decoding.
    pub fn with_codecs(command: impl Into<String>, encode: EncodeFn, decode: DecodeFn) -> Self {
        Self {
            command: command.into(),
            encode,
            decode,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn encode(&self, parameters: &str, sequence: u32) -> Multipart {
        self.encode.as_ref()(parameters, sequence)
    }

    pub fn decode(&self, payload: &[u8]) -> Value {
        self.decode.as_ref()(payload)
    }
}

/// Default reply decoding: JSON when it parses, string otherwise.
pub fn decode_payload(payload: &[u8]) -> Value {
    if payload.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}

/// The set of methods this gateway accepts.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    translators: HashMap<String, QueryTranslator>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method`; a later registration under the same name wins.
    pub fn register(&mut self, method: impl Into<String>, translator: QueryTranslator) {
        self.translators.insert(method.into(), translator);
    }

    pub fn get(&self, method: &str) -> Option<&QueryTranslator> {
        self.translators.get(method)
    }

    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.translators.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_encodes_command_sequence_and_parameters() {
        let translator = QueryTranslator::passthrough("fetch");
        let parts = translator.encode("argument", 77);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].as_ref(), b"fetch");
        assert_eq!(parts[1].as_ref(), 77u32.to_le_bytes());
        assert_eq!(parts[2].as_ref(), b"argument");
    }

    #[test]
    fn decode_prefers_json_then_string() {
        assert_eq!(decode_payload(b""), Value::Null);
        assert_eq!(decode_payload(b"{\"height\":5}")["height"], 5);
        assert_eq!(
            decode_payload(b"plain text"),
            Value::String("plain text".into())
        );
    }

    #[test]
    fn registry_lookup_and_overwrite() {
        let mut registry = MethodRegistry::new();
        assert!(registry.is_empty());

        registry.register("ping", QueryTranslator::passthrough("ping"));
        registry.register("ping", QueryTranslator::passthrough("ping.v2"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("ping").unwrap().command(), "ping.v2");
        assert!(registry.get("missing").is_none());
    }
}
