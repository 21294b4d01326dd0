//! HTTP request parsing.
//!
//! # Responsibilities
//! - Parse the request line into exactly three tokens
//! - Lowercase method, protocol, header names and values — except the
//!   `Sec-WebSocket-Key` value, which is base64-encoded binary
//! - Split the query string into a parameter map
//! - Detect upgrade requests and JSON-RPC POST bodies

use std::collections::HashMap;

use crate::error::ProtocolError;

/// A parsed HTTP request. Ephemeral, scoped to one exchange.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub protocol: String,
    pub protocol_version: f64,
    pub message_length: usize,
    pub content_length: usize,
    pub headers: HashMap<String, String>,
    pub parameters: HashMap<String, String>,
    pub upgrade_request: bool,
    pub json_rpc: bool,
    pub json_body: Option<serde_json::Value>,
}

impl HttpRequest {
    /// Header lookup by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Query parameter lookup by case-insensitive name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// HTTP/1.0 closes by default; anything newer keeps the connection
    /// unless asked otherwise.
    pub fn keep_alive(&self) -> bool {
        self.protocol != "http/1.0" || self.header("connection") == Some("keep-alive")
    }
}

/// Parse raw request bytes (headers plus any body already received).
pub fn parse_http(raw: &[u8]) -> Result<HttpRequest, ProtocolError> {
    let text = String::from_utf8_lossy(raw);

    let line_end = text.find("\r\n").ok_or(ProtocolError::TruncatedRequest)?;
    let request_line = &text[..line_end];

    let mut tokens = request_line.split_whitespace();
    let (Some(method), Some(target), Some(protocol), None) =
        (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(ProtocolError::BadRequestLine);
    };

    let (uri, query) = match target.split_once('?') {
        Some((uri, query)) => (uri, Some(query)),
        None => (target, None),
    };

    let method = method.to_ascii_lowercase();
    let protocol = protocol.to_ascii_lowercase();
    let protocol_version = protocol
        .split_once('/')
        .and_then(|(_, version)| version.parse::<f64>().ok())
        .unwrap_or(0.0);

    let mut headers = HashMap::new();
    for line in text[line_end + 2..].split("\r\n") {
        if line.is_empty() {
            // Blank line ends the header block; what follows is the body.
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        let value = if name == "sec-websocket-key" {
            value.to_string()
        } else {
            value.to_ascii_lowercase()
        };
        headers.insert(name, value);
    }

    let mut parameters = HashMap::new();
    if let Some(query) = query {
        for pair in query.split('&') {
            let pair = pair.split(' ').next().unwrap_or(pair);
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            parameters.insert(
                key.trim().to_ascii_lowercase(),
                value.trim().to_ascii_lowercase(),
            );
        }
    }

    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);

    let upgrade_request = headers
        .get("connection")
        .map(|value| value.contains("upgrade"))
        .unwrap_or(false)
        && headers.contains_key("sec-websocket-key");

    // A POST body that parses as JSON marks the request as JSON-RPC; other
    // bodies are left alone rather than treated as errors. Non-standard
    // clients often omit the content-type, so it is deliberately ignored.
    let mut json_body = None;
    if method == "post" && content_length > 0 && raw.len() >= content_length {
        json_body = serde_json::from_slice::<serde_json::Value>(&raw[raw.len() - content_length..])
            .ok();
    }

    Ok(HttpRequest {
        method,
        uri: uri.to_string(),
        protocol,
        protocol_version,
        message_length: raw.len(),
        content_length,
        headers,
        parameters,
        upgrade_request,
        json_rpc: json_body.is_some(),
        json_body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_tokens() {
        let request = parse_http(b"GET /status HTTP/1.1\r\nHost: Example.COM\r\n\r\n").unwrap();
        assert_eq!(request.method, "get");
        assert_eq!(request.uri, "/status");
        assert_eq!(request.protocol, "http/1.1");
        assert!((request.protocol_version - 1.1).abs() < f64::EPSILON);
        assert_eq!(request.header("host"), Some("example.com"));
    }

    #[test]
    fn rejects_wrong_token_counts() {
        assert!(matches!(
            parse_http(b"GET /status\r\n\r\n"),
            Err(ProtocolError::BadRequestLine)
        ));
        assert!(matches!(
            parse_http(b"GET /a /b HTTP/1.1 extra\r\n\r\n"),
            Err(ProtocolError::BadRequestLine)
        ));
        assert!(matches!(
            parse_http(b"no line break at all"),
            Err(ProtocolError::TruncatedRequest)
        ));
    }

    #[test]
    fn websocket_key_value_keeps_case() {
        let raw = b"GET / HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: WebSocket\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        let request = parse_http(raw).unwrap();
        assert!(request.upgrade_request);
        assert_eq!(
            request.header("sec-websocket-key"),
            Some("dGhlIHNhbXBsZSBub25jZQ==")
        );
        // Everything else is lowercased.
        assert_eq!(request.header("upgrade"), Some("websocket"));
    }

    #[test]
    fn splits_query_parameters() {
        let request = parse_http(b"GET /q?Height=42&Hash=AB HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.uri, "/q");
        assert_eq!(request.parameter("height"), Some("42"));
        assert_eq!(request.parameter("hash"), Some("ab"));
    }

    #[test]
    fn upgrade_needs_connection_and_key() {
        let without_key = parse_http(b"GET / HTTP/1.1\r\nConnection: upgrade\r\n\r\n").unwrap();
        assert!(!without_key.upgrade_request);

        let without_upgrade =
            parse_http(b"GET / HTTP/1.1\r\nSec-WebSocket-Key: abc\r\n\r\n").unwrap();
        assert!(!without_upgrade.upgrade_request);
    }

    #[test]
    fn post_body_json_marks_json_rpc() {
        let body = r#"{"id":7,"method":"ping","params":[]}"#;
        let raw = format!(
            "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let request = parse_http(raw.as_bytes()).unwrap();
        assert!(request.json_rpc);
        assert_eq!(request.content_length, body.len());
        let tree = request.json_body.unwrap();
        assert_eq!(tree["id"], 7);
        assert_eq!(tree["method"], "ping");
    }

    #[test]
    fn invalid_post_body_stays_plain_request() {
        let body = "this is not json";
        let raw = format!(
            "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let request = parse_http(raw.as_bytes()).unwrap();
        assert!(!request.json_rpc);
        assert!(request.json_body.is_none());
    }

    #[test]
    fn keep_alive_follows_protocol_and_header() {
        let old = parse_http(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!old.keep_alive());

        let old_keep =
            parse_http(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(old_keep.keep_alive());

        let modern = parse_http(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(modern.keep_alive());
    }

    #[test]
    fn missing_content_length_defaults_to_zero() {
        let request = parse_http(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.content_length, 0);
    }
}
