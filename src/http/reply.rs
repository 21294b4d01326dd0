//! Status-line replies.

use chrono::Utc;

/// Protocol statuses the gateway emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Switching,
    Ok,
    Created,
    Accepted,
    NoContent,
    MovedPermanently,
    MovedTemporarily,
    NotModified,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
}

impl Status {
    /// Fixed status-code → reason-phrase table.
    pub fn status_line(self) -> &'static str {
        match self {
            Status::Switching => "HTTP/1.1 101 Switching Protocols\r\n",
            Status::Ok => "HTTP/1.0 200 OK\r\n",
            Status::Created => "HTTP/1.0 201 Created\r\n",
            Status::Accepted => "HTTP/1.0 202 Accepted\r\n",
            Status::NoContent => "HTTP/1.0 204 No Content\r\n",
            Status::MovedPermanently => "HTTP/1.0 301 Moved Permanently\r\n",
            Status::MovedTemporarily => "HTTP/1.0 302 Moved Temporarily\r\n",
            Status::NotModified => "HTTP/1.0 304 Not Modified\r\n",
            Status::BadRequest => "HTTP/1.0 400 Bad Request\r\n",
            Status::Unauthorized => "HTTP/1.0 401 Unauthorized\r\n",
            Status::Forbidden => "HTTP/1.0 403 Forbidden\r\n",
            Status::NotFound => "HTTP/1.0 404 Not Found\r\n",
            Status::InternalServerError => "HTTP/1.0 500 Internal Server Error\r\n",
            Status::NotImplemented => "HTTP/1.0 501 Not Implemented\r\n",
            Status::BadGateway => "HTTP/1.0 502 Bad Gateway\r\n",
            Status::ServiceUnavailable => "HTTP/1.0 503 Service Unavailable\r\n",
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Status::Switching => 101,
            Status::Ok => 200,
            Status::Created => 201,
            Status::Accepted => 202,
            Status::NoContent => 204,
            Status::MovedPermanently => 301,
            Status::MovedTemporarily => 302,
            Status::NotModified => 304,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
            Status::BadGateway => 502,
            Status::ServiceUnavailable => 503,
        }
    }
}

/// Builder for the reply headers preceding a body.
pub struct HttpReply;

impl HttpReply {
    /// Status line, `Date`, `Connection`, optional `Content-Type` and
    /// `Content-Length`, blank terminator.
    pub fn generate(
        status: Status,
        mime_type: &str,
        content_length: usize,
        keep_alive: bool,
    ) -> String {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");

        let mut response = String::with_capacity(128);
        response.push_str(status.status_line());
        response.push_str(&format!("Date: {date}\r\n"));
        response.push_str("Accept-Ranges: none\r\n");
        response.push_str(if keep_alive {
            "Connection: keep-alive\r\n"
        } else {
            "Connection: close\r\n"
        });

        if !mime_type.is_empty() {
            response.push_str(&format!("Content-Type: {mime_type}\r\n"));
        }

        if content_length > 0 {
            response.push_str(&format!("Content-Length: {content_length}\r\n"));
        }

        response.push_str("\r\n");
        response
    }

    /// The 101 Switching Protocols reply completing a websocket upgrade.
    pub fn generate_upgrade(accept_key: &str, subprotocol: &str) -> String {
        let mut response = String::with_capacity(160);
        response.push_str(Status::Switching.status_line());
        response.push_str("Upgrade: websocket\r\n");
        response.push_str("Connection: Upgrade\r\n");

        if !subprotocol.is_empty() {
            response.push_str(&format!("Sec-WebSocket-Protocol: {subprotocol}\r\n"));
        }

        response.push_str(&format!("Sec-WebSocket-Accept: {accept_key}\r\n\r\n"));
        response
    }
}
