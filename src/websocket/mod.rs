//! WebSocket connection handling.
//!
//! # Responsibilities
//! - Describe the completed handshake to modules
//! - Define the lifecycle callbacks module authors override
//! - Demultiplex inbound frames to those callbacks
//! - Expose fire-and-forget outbound sends
//!
//! # Data Flow
//! ```text
//! routing::router (WebSocket-capable module, version 13)
//!     → axum WebSocketUpgrade (101 Switching Protocols)
//!     → WebSocketModule::new_connection (module builds its handler)
//!     → dispatcher.rs (register, then frames in arrival order)
//!     → handle_disconnect exactly once on teardown
//! ```
//!
//! # Design Decisions
//! - One task owns the socket: frames, outbound sends and shutdown are
//!   multiplexed with `select!`, so callbacks never run concurrently for the
//!   same connection
//! - Ping is answered with a Pong carrying the same payload; callbacks are not
//!   involved
//! - Binary frames are rejected unless the handler overrides the callback

pub mod connection;
pub mod dispatcher;

use axum::http::{header, request::Parts};

use crate::error::{ConnectionError, ModuleError};

pub use connection::{SendHandle, WebSocketConnection};

/// Protocol version accepted during the handshake (RFC 6455).
pub const SUPPORTED_VERSION: &str = "13";

/// Result of a successful opening handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Negotiated protocol version.
    pub version: u8,
    /// `ws://<host><target>` the client connected to.
    pub location: String,
    /// Sub-protocols the client offered, in order.
    pub requested_protocols: Vec<String>,
}

impl Handshake {
    pub(crate) fn from_parts(parts: &Parts) -> Self {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or_default();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let requested_protocols = parts
            .headers
            .get_all(header::SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            version: 13,
            location: format!("ws://{}{}", host, target),
            requested_protocols,
        }
    }
}

/// Per-connection callbacks implemented by WebSocket modules.
///
/// Every callback runs on the connection's own task, one at a time, in the
/// order frames arrived.
pub trait WebSocketHandler: Send {
    /// Called once after the handshake, before any frame is dispatched.
    fn register(&mut self, _conn: &WebSocketConnection) -> Result<(), ModuleError> {
        Ok(())
    }

    fn handle_text_message(
        &mut self,
        _conn: &WebSocketConnection,
        _message: String,
    ) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Binary frames are refused unless overridden.
    fn handle_binary_message(
        &mut self,
        _conn: &WebSocketConnection,
        _data: axum::body::Bytes,
    ) -> Result<(), ModuleError> {
        Err(Box::new(ConnectionError::UnsupportedMessageType(
            "binary".to_string(),
        )))
    }

    /// Called exactly once when the connection goes away.
    fn handle_disconnect(&mut self, _conn: &WebSocketConnection) {}

    /// Called for any error raised by dispatch or by another callback.
    ///
    /// The default logs the error and closes the connection.
    fn handle_exception(&mut self, conn: &WebSocketConnection, error: ConnectionError) {
        tracing::error!(
            connection_id = %conn.id(),
            module = %conn.module_id(),
            error = %error,
            "WebSocket connection error"
        );
        // The completion handle is not needed; teardown follows either way.
        let _ = conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn handshake_describes_request() {
        let (parts, _) = Request::builder()
            .uri("/chat/room?x=1")
            .header(header::HOST, "example.com:8080")
            .header(header::SEC_WEBSOCKET_PROTOCOL, "v2.chat, v1.chat")
            .body(())
            .unwrap()
            .into_parts();

        let handshake = Handshake::from_parts(&parts);
        assert_eq!(handshake.version, 13);
        assert_eq!(handshake.location, "ws://example.com:8080/chat/room?x=1");
        assert_eq!(handshake.requested_protocols, vec!["v2.chat", "v1.chat"]);
    }
}
