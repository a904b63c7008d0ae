//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection (accepted by axum::serve)
//!     → HTTP request/response, connection closed after the response
//!     → or protocol upgrade:
//!         connection.rs (id, state machine, live-connection tracking)
//!         → Hand off to the WebSocket dispatcher
//!
//! Upgraded Connection States:
//!     HttpHandshaking → WebSocketActive → Closed
//! ```
//!
//! # Design Decisions
//! - Each upgraded connection tracked for graceful shutdown
//! - State only moves forward; a closed connection never reopens

pub mod connection;
