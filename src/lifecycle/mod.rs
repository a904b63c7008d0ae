//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Trigger → server stops accepting → WebSocket connections closed (1001)
//!     → drain tracked connections → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, close upgraded connections, drain
//! - Shutdown has timeout: the server returns after the deadline even if
//!   connections are still open

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
