//! Pluggable HTTP/WebSocket module gateway.
//!
//! Requests whose first path segment names a registered module are handed to
//! that module: plain requests to its HTTP handler, upgrade requests to a
//! per-connection WebSocket handler.

// Core subsystems
pub mod error;
pub mod http;
pub mod module;
pub mod net;
pub mod routing;
pub mod websocket;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::{ConnectionError, GatewayError, ModuleError, RegistryError};
pub use http::{GatewayRequest, GatewayServer, HttpParams, ResponseBuilder, ResponseDraft};
pub use lifecycle::Shutdown;
pub use module::{Capability, HttpModule, Module, ModuleRegistry, WebSocketModule};
pub use routing::{ModuleRequestEvent, RouteHooks};
pub use websocket::{Handshake, WebSocketConnection, WebSocketHandler};
