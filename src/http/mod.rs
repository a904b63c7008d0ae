//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, body buffering limit)
//!     → routing::router (module resolution and dispatch)
//!     → params.rs (query + body parameter view handed to the module)
//!     → response.rs (finalize draft: identity headers, gzip, date, CORS)
//!     → Send to client, then close
//! ```

pub mod compression;
pub mod params;
pub mod response;
pub mod server;

use axum::body::Bytes;
use axum::http::{Request, Response};

pub use params::{Charset, HttpParams};
pub use response::{ResponseBuilder, ResponseSettings};
pub use server::GatewayServer;

/// A fully buffered inbound request, as handed to modules.
pub type GatewayRequest = Request<Bytes>;

/// A response under construction by a module.
pub type ResponseDraft = Response<Bytes>;
