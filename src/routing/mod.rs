//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, headers, buffered body)
//!     → matcher.rs (module id + module-local path)
//!     → hooks.rs (route listeners: veto or rewrite the id)
//!     → module registry lookup
//!     → router.rs (HTTP handler or WebSocket upgrade)
//!     → finalized response or error response
//! ```
//!
//! # Design Decisions
//! - Registry is the only mutable routing state; the router itself is fixed
//!   for the lifetime of the server
//! - No regex in hot path
//! - First cancelling listener wins

pub mod hooks;
pub mod matcher;
pub mod router;

pub use hooks::{ModuleRequestEvent, RouteHooks, RouteListener};
pub use router::ModuleRouter;
