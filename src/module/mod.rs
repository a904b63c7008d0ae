//! Pluggable modules and their registry.
//!
//! # Data Flow
//! ```text
//! Host startup
//!     → Module::http / Module::websocket / Module::dual (declare capabilities)
//!     → registry.rs (register under a lowercase id)
//!
//! Per request
//!     → routing extracts the id from the URI
//!     → registry.rs lookup (HTTP table first, then WebSocket table)
//!     → router branches on the capabilities of the returned Module
//! ```
//!
//! # Design Decisions
//! - Capabilities are declared up front, dispatch is a capability check
//! - A single implementation may serve both capabilities through one `Arc`
//! - Modules are shared by `Arc`; their own thread-safety is the author's concern

pub mod echo;
pub mod registry;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::ModuleError;
use crate::http::params::HttpParams;
use crate::http::{GatewayRequest, ResponseDraft};
use crate::websocket::{Handshake, WebSocketHandler};

pub use echo::EchoModule;
pub use registry::ModuleRegistry;

/// One of the two ways a module can serve traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Plain request/response traffic.
    Http,
    /// Upgraded, framed connections.
    WebSocket,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Http => write!(f, "HTTP"),
            Capability::WebSocket => write!(f, "WebSocket"),
        }
    }
}

/// A module serving plain HTTP requests.
pub trait HttpModule: Send + Sync {
    /// Handle one request.
    ///
    /// `path` is the module-local path (always starts with `/`). Returning
    /// `Ok(None)` answers `204 No Content`; returning an error answers `500`
    /// without leaking the error to the client.
    fn handle_request(
        &self,
        path: &str,
        params: &HttpParams,
        request: &GatewayRequest,
    ) -> Result<Option<ResponseDraft>, ModuleError>;
}

/// A module accepting WebSocket upgrades.
pub trait WebSocketModule: Send + Sync {
    /// Build the per-connection handler once the handshake has completed.
    fn new_connection(
        &self,
        handshake: &Handshake,
        path: &str,
        params: HttpParams,
        request: &GatewayRequest,
    ) -> Result<Box<dyn WebSocketHandler>, ModuleError>;
}

/// A registered module with its declared capability set.
#[derive(Clone, Default)]
pub struct Module {
    http: Option<Arc<dyn HttpModule>>,
    websocket: Option<Arc<dyn WebSocketModule>>,
}

impl Module {
    /// A module serving HTTP only.
    pub fn http(module: impl HttpModule + 'static) -> Self {
        Self {
            http: Some(Arc::new(module)),
            websocket: None,
        }
    }

    /// A module serving WebSocket upgrades only.
    pub fn websocket(module: impl WebSocketModule + 'static) -> Self {
        Self {
            http: None,
            websocket: Some(Arc::new(module)),
        }
    }

    /// One implementation serving both capabilities.
    pub fn dual<M>(module: M) -> Self
    where
        M: HttpModule + WebSocketModule + 'static,
    {
        let shared = Arc::new(module);
        Self {
            http: Some(shared.clone()),
            websocket: Some(shared),
        }
    }

    /// Assemble a module from optional capability halves.
    ///
    /// A module with neither half is rejected at registration.
    pub fn from_parts(
        http: Option<Arc<dyn HttpModule>>,
        websocket: Option<Arc<dyn WebSocketModule>>,
    ) -> Self {
        Self { http, websocket }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Http => self.http.is_some(),
            Capability::WebSocket => self.websocket.is_some(),
        }
    }

    pub fn as_http(&self) -> Option<&Arc<dyn HttpModule>> {
        self.http.as_ref()
    }

    pub fn as_websocket(&self) -> Option<&Arc<dyn WebSocketModule>> {
        self.websocket.as_ref()
    }

    /// Whether both handles point at the same modules as `other`.
    pub fn same_as(&self, other: &Module) -> bool {
        fn eq<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }
        eq(&self.http, &other.http) && eq(&self.websocket, &other.websocket)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("http", &self.http.is_some())
            .field("websocket", &self.websocket.is_some())
            .finish()
    }
}

/// Run a module callback, turning a panic into an ordinary error.
pub(crate) fn guard_callback<T>(
    callback: impl FnOnce() -> Result<T, ModuleError>,
) -> Result<T, ModuleError> {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("module panicked: {}", message).into())
        }
    }
}
