//! Pre-dispatch route listeners.
//!
//! # Responsibilities
//! - Carry the candidate module id and peer address to listeners
//! - Let listeners cancel a request or rewrite its module id
//!
//! # Design Decisions
//! - Listeners run synchronously, in registration order, on the request task
//! - The first listener that cancels stops the chain
//! - The listener list is copied out of the lock before listeners run, so a
//!   listener may register another listener without deadlocking

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;

/// Event raised before a module id is resolved.
#[derive(Debug, Clone)]
pub struct ModuleRequestEvent {
    module_id: Option<String>,
    remote_addr: SocketAddr,
    cancelled: bool,
}

impl ModuleRequestEvent {
    pub fn new(module_id: Option<String>, remote_addr: SocketAddr) -> Self {
        Self {
            module_id,
            remote_addr,
            cancelled: false,
        }
    }

    pub fn module_id(&self) -> Option<&str> {
        self.module_id.as_deref()
    }

    /// Redirect the request to another module; `None` resolves to nothing.
    pub fn set_module_id(&mut self, module_id: Option<String>) {
        self.module_id = module_id;
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    pub fn into_module_id(self) -> Option<String> {
        self.module_id
    }
}

/// Listener for [`ModuleRequestEvent`]s.
pub trait RouteListener: Send + Sync {
    fn on_module_request(&self, event: &mut ModuleRequestEvent);
}

impl<F> RouteListener for F
where
    F: Fn(&mut ModuleRequestEvent) + Send + Sync,
{
    fn on_module_request(&self, event: &mut ModuleRequestEvent) {
        self(event)
    }
}

/// Ordered list of route listeners.
#[derive(Default)]
pub struct RouteHooks {
    listeners: RwLock<Vec<Arc<dyn RouteListener>>>,
}

impl RouteHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: impl RouteListener + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Run listeners until one cancels the event.
    pub fn fire(&self, event: &mut ModuleRequestEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_module_request(event);
            if event.is_cancelled() {
                tracing::debug!(
                    module_id = ?event.module_id(),
                    remote_addr = %event.remote_addr(),
                    "Module request cancelled by listener"
                );
                break;
            }
        }
    }
}
