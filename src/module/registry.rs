//! Module registry.
//!
//! # Responsibilities
//! - Map case-insensitive module ids to modules, one table per capability
//! - Enforce id uniqueness within each capability table
//! - Resolve ids for the router (HTTP entries win over WebSocket entries)
//!
//! # Design Decisions
//! - One reader-writer lock guards both tables so a dual-capability
//!   registration checks both slots before mutating either
//! - Lookups only take the read lock and run concurrently
//! - Owned by the host and shared with the router through `Arc`

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::RegistryError;
use crate::module::{Capability, Module};

#[derive(Default)]
struct Tables {
    http: HashMap<String, Module>,
    websocket: HashMap<String, Module>,
}

/// Registry of modules keyed by lowercase id.
#[derive(Default)]
pub struct ModuleRegistry {
    tables: RwLock<Tables>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module` under `id` for every capability it declares.
    ///
    /// Both capability slots are checked before either is written, so a
    /// failed registration never leaves a partial entry behind.
    pub fn register(&self, id: &str, module: Module) -> Result<(), RegistryError> {
        let id = id.to_lowercase();
        let http = module.supports(Capability::Http);
        let websocket = module.supports(Capability::WebSocket);
        if !http && !websocket {
            return Err(RegistryError::InvalidModuleType);
        }

        let mut tables = self.tables.write();
        if http && tables.http.contains_key(&id) {
            return Err(RegistryError::DuplicateId {
                id,
                capability: Capability::Http,
            });
        }
        if websocket && tables.websocket.contains_key(&id) {
            return Err(RegistryError::DuplicateId {
                id,
                capability: Capability::WebSocket,
            });
        }

        if http {
            tables.http.insert(id.clone(), module.clone());
        }
        if websocket {
            tables.websocket.insert(id.clone(), module);
        }
        tracing::debug!(module_id = %id, http, websocket, "Module registered");
        Ok(())
    }

    /// Remove `id` from the HTTP table, or from the WebSocket table when the
    /// HTTP table has no such entry. Returns whether anything was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let id = id.to_lowercase();
        let mut tables = self.tables.write();
        let removed = tables.http.remove(&id).is_some() || tables.websocket.remove(&id).is_some();
        if removed {
            tracing::debug!(module_id = %id, "Module unregistered");
        }
        removed
    }

    /// Resolve an id. Anything from the first `?` onward is ignored.
    pub fn lookup(&self, id: Option<&str>) -> Option<Module> {
        let id = id?.to_lowercase();
        let id = id.split('?').next().unwrap_or_default();
        let tables = self.tables.read();
        tables
            .http
            .get(id)
            .or_else(|| tables.websocket.get(id))
            .cloned()
    }

    /// Registered ids for one capability, sorted.
    pub fn module_ids(&self, capability: Capability) -> Vec<String> {
        let tables = self.tables.read();
        let table = match capability {
            Capability::Http => &tables.http,
            Capability::WebSocket => &tables.websocket,
        };
        let mut ids: Vec<String> = table.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether no module is registered at all.
    pub fn is_empty(&self) -> bool {
        let tables = self.tables.read();
        tables.http.is_empty() && tables.websocket.is_empty()
    }
}
