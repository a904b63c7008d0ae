//! Request router.
//!
//! # Responsibilities
//! - Buffer the request body (bounded) and reject undecodable requests
//! - Extract the module id and fire the route listeners
//! - Resolve the module and build its parameter view
//! - Branch into the HTTP path or the WebSocket upgrade path
//! - Turn every failure into a complete error response
//!
//! # Design Decisions
//! - Module callbacks run inline on the connection task; panics are caught
//!   and treated like returned errors
//! - HTTP takes priority: an HTTP-capable module only sees an upgrade when it
//!   also declares the WebSocket capability
//! - Metrics use the resolved module id, or `none` when resolution failed

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::{Body, Bytes};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::FromRequestParts;
use axum::http::header::{self, HeaderValue};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::http::params::query_params;
use crate::http::response::{finalize, ResponseSettings};
use crate::http::{Charset, GatewayRequest, HttpParams};
use crate::module::{guard_callback, HttpModule, ModuleRegistry, WebSocketModule};
use crate::net::connection::ConnectionTracker;
use crate::observability::metrics;
use crate::routing::hooks::{ModuleRequestEvent, RouteHooks};
use crate::routing::matcher::split_module_path;
use crate::websocket::dispatcher::{self, ConnectionSetup};
use crate::websocket::{Handshake, SUPPORTED_VERSION};

/// State shared by the HTTP and WebSocket branches of one request.
struct Resolved {
    module_id: String,
    local_path: String,
    params: HttpParams,
    content: Bytes,
    remote_addr: SocketAddr,
}

/// Routes decoded requests to registered modules.
pub struct ModuleRouter {
    registry: Arc<ModuleRegistry>,
    hooks: Arc<RouteHooks>,
    settings: Arc<ArcSwap<ResponseSettings>>,
    max_body_size: usize,
    connections: ConnectionTracker,
    closing_tx: watch::Sender<bool>,
    closing_rx: watch::Receiver<bool>,
}

impl ModuleRouter {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        hooks: Arc<RouteHooks>,
        settings: Arc<ArcSwap<ResponseSettings>>,
        max_body_size: usize,
    ) -> Self {
        let (closing_tx, closing_rx) = watch::channel(false);
        Self {
            registry,
            hooks,
            settings,
            max_body_size,
            connections: ConnectionTracker::new(),
            closing_tx,
            closing_rx,
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn hooks(&self) -> &Arc<RouteHooks> {
        &self.hooks
    }

    /// Live WebSocket connections.
    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// Ask every live WebSocket connection to close.
    ///
    /// Connections upgraded afterwards close right after `register`.
    pub fn begin_shutdown(&self) {
        self.closing_tx.send_replace(true);
    }

    /// Handle one request end to end.
    pub async fn route(&self, request: Request<Body>, remote_addr: SocketAddr) -> Response {
        let start = Instant::now();
        let mut module_label = None;

        let response = match self.dispatch(request, remote_addr, &mut module_label).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    GatewayError::HandlerFailure { module, source } => {
                        tracing::error!(module = %module, error = %source, "Module handler failed");
                    }
                    GatewayError::Finalization(reason) => {
                        tracing::error!(module = ?module_label, error = %reason, "Response finalization failed");
                    }
                    other => {
                        tracing::debug!(remote_addr = %remote_addr, error = %other, "Request rejected");
                    }
                }
                e.into_response()
            }
        };

        metrics::record_request(
            module_label.as_deref().unwrap_or("none"),
            response.status().as_u16(),
            start,
        );
        response
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
        remote_addr: SocketAddr,
        module_label: &mut Option<String>,
    ) -> Result<Response, GatewayError> {
        // 1. Buffer the body; a failure here is a decode failure
        let (parts, body) = request.into_parts();
        let content = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| GatewayError::DecodeFailure(e.to_string()))?;

        // 2. Module id from the first path segment; the local path keeps the query
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let (raw_id, local_path) = split_module_path(target);

        // 3. Route listeners may veto or rewrite the id
        let mut event = ModuleRequestEvent::new(Some(raw_id.to_string()), remote_addr);
        self.hooks.fire(&mut event);
        if event.is_cancelled() {
            return Err(GatewayError::RoutingVetoed);
        }
        let module_id = event.into_module_id();

        // 4. Resolution
        let module = self
            .registry
            .lookup(module_id.as_deref())
            .ok_or_else(|| GatewayError::ModuleNotFound(module_id.clone()))?;
        let module_id = module_id.unwrap_or_default();
        *module_label = Some(module_id.to_lowercase());

        // 5. Parameters: decoded query as base, body parsed lazily on top
        let base = query_params(target);
        let params = HttpParams::new(content.clone(), Charset::from_headers(&parts.headers), Some(base));

        let resolved = Resolved {
            module_id,
            local_path,
            params,
            content,
            remote_addr,
        };

        // 6. Protocol branch
        if !parts.headers.contains_key(header::UPGRADE) {
            if let Some(http) = module.as_http() {
                return self.serve_http(http.as_ref(), parts, resolved);
            }
        }
        if let Some(websocket) = module.as_websocket() {
            return self.upgrade(Arc::clone(websocket), parts, resolved).await;
        }
        Err(GatewayError::CapabilityMismatch(resolved.module_id))
    }

    fn serve_http(
        &self,
        module: &dyn HttpModule,
        parts: Parts,
        resolved: Resolved,
    ) -> Result<Response, GatewayError> {
        let request: GatewayRequest = Request::from_parts(parts, resolved.content);
        let draft = guard_callback(|| module.handle_request(&resolved.local_path, &resolved.params, &request))
            .map_err(|source| GatewayError::HandlerFailure {
                module: resolved.module_id.clone(),
                source,
            })?;

        match draft {
            Some(draft) => finalize(draft, &resolved.module_id, request.headers(), &self.settings.load()),
            None => Ok(no_content()),
        }
    }

    async fn upgrade(
        &self,
        module: Arc<dyn WebSocketModule>,
        mut parts: Parts,
        resolved: Resolved,
    ) -> Result<Response, GatewayError> {
        let version = parts
            .headers
            .get(header::SEC_WEBSOCKET_VERSION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        if version != Some(SUPPORTED_VERSION) {
            return Err(GatewayError::HandshakeVersionUnsupported(version.map(str::to_string)));
        }

        let handshake = Handshake::from_parts(&parts);
        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => {
                tracing::debug!(module = %resolved.module_id, error = %rejection, "WebSocket handshake rejected");
                return Ok(rejection.into_response());
            }
        };
        let request: GatewayRequest = Request::from_parts(parts, resolved.content);

        let guard = self.connections.track();
        let closing = self.closing_rx.clone();
        let setup = ConnectionSetup {
            module,
            module_id: resolved.module_id,
            remote_addr: resolved.remote_addr,
            handshake,
            path: resolved.local_path,
            params: resolved.params,
            request,
        };
        let remote_addr = setup.remote_addr;

        Ok(upgrade
            .on_failed_upgrade(move |e| {
                tracing::warn!(remote_addr = %remote_addr, error = %e, "WebSocket upgrade failed");
            })
            .on_upgrade(move |socket| dispatcher::serve(socket, setup, guard, closing)))
    }
}

/// Answer for a handler that produced no response.
fn no_content() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
