//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router feeding every request into the module router
//! - Wire up middleware (request ID, tracing)
//! - Bind server to listener
//! - Apply hot-reloaded response settings
//! - Graceful shutdown: stop accepting, close WebSocket connections, drain

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{GatewayConfig, ListenerConfig};
use crate::http::response::ResponseSettings;
use crate::module::ModuleRegistry;
use crate::routing::{ModuleRouter, RouteHooks};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ModuleRouter>,
}

/// HTTP server for the module gateway.
pub struct GatewayServer {
    app: Router,
    config: GatewayConfig,
    router: Arc<ModuleRouter>,
    settings: Arc<ArcSwap<ResponseSettings>>,
}

impl GatewayServer {
    /// Create a new server over the host's registry and route listeners.
    pub fn new(config: GatewayConfig, registry: Arc<ModuleRegistry>, hooks: Arc<RouteHooks>) -> Self {
        let settings = Arc::new(ArcSwap::from_pointee(response_settings(&config)));
        let router = Arc::new(ModuleRouter::new(
            registry,
            hooks,
            settings.clone(),
            config.listener.max_body_size,
        ));

        let app = Self::build_router(AppState {
            router: router.clone(),
        });
        Self {
            app,
            config,
            router,
            settings,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(gateway_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configurations received on `config_updates` replace the response
    /// settings of the running server.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            http_modules = ?self.router.registry().module_ids(crate::module::Capability::Http),
            websocket_modules = ?self.router.registry().module_ids(crate::module::Capability::WebSocket),
            "Gateway server starting"
        );

        // 1. Apply reloaded configuration in the background
        let settings = self.settings.clone();
        let listener_config = self.config.listener.clone();
        let reload = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                apply_config(&settings, &listener_config, &new_config);
            }
        });

        // 2. Serve until shutdown; WebSocket connections are told to close
        //    as soon as the signal arrives
        let router = self.router.clone();
        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown requested, closing WebSocket connections");
                router.begin_shutdown();
            })
            .await?;
        reload.abort();

        // 3. Upgraded connections are not tracked by axum; drain them here
        let timeout = Duration::from_secs(self.config.listener.shutdown_timeout_secs);
        let connections = self.router.connections();
        match tokio::time::timeout(timeout, connections.wait_for_drain()).await {
            Ok(()) => tracing::info!("All connections drained"),
            Err(_) => tracing::warn!(
                remaining = connections.active_count(),
                "Shutdown timeout elapsed with connections still open"
            ),
        }

        tracing::info!("Gateway server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The module router behind this server.
    pub fn router(&self) -> &Arc<ModuleRouter> {
        &self.router
    }

    /// Response settings currently in effect.
    pub fn settings(&self) -> Arc<ResponseSettings> {
        self.settings.load_full()
    }
}

/// Every request, whatever its method or path, goes to the module router.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.router.route(request, addr).await
}

fn response_settings(config: &GatewayConfig) -> ResponseSettings {
    ResponseSettings::from_config(&config.response).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Invalid response header configuration, using defaults");
        ResponseSettings::default()
    })
}

/// Swap in the response settings of `new_config`.
fn apply_config(
    settings: &ArcSwap<ResponseSettings>,
    current_listener: &ListenerConfig,
    new_config: &GatewayConfig,
) {
    match ResponseSettings::from_config(&new_config.response) {
        Ok(new_settings) => {
            settings.store(Arc::new(new_settings));
            tracing::info!("Response settings reloaded");
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected reloaded response settings");
        }
    }
    if new_config.listener != *current_listener {
        tracing::warn!("Listener settings changed; restart required to apply them");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reload_swaps_response_settings() {
        let settings = ArcSwap::from_pointee(ResponseSettings::default());
        let mut config = GatewayConfig::default();
        config.response.server_name = "reloaded".into();
        config.response.access_control_allow_origin = Some("https://example.com".into());

        apply_config(&settings, &ListenerConfig::default(), &config);
        let current = settings.load();
        assert_eq!(current.server, HeaderValue::from_static("reloaded"));
        assert_eq!(
            current.access_control_allow_origin,
            Some(HeaderValue::from_static("https://example.com"))
        );
    }

    #[test]
    fn invalid_reload_keeps_previous_settings() {
        let settings = ArcSwap::from_pointee(ResponseSettings::default());
        let before = settings.load_full();
        let mut config = GatewayConfig::default();
        config.response.powered_by = "bad\r\nvalue".into();

        apply_config(&settings, &ListenerConfig::default(), &config);
        assert!(Arc::ptr_eq(&before, &settings.load_full()));
    }

    #[test]
    fn server_starts_from_config() {
        let mut config = GatewayConfig::default();
        config.response.server_name = "edge".into();
        let server = GatewayServer::new(
            config,
            Arc::new(ModuleRegistry::new()),
            Arc::new(RouteHooks::new()),
        );
        assert_eq!(server.settings().server, HeaderValue::from_static("edge"));
        assert_eq!(server.config().listener.max_body_size, 65_536);
    }
}
