//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use module_gateway::config::GatewayConfig;
use module_gateway::lifecycle::Shutdown;
use module_gateway::module::ModuleRegistry;
use module_gateway::routing::RouteHooks;
use module_gateway::GatewayServer;

/// A gateway running on an ephemeral local port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub registry: Arc<ModuleRegistry>,
    pub hooks: Arc<RouteHooks>,
    pub config_updates: mpsc::UnboundedSender<GatewayConfig>,
    shutdown: Shutdown,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to return.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Start a gateway with `config`; modules are registered afterwards through
/// `registry`.
pub async fn start_gateway(mut config: GatewayConfig) -> TestGateway {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();
    config.listener.shutdown_timeout_secs = 2;

    let registry = Arc::new(ModuleRegistry::new());
    let hooks = Arc::new(RouteHooks::new());
    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();

    let server = GatewayServer::new(config, registry.clone(), hooks.clone());
    let server_shutdown = shutdown.subscribe();
    let task = tokio::spawn(async move { server.run(listener, updates_rx, server_shutdown).await });

    TestGateway {
        addr,
        registry,
        hooks,
        config_updates,
        shutdown,
        task,
    }
}

/// Client without connection reuse or proxies, so every request opens a
/// fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Shared event log written by test modules.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }

    /// Wait until `event` has been recorded at least once.
    pub async fn wait_for(&self, event: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(event) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("event {:?} not seen, got {:?}", event, self.snapshot()));
    }
}
