//! Test server harness for E2E testing
//!
//! Provides `TestPartyServer` for spawning real party service instances in
//! tests, backed by `InMemoryStore` and `MockMovieCatalog`.

use party_service::catalog::mock::MockMovieCatalog;
use party_service::hub::{HubHandle, HubSettings};
use party_service::observability::metrics::init_metrics_recorder;
use party_service::party::{CoordinatorSettings, PartyCoordinator};
use party_service::routes::{self, AppState};
use party_service::store::InMemoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Knobs for [`TestPartyServer::spawn_with`].
pub struct TestServerOptions {
    pub coordinator: CoordinatorSettings,
    pub hub: HubSettings,
    pub catalog: MockMovieCatalog,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorSettings::default(),
            hub: HubSettings::default(),
            catalog: MockMovieCatalog::classics(),
        }
    }
}

/// Test harness for spawning the party service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestPartyServer::spawn().await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestPartyServer {
    addr: SocketAddr,
    store: Arc<InMemoryStore>,
    catalog: Arc<MockMovieCatalog>,
    coordinator: Arc<PartyCoordinator>,
    hub: HubHandle,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestPartyServer {
    /// Spawn a server with default settings and the classics catalog.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawn a server on a random port (127.0.0.1:0).
    pub async fn spawn_with(options: TestServerOptions) -> Result<Self, anyhow::Error> {
        let store = Arc::new(InMemoryStore::new());
        let catalog = Arc::new(options.catalog);
        let coordinator = Arc::new(PartyCoordinator::new(
            Arc::clone(&store),
            catalog.clone(),
            options.coordinator,
        ));
        let hub = HubHandle::new();
        let shutdown = CancellationToken::new();

        let state = Arc::new(AppState {
            coordinator: Arc::clone(&coordinator),
            hub: hub.clone(),
            hub_settings: options.hub,
            shutdown: shutdown.clone(),
        });

        // The global recorder can only be installed once per test process.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                let recorder = PrometheusBuilder::new().build_recorder();
                recorder.handle()
            }
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            store,
            catalog,
            coordinator,
            hub,
            shutdown,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL for a party with the token in the query string.
    pub fn ws_url(&self, party_id: &str, token: &str) -> String {
        format!("ws://{}/ws/party/{}?token={}", self.addr, party_id, token)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn catalog(&self) -> &MockMovieCatalog {
        &self.catalog
    }

    pub fn coordinator(&self) -> &PartyCoordinator {
        &self.coordinator
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Flips readiness to 503 as a shutdown signal would.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestPartyServer {
    fn drop(&mut self) {
        self.hub.cancel();
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestPartyServer::spawn().await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.addr().port() > 0);

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, "OK");

        Ok(())
    }

    #[tokio::test]
    async fn test_ws_url_format() -> Result<(), anyhow::Error> {
        let server = TestPartyServer::spawn().await?;
        let url = server.ws_url("p1", "abc");

        assert_eq!(url, format!("ws://{}/ws/party/p1?token=abc", server.addr()));
        Ok(())
    }
}
