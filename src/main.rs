//! pmseries datasource - Composition root
//!
//! Wires the pmproxy client factory, the instance registry and the HTTP API
//! together, then runs until a shutdown signal arrives.

use pmseries_datasource::adapters::inbound::{ApiServer, ApiState};
use pmseries_datasource::adapters::outbound::PmseriesClient;
use pmseries_datasource::application::{instance_factory, ClientFactory, Datasource, InstanceManager};
use pmseries_datasource::config::load_config;
use pmseries_datasource::domain::entities::ConnectionSettings;
use pmseries_datasource::domain::ports::MetricsApi;
use pmseries_datasource::domain::value_objects::ResourceMethod;
use pmseries_datasource::infrastructure::{shutdown_signal, ShutdownController};
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting pmseries datasource v{} listen={}",
        env!("CARGO_PKG_VERSION"),
        cfg.listen_addr
    );

    ResourceMethod::validate_table()?;

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapter: one pmproxy client per connection
    let upstream_timeout = cfg.upstream_timeout();
    let forward_basic_auth = cfg.forward_basic_auth;
    let clients: ClientFactory = Arc::new(move |settings: &ConnectionSettings| {
        let auth = if forward_basic_auth {
            settings.basic_auth.clone()
        } else {
            None
        };
        let client = PmseriesClient::new(&settings.url, auth, upstream_timeout)?;
        Ok(Arc::new(client) as Arc<dyn MetricsApi>)
    });

    // 2. Application: instance registry and datasource
    let instances = Arc::new(InstanceManager::new(instance_factory(clients)));
    let datasource = Arc::new(Datasource::new(instances.clone()));

    // 3. Shutdown coordination
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // 4. Inbound adapter
    let state = ApiState::new(datasource, shutdown.clone(), cfg.request_timeout());
    let server = ApiServer::new(cfg.listen_addr.clone(), state);
    let result = server.run().await;

    // Also reached when the server exits on its own, e.g. a bind error
    shutdown.shutdown();
    if !shutdown.wait_for_drain(cfg.shutdown_drain()).await {
        tracing::warn!(
            "{} requests still in flight after drain timeout",
            shutdown.in_flight()
        );
    }

    let disposed = instances.dispose_all();
    tracing::info!("disposed {} datasource instances, exiting", disposed);

    result
}
