//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind every listener on the one shared store
//! - Hand the bound listeners to a `ServiceLifecycle`
//!
//! # Design Decisions
//! - Fail fast: a listener that cannot bind aborts startup, nothing runs
//! - Listeners are bound before any of them serves, so traffic starts only
//!   when the whole service is ready

use std::sync::Arc;

use crate::config::{ConfigError, ServiceConfig};
use crate::http::HttpServer;
use crate::lifecycle::service::ServiceLifecycle;
use crate::net::ListenerError;
use crate::rpc::RpcServer;
use crate::store::UserStore;

/// Fatal error before the service starts running.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Listen(#[from] ListenerError),
    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Bind the REST and RPC listeners around `store`.
pub async fn bind_service(
    config: &ServiceConfig,
    store: Arc<dyn UserStore>,
) -> Result<ServiceLifecycle, StartupError> {
    let http = HttpServer::bind(&config.http, Arc::clone(&store)).await?;
    let rpc = RpcServer::bind(&config.rpc, store).await?;

    let mut lifecycle = ServiceLifecycle::new(config.shutdown.drain_timeout());
    lifecycle.add_listener(http);
    lifecycle.add_listener(rpc);

    tracing::info!(
        http_address = ?lifecycle.local_addr(HttpServer::NAME),
        rpc_address = ?lifecycle.local_addr(RpcServer::NAME),
        drain_timeout_secs = config.shutdown.drain_timeout_secs,
        "Service bound"
    );
    Ok(lifecycle)
}
