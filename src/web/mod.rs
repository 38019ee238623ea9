//! Read-only HTTP surface over the device registry.
//!
//! Serves the latest published view and snapshot of every device. Handlers
//! never talk to the NAS themselves; they only read what the coordinators
//! have already published.

pub mod config;
pub mod handlers;
pub mod router;

pub use config::WebConfig;
pub use router::create_app;

use crate::coordinator::DeviceRegistry;
use crate::error::{MonitorError, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Serve the registry until `shutdown` resolves.
pub async fn start_web_server(
    config: WebConfig,
    registry: Arc<DeviceRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_app(&config, registry);

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| MonitorError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Snapshot server listening on http://{}", addr);
    info!("API endpoint: http://{}/api/devices", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Snapshot server stopped");
    Ok(())
}
