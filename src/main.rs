use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use bedboard_core::config::{
    bed_inventory_from_env_value, core_config_from_env, store_timeout_from_env_value,
};
use bedboard_core::{BedBoardService, BedInventory};

/// Main entry point for the bed board
///
/// Opens the bed store, seeds the bed inventory when one is configured and serves the REST API
/// until interrupted.
///
/// # Environment Variables
/// - `BEDBOARD_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `BEDBOARD_DATA_DIR`: Directory of the bed store (default: "bed_data")
/// - `BEDBOARD_TAT_SECONDS`: TAT countdown duration (default: 1800)
/// - `BEDBOARD_UTC_OFFSET`: Hospital wall-clock offset for admission day keys (default: "+00:00")
/// - `BEDBOARD_FORM_KEYS`: Comma-separated clinical form keys (default: built-in catalogue)
/// - `BEDBOARD_BED_INVENTORY`: YAML bed inventory seeded at startup (optional)
/// - `BEDBOARD_STORE_TIMEOUT_MS`: Bound on each store call made by the REST API (default: 5000)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bedboard=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = core_config_from_env()?;
    let store_timeout =
        store_timeout_from_env_value(std::env::var("BEDBOARD_STORE_TIMEOUT_MS").ok())?;
    let rest_addr =
        std::env::var("BEDBOARD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let service = BedBoardService::open(config)?;

    if let Some(path) = bed_inventory_from_env_value(std::env::var("BEDBOARD_BED_INVENTORY").ok())
    {
        let report = service.seed_inventory(BedInventory::load(&path)?)?;
        tracing::info!(
            "++ Seeded bed inventory from {}: {} created, {} already present",
            path.display(),
            report.created.len(),
            report.skipped.len()
        );
    }

    let state = AppState::new(service, store_timeout);
    let app = router(state.clone());

    tracing::info!("++ Starting bed board REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("-- Shutting down, flushing bed store");
    state.service().flush()?;

    Ok(())
}
