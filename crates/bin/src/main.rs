//! doomsday-sv - headless delta replication server

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("doomsday-sv v{}", env!("CARGO_PKG_VERSION"));

    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!(
        "  Map: {}x{} sectors of {}",
        config.simulation.grid_columns, config.simulation.grid_rows, config.simulation.sector_size
    );
    info!("  Mobjs: {}", config.simulation.mobjs);
    info!(
        "  Pool: sound range {}, ack threshold x{} (min {}ms)",
        config.pool.sound_max_distance,
        config.pool.ack_threshold_multiplier,
        config.pool.min_ack_threshold_ms
    );

    server::run(config).await?;

    Ok(())
}
