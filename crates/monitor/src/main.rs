//! Drowsiness monitor binary

use std::path::PathBuf;

use monitor::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("DROWSY_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    init_logging(&config.logging)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Threshold {} frames, camera {}x{} @ {}fps",
        config.dms.threshold()?,
        config.camera.width,
        config.camera.height,
        config.camera.fps
    );

    run_server(config).await
}
