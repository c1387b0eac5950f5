//! camstream: serve a camera as an MJPEG stream over HTTP

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camstream::exposure::{maintenance, AutoExposure};
use camstream::hardware::CameraHardware;
use camstream::server::{self, AppState};
use camstream::{capture, Config};
use color_eyre::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("camstream=debug,tower_http=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("camstream launching...");

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Arc::new(Config::load(config_path.as_deref())?);

    // Open the camera; the sensor profile goes in with the first stream or maintenance pass
    let (source, sensor) = capture::open(&config.capture)?;
    let hardware = Arc::new(CameraHardware::new(sensor, config.sensor.clone()));

    if let Some(interval_ms) = config.exposure.maintenance_interval_ms {
        let auto_exposure = AutoExposure::from_config(&config.exposure, hardware.clone());
        tokio::spawn(maintenance::run(
            source.clone(),
            hardware.clone(),
            auto_exposure,
            Duration::from_millis(interval_ms),
        ));
    }

    let app = server::router(AppState {
        source,
        hardware,
        config: config.clone(),
    });

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!("Serving on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    info!("camstream shutting down");
    Ok(())
}
