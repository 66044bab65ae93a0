use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod render;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = config::Config::load()?;
    tracing::info!(
        device = %config.camera_device,
        references = %config.reference_dir.display(),
        api = %config.api.base_url,
        active = %format!("{}-{}", config.active_start, config.active_end),
        "configuration loaded"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let loop_stop = stop.clone();
    let mut capture = tokio::task::spawn_blocking(move || engine::run(config, loop_stop));

    let outcome = tokio::select! {
        joined = &mut capture => joined,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("rollcalld shutting down");
            stop.store(true, Ordering::SeqCst);
            capture.await
        }
    };

    outcome??;
    tracing::info!("rollcalld stopped");
    Ok(())
}
