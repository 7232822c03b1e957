use log::{error, info};
use std::time::Duration;

use serial_sensors::config::{ArrayConfig, DEFAULT_CONFIG_FILE};
use serial_sensors::error::{Result, SensorError};
use serial_sensors::sensor::SensorArray;

/// Interval between snapshot log lines.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    if let Err(e) = run(&path).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(path: &str) -> Result<()> {
    let config = ArrayConfig::load(path)?;
    let array = SensorArray::from_config(&config)?;

    let _subscription = array.subscribe(|event| info!("{event}"));
    array.start()?;

    let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| SensorError::runtime(format!("cannot listen for Ctrl-C: {e}")))?;
                break;
            }
            _ = ticker.tick() => {
                info!("snapshot: {}", array.snapshot());
            }
        }
    }

    info!("shutting down");
    array.close();
    array.wait_closed().await;
    Ok(())
}
