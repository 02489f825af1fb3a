//! IIDC Capture - Main Entry Point
//!
//! Usage: `iidc-capture [list|info|capture] [config.toml]`

use anyhow::{bail, Context, Result};
use capture_cli::{build_engine, describe_device, init_logging, run_capture, CliConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "capture".to_string());
    let config_path = args.next().map(PathBuf::from);

    let config = CliConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.log_level)?;

    info!("=== IIDC Capture v{} ===", env!("CARGO_PKG_VERSION"));
    let engine = Arc::new(build_engine(&config)?);

    match command.as_str() {
        "list" => {
            let devices = engine.enumerate_devices()?;
            println!("{}", serde_json::to_string_pretty(&devices)?);
        }
        "info" => {
            let text = describe_device(&engine, config.capture.device)?;
            println!("{}", text);
        }
        "capture" => {
            let stop = Arc::new(AtomicBool::new(false));

            let interrupt = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, stopping capture");
                    interrupt.store(true, Ordering::Release);
                }
            });

            let capture = config.capture.clone();
            let worker = engine.clone();
            let summary =
                tokio::task::spawn_blocking(move || run_capture(&worker, &capture, &stop))
                    .await??;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        other => bail!("unknown command '{}', expected list, info or capture", other),
    }

    engine.close_all();
    Ok(())
}
