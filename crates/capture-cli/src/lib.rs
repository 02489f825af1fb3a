//! IIDC Capture CLI
//!
//! Lists the cameras on the bus and runs a single-camera capture with the
//! settings from [`CliConfig`], optionally recording and saving the last
//! frame as PNG.

pub mod config;
pub mod snapshot;

pub use config::{Backend, CaptureConfig, CliConfig, ParamSetting};
pub use snapshot::Snapshot;

use anyhow::{anyhow, bail, Result};
use capture_engine::{CaptureEngine, CaptureHandle, Fetch, ParamReply, WaitPolicy};
use iidc_bus::sim::{SimBus, SimCameraSpec};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the global `tracing` subscriber
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("failed to set tracing subscriber: {}", e))
}

/// Simulated bus with `count` free-running cameras, alternating fixed-mode
/// color and scalable raw models
pub fn simulated_bus(count: u32) -> SimBus {
    let bus = SimBus::new();
    for i in 0..count {
        let guid = 0x0814_3600_0000_0000 | u64::from(i + 1);
        let spec = if i % 2 == 0 {
            SimCameraSpec::fixed_color(guid)
        } else {
            SimCameraSpec::scalable_raw(guid)
        };
        bus.attach(spec.free_running());
    }
    bus
}

/// Engine on the configured backend
pub fn build_engine(config: &CliConfig) -> Result<CaptureEngine> {
    match config.backend {
        Backend::Sim => {
            info!("Using simulated bus with {} cameras", config.sim_cameras);
            Ok(CaptureEngine::new(
                simulated_bus(config.sim_cameras),
                config.engine.clone(),
            ))
        }
        #[cfg(feature = "ffi")]
        Backend::Dc1394 => Ok(CaptureEngine::new(
            iidc_bus::ffi::Dc1394Bus::new()?,
            config.engine.clone(),
        )),
        #[cfg(not(feature = "ffi"))]
        Backend::Dc1394 => bail!("built without libdc1394 support, enable the `ffi` feature"),
    }
}

/// Result of a capture run
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub device: String,
    pub fps: u32,
    pub frames: u64,
    pub dropped: u64,
    pub seconds: f64,
    /// Mean of the per-frame summed intensities
    pub mean_intensity: f64,
}

/// Print the camera's own parameter dump
pub fn describe_device(engine: &CaptureEngine, index: usize) -> Result<String> {
    let handle = engine.open(capture_engine::OpenRequest::index(index))?;
    let reply = engine.set_parameter(handle, "PrintParameters", None);
    engine.close(handle)?;
    match reply? {
        ParamReply::Text(text) => Ok(text),
        _ => bail!("camera {} did not report its parameters", index),
    }
}

fn apply_parameters(
    engine: &CaptureEngine,
    handle: CaptureHandle,
    capture: &CaptureConfig,
) -> Result<()> {
    if capture.sync_mode != 0 {
        engine.set_parameter(handle, "SyncMode", Some(f64::from(capture.sync_mode)))?;
    }
    for param in &capture.parameters {
        let previous = engine.set_parameter(handle, &param.name, Some(param.value))?;
        if previous.is_unsupported() {
            warn!("Parameter {} not applied", param.name);
        } else {
            debug!("{} = {} (was {:?})", param.name, param.value, previous);
        }
    }
    Ok(())
}

/// Open, start and drain one camera until `stop` is set or the frame
/// budget is spent. Blocks the calling thread.
pub fn run_capture(
    engine: &CaptureEngine,
    capture: &CaptureConfig,
    stop: &AtomicBool,
) -> Result<CaptureSummary> {
    let handle = engine.open(capture.open_request())?;
    let result = drain(engine, handle, capture, stop);
    if let Err(err) = engine.close(handle) {
        warn!("Closing device {} failed: {}", handle, err);
    }
    result
}

fn drain(
    engine: &CaptureEngine,
    handle: CaptureHandle,
    capture: &CaptureConfig,
    stop: &AtomicBool,
) -> Result<CaptureSummary> {
    apply_parameters(engine, handle, capture)?;
    let outcome = engine.start(handle, capture.start_request())?;
    let device = engine.device(handle)?;
    info!(
        "Capturing from {} {} at {} fps",
        device.identity().vendor,
        device.identity().model,
        outcome.fps_rounded
    );

    let idle = Duration::from_millis(engine.config().idle_ms.max(1));
    let began = Instant::now();
    let mut frames = 0u64;
    let mut intensity = 0.0;
    let mut last = Snapshot::default();

    while !stop.load(Ordering::Acquire) && (capture.frames == 0 || frames < capture.frames) {
        match device.fetch(WaitPolicy::Poll)? {
            Fetch::Ready(frame) => {
                frames += 1;
                intensity += frame.summed_intensity();
                if capture.snapshot.is_some() {
                    frame.copy_raw_into(&mut last.pixels);
                    last.info = Some(*frame.info());
                }
                if frame.dropped() > 0 {
                    debug!("Frame {} at {:.6}: {} dropped or queued", frames, frame.pts(), frame.dropped());
                }
                frame.release()?;
            }
            Fetch::NotReady => std::thread::sleep(idle),
            Fetch::Stopped => {
                warn!("Stream ended before the capture finished");
                break;
            }
        }
    }

    let seconds = began.elapsed().as_secs_f64();
    let status = device.status();
    if let Some(err) = &status.last_error {
        warn!("Acquisition stopped with an error: {}", err);
    }
    let dropped = engine.stop(handle)?;

    if let Some(path) = &capture.snapshot {
        last.save_png(path)?;
    }

    Ok(CaptureSummary {
        device: format!("{} {}", device.identity().vendor, device.identity().model),
        fps: outcome.fps_rounded,
        frames,
        dropped,
        seconds,
        mean_intensity: if frames > 0 { intensity / frames as f64 } else { 0.0 },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_bus_models() {
        let config = CliConfig {
            sim_cameras: 3,
            ..Default::default()
        };
        let engine = build_engine(&config).unwrap();
        let devices = engine.enumerate_devices().unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].model, "Flea");
        assert_eq!(devices[1].model, "A602f");
        assert!(describe_device(&engine, 1).unwrap().contains("A602f"));
    }

    #[test]
    fn test_run_capture_frame_budget() {
        let engine = build_engine(&CliConfig::default()).unwrap();
        let capture = CaptureConfig {
            width: 320,
            height: 240,
            layers: 3,
            rate: Some(60.0),
            frames: 5,
            ..Default::default()
        };
        let stop = AtomicBool::new(false);
        let summary = run_capture(&engine, &capture, &stop).unwrap();
        assert_eq!(summary.frames, 5);
        assert_eq!(summary.fps, 60);
        assert!(engine.open_devices().is_empty());
    }

    #[test]
    fn test_run_capture_stops_on_flag() {
        let engine = build_engine(&CliConfig::default()).unwrap();
        let capture = CaptureConfig {
            frames: 0,
            ..CaptureConfig::live_view()
        };
        let stop = AtomicBool::new(true);
        let summary = run_capture(&engine, &capture, &stop).unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.mean_intensity, 0.0);
    }
}
