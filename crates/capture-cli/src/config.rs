//! CLI configuration
//!
//! Defaults, overlaid by an optional TOML file, overlaid by `IIDC_`
//! environment variables (`IIDC_CAPTURE__FRAMES=100` sets `capture.frames`).

use capture_engine::{EngineConfig, OpenRequest, Roi, StartRequest};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where cameras come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process simulated bus
    Sim,
    /// libdc1394 (needs the `ffi` feature)
    Dc1394,
}

/// Top-level CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
    pub backend: Backend,
    /// Cameras attached to the simulated bus
    pub sim_cameras: u32,
    pub engine: EngineConfig,
    pub capture: CaptureConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            backend: Backend::Sim,
            sim_cameras: 2,
            engine: EngineConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

/// One capture run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Enumeration index of the camera
    pub device: usize,
    /// 0 lets the camera pick the largest image
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub bit_depth: u32,
    pub buffers: Option<u32>,
    /// Frames per second; unset runs as fast as the camera can
    pub rate: Option<f64>,
    pub drop_frames: bool,
    pub async_thread: bool,
    /// Stop after this many frames; 0 runs until interrupted
    pub frames: u64,
    /// Recording target, `file[:CodecType=..][:CodecSettings=..]`
    pub recording: Option<String>,
    /// Raw sync mask, 0 for free-running
    pub sync_mode: u32,
    /// Save the last frame as PNG
    pub snapshot: Option<PathBuf>,
    /// Named parameters applied before start, in order
    pub parameters: Vec<ParamSetting>,
}

/// A named parameter and the value to set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSetting {
    pub name: String,
    pub value: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: 0,
            width: 0,
            height: 0,
            layers: 0,
            bit_depth: 8,
            buffers: None,
            rate: Some(30.0),
            drop_frames: false,
            async_thread: false,
            frames: 100,
            recording: None,
            sync_mode: 0,
            snapshot: None,
            parameters: Vec::new(),
        }
    }
}

/// Asynchronous acquisition flag of the recording flags word
const ASYNC_THREAD: u32 = 16;

impl CaptureConfig {
    /// Lowest-latency viewing: newest frame only, background acquisition
    pub fn live_view() -> Self {
        Self {
            rate: None,
            drop_frames: true,
            async_thread: true,
            frames: 0,
            ..Default::default()
        }
    }

    pub fn open_request(&self) -> OpenRequest {
        let mut req = OpenRequest::index(self.device)
            .with_layers(self.layers)
            .with_bit_depth(self.bit_depth);
        if self.width > 0 && self.height > 0 {
            req = req.with_roi(Roi::sized(self.width, self.height));
        }
        if let Some(count) = self.buffers {
            req = req.with_buffers(count);
        }
        let flags = if self.async_thread { ASYNC_THREAD } else { 0 };
        match &self.recording {
            Some(target) => req.with_recording(target, flags),
            None => req.with_flags(flags),
        }
    }

    pub fn start_request(&self) -> StartRequest {
        let req = match self.rate {
            Some(hz) => StartRequest::at_rate(hz),
            None => StartRequest::fastest(),
        };
        if self.drop_frames {
            req.dropping_frames()
        } else {
            req
        }
    }
}

impl CliConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("IIDC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
