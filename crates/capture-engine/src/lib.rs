//! IIDC Capture Engine
//!
//! Opens FireWire cameras by index, negotiates a video mode for each
//! capture request and delivers converted frames:
//! - Handle-based device table with a configurable device limit
//! - Start/stop with bus broadcast, hardware trigger and soft sync groups
//! - Synchronous fetch or a background acquisition thread per device
//! - Frame dropping for lowest latency, or backlog reporting without it
//! - Named parameters for camera features, triggers and conversion
//! - Recording handoff to a movie writer

mod acquisition;
pub mod clock;
mod config;
mod device;
mod engine;
mod error;
mod frame;
mod handle;
mod params;
mod recording;
mod settings;
mod stats;
mod sync;

pub use config::EngineConfig;
pub use device::{CaptureDevice, DeviceStatus, SessionState, StartOutcome, StartRequest};
pub use engine::{CaptureEngine, DeviceInfo, DeviceSelector, OpenRequest, DEVICE_CLASS};
pub use error::{CaptureError, ErrorKind, SinkError};
pub use frame::{Fetch, FrameInfo, FrameRef, WaitPolicy};
pub use handle::CaptureHandle;
pub use params::{ParamReply, Parameter};
pub use recording::{
    CodecSpec, MovieSink, MovieWriter, RawFileWriter, RawMovieHeader, RawMovieSink,
    RecordingFlags, RecordingTarget, SinkFormat,
};
pub use settings::DeviceSettings;
pub use stats::CaptureStats;
pub use sync::SyncMode;

pub use mode_negotiator::{DataConversion, FrameRate, NegotiatedMode, Roi};
