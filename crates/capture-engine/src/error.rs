//! Capture engine error types

use frame_processor::ProcessError;
use iidc_bus::BusError;
use mode_negotiator::NegotiationError;
use thiserror::Error;

use crate::handle::CaptureHandle;
use crate::recording::SinkFormat;

/// Broad classes of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; state is unchanged
    User,
    /// The camera lacks something the request needs
    Capability,
    /// Hardware or transport failure; the stream was torn down
    Transport,
}

/// Capture engine errors
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Handle was never issued or its device has been closed
    #[error("Invalid capture handle {0}")]
    InvalidHandle(CaptureHandle),

    #[error("Device table full ({0} devices)")]
    TooManyDevices(usize),

    #[error("No IIDC cameras found on the bus")]
    NoCameras,

    #[error("Device index {index} out of range, {count} cameras present")]
    DeviceIndexOutOfRange { index: usize, count: usize },

    #[error("Capture already started")]
    AlreadyStarted,

    #[error("Invalid frame rate {0}")]
    InvalidRate(f64),

    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    #[error("Invalid sync mode: {0}")]
    InvalidSyncMode(String),

    /// A soft-sync slave was not started before its master
    #[error("Soft-sync slave {0} is not armed")]
    UnarmedSlave(CaptureHandle),

    /// Frames from a synchronous fetch must be released before stopping
    #[error("{0} fetched frames are still held")]
    FrameHeld(usize),

    #[error("Invalid recording target: {0}")]
    Recording(String),

    #[error("Mode negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("Camera error: {0}")]
    Bus(#[from] BusError),

    #[error("Frame processing failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Movie sink error: {0}")]
    Sink(#[from] SinkError),

    /// Acquisition thread could not be launched
    #[error("Failed to spawn acquisition thread: {0}")]
    WorkerSpawn(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Negotiation(err) if err.is_user_error() => ErrorKind::User,
            Self::Negotiation(_) => ErrorKind::Transport,
            Self::Bus(BusError::NotSupported) => ErrorKind::Capability,
            Self::Bus(_) => ErrorKind::Transport,
            Self::Process(ProcessError::MissingColorFilter | ProcessError::UnsupportedMethod(_)) => {
                ErrorKind::User
            }
            Self::Process(_) | Self::Sink(_) | Self::WorkerSpawn(_) => ErrorKind::Transport,
            _ => ErrorKind::User,
        }
    }

    pub fn is_user_error(&self) -> bool {
        self.kind() == ErrorKind::User
    }
}

/// Movie sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sidecar encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame does not match the format the sink was opened with
    #[error("Frame format {actual:?} does not match movie format {expected:?}")]
    FormatMismatch {
        expected: SinkFormat,
        actual: SinkFormat,
    },

    #[error("Frame carries {actual} bytes, expected {expected}")]
    ShortFrame { expected: usize, actual: usize },

    #[error("Movie already finalized")]
    Finished,
}
