//! Bus error types

use ring_buffer::RingError;
use thiserror::Error;

/// Error codes returned by the bus library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    Failure,
    NotACamera,
    FunctionNotSupported,
    CameraNotInitialized,
    MemoryAllocationFailure,
    NoIsoChannel,
    NoBandwidth,
    IoctlFailure,
    CaptureIsNotSet,
    CaptureIsRunning,
    InvalidArgumentValue,
    ValueOutsideRange,
    InvalidFeature,
    InvalidVideoMode,
    InvalidFramerate,
    InvalidTriggerMode,
    InvalidTriggerSource,
    InvalidIsoSpeed,
    InvalidColorCoding,
    InvalidColorFilter,
    InvalidBayerMethod,
    Other(i32),
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::Failure,
            -2 => Self::NotACamera,
            -3 => Self::FunctionNotSupported,
            -4 => Self::CameraNotInitialized,
            -5 => Self::MemoryAllocationFailure,
            -7 => Self::NoIsoChannel,
            -8 => Self::NoBandwidth,
            -9 => Self::IoctlFailure,
            -10 => Self::CaptureIsNotSet,
            -11 => Self::CaptureIsRunning,
            -15 => Self::InvalidArgumentValue,
            -16 => Self::ValueOutsideRange,
            -17 => Self::InvalidFeature,
            -19 => Self::InvalidVideoMode,
            -20 => Self::InvalidFramerate,
            -21 => Self::InvalidTriggerMode,
            -22 => Self::InvalidTriggerSource,
            -23 => Self::InvalidIsoSpeed,
            -25 => Self::InvalidColorCoding,
            -26 => Self::InvalidColorFilter,
            -29 => Self::InvalidBayerMethod,
            other => Self::Other(other),
        }
    }
}

/// Bus and camera errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Bus library could not be initialized
    #[error("Bus initialization failed: {0}")]
    Init(String),

    /// No camera with this address on the bus
    #[error("Camera {guid:016x} unit {unit} not found")]
    CameraNotFound { guid: u64, unit: u32 },

    /// Camera lacks the requested function
    #[error("Function not supported by camera")]
    NotSupported,

    #[error("Capture is not set up")]
    CaptureNotSet,

    #[error("Capture is already running")]
    CaptureRunning,

    /// Isochronous resources exhausted
    #[error("Insufficient bus resources: {0}")]
    Resources(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Requested value outside valid range")]
    OutOfRange,

    #[error("Invalid or unknown color filter")]
    InvalidColorFilter,

    /// Register access failed
    #[error("Camera I/O failed: {0}")]
    Io(String),

    /// Frame buffer returned to the wrong ring slot
    #[error("DMA ring error: {0}")]
    Ring(#[from] RingError),

    #[error("Unknown bus error code {0}")]
    Unknown(i32),
}

impl From<ErrorCode> for BusError {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Success => unreachable!("Success is not an error"),
            ErrorCode::Failure => Self::Io("generic failure".to_string()),
            ErrorCode::NotACamera | ErrorCode::CameraNotInitialized => {
                Self::Init("camera not initialized".to_string())
            }
            ErrorCode::FunctionNotSupported => Self::NotSupported,
            ErrorCode::MemoryAllocationFailure => {
                Self::Resources("memory allocation failed".to_string())
            }
            ErrorCode::NoIsoChannel => Self::Resources("no iso channel".to_string()),
            ErrorCode::NoBandwidth => Self::Resources("no bandwidth".to_string()),
            ErrorCode::IoctlFailure => Self::Io("ioctl failed".to_string()),
            ErrorCode::CaptureIsNotSet => Self::CaptureNotSet,
            ErrorCode::CaptureIsRunning => Self::CaptureRunning,
            ErrorCode::ValueOutsideRange => Self::OutOfRange,
            ErrorCode::InvalidColorFilter => Self::InvalidColorFilter,
            ErrorCode::InvalidArgumentValue
            | ErrorCode::InvalidFeature
            | ErrorCode::InvalidVideoMode
            | ErrorCode::InvalidFramerate
            | ErrorCode::InvalidTriggerMode
            | ErrorCode::InvalidTriggerSource
            | ErrorCode::InvalidIsoSpeed
            | ErrorCode::InvalidColorCoding
            | ErrorCode::InvalidBayerMethod => Self::InvalidArgument(format!("{:?}", code)),
            ErrorCode::Other(raw) => Self::Unknown(raw),
        }
    }
}

impl BusError {
    /// Convert a raw library return code into a `Result`
    pub fn check(code: i32) -> Result<(), BusError> {
        match ErrorCode::from(code) {
            ErrorCode::Success => Ok(()),
            err => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ErrorCode::from(0), ErrorCode::Success);
        assert_eq!(ErrorCode::from(-8), ErrorCode::NoBandwidth);
        assert_eq!(ErrorCode::from(-26), ErrorCode::InvalidColorFilter);
        assert_eq!(ErrorCode::from(-99), ErrorCode::Other(-99));
    }

    #[test]
    fn test_check_maps_codes() {
        assert!(BusError::check(0).is_ok());
        assert!(matches!(BusError::check(-3), Err(BusError::NotSupported)));
        assert!(matches!(BusError::check(-10), Err(BusError::CaptureNotSet)));
        assert!(matches!(BusError::check(-123), Err(BusError::Unknown(-123))));
    }
}
