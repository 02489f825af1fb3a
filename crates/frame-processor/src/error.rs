//! Processing error types

use iidc_bus::ColorCoding;
use thiserror::Error;

use crate::bayer::BayerMethod;

/// Errors raised while converting a frame
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    /// Mosaic layout unknown and no override configured
    #[error("Bayer pattern unknown; use a continuous mode or set OverrideBayerPattern")]
    MissingColorFilter,

    #[error("Debayer method {0:?} is not supported")]
    UnsupportedMethod(BayerMethod),

    #[error("Cannot convert {0:?} to RGB")]
    UnsupportedEncoding(ColorCoding),

    /// Payload shorter than its declared geometry
    #[error("Frame holds {actual} bytes, expected {expected}")]
    ShortBuffer { expected: usize, actual: usize },

    /// Demosaicing needs at least one full 2x2 cell
    #[error("Image {width}x{height} too small to demosaic")]
    TooSmall { width: u32, height: u32 },
}
