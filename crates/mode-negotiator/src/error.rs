//! Negotiation error types

use iidc_bus::{BusError, VideoMode};
use thiserror::Error;

/// Errors raised while choosing a capture mode
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// No camera mode satisfies size, encoding and rate constraints
    #[error("No video mode matches the requested {0}")]
    NoMatchingMode(String),

    /// Layer count outside 0..=5
    #[error("Invalid number of layers {0} requested")]
    InvalidLayerCount(u32),

    /// Selected fixed mode reports no frame rates
    #[error("Camera reports no frame rates for {0:?}")]
    NoFramerate(VideoMode),

    /// Register access failed during the search
    #[error("Bus error during negotiation: {0}")]
    Bus(#[from] BusError),
}

impl NegotiationError {
    /// True when the request itself cannot be satisfied
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Bus(_))
    }
}
