//! IIDC Bus Layer
//!
//! Camera and bus handles used by the capture engine. The register value
//! types and error codes follow the bus library; two backends implement the
//! traits: libdc1394 through FFI (feature `ffi`) and an in-process simulated
//! bus that is always available.

mod camera;
mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod sim;
mod types;

pub use camera::{Bus, BusResult, Camera, DmaFrame, FrameFormat};
pub use error::{BusError, ErrorCode};
pub use types::*;
