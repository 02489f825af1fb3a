//! Frame Post-Processing
//!
//! Converts camera payloads into the pixel layout the client asked for:
//! raw Bayer mosaics are demosaiced, YUV encodings become interleaved RGB8,
//! and high bit-depth samples can be realigned to the top of their 16-bit
//! container.

mod bayer;
mod convert;
mod error;
mod samples;
mod yuv;

pub use bayer::{debayer_u16, debayer_u8, BayerMethod};
pub use convert::{ConversionPlan, Converter};
pub use error::ProcessError;
pub use samples::{shift_to_msb, shift_to_msb_in_place, summed_intensity};
pub use yuv::{yuv_to_rgb, yuv_to_rgb8};
