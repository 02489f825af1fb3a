//! Delivered frames
//!
//! A fetched frame is either still lent by the transport, in which case the
//! [`FrameRef`] occupies a DMA slot and gives it back when it is released or
//! dropped, or a snapshot the acquisition thread copied out.

use frame_processor::{shift_to_msb, summed_intensity};
use iidc_bus::DmaFrame;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::warn;

use crate::device::{DeviceCore, LentFrame};
use crate::error::CaptureError;

/// How a fetch waits for the next frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitPolicy {
    /// Return immediately if nothing is ready
    Poll,
    /// Block until a frame arrives or the stream ends
    Block,
}

/// Geometry and timing of a delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    /// Channels per pixel in the delivered buffer
    pub layers: u32,
    /// Significant bits per sample (8, or 9..=16 in a 16-bit container)
    pub data_depth: u32,
    /// Presentation time on the process clock, in seconds
    pub pts: f64,
    /// Frames discarded before this one, or queued behind it when
    /// frames are not dropped
    pub dropped: u32,
}

impl FrameInfo {
    pub fn bytes_per_sample(&self) -> usize {
        if self.data_depth > 8 {
            2
        } else {
            1
        }
    }
}

/// Frame copied out by the acquisition thread
#[derive(Debug)]
pub(crate) struct Snapshot {
    pub data: Vec<u8>,
    pub info: FrameInfo,
}

/// Result of a fetch
pub enum Fetch<'a> {
    /// No new frame yet
    NotReady,
    /// The device is not streaming
    Stopped,
    Ready(FrameRef<'a>),
}

impl<'a> Fetch<'a> {
    pub fn into_frame(self) -> Option<FrameRef<'a>> {
        match self {
            Self::Ready(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Debug for Fetch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "NotReady"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Ready(frame) => f.debug_tuple("Ready").field(&frame.info).finish(),
        }
    }
}

enum Source<'a> {
    Lent {
        core: &'a Mutex<DeviceCore>,
        frame: Option<DmaFrame>,
        converted: Option<Vec<u8>>,
    },
    Snapshot(Vec<u8>),
}

/// A fetched frame. A frame still lent by the transport holds one DMA slot;
/// the device can't be stopped until it is released.
pub struct FrameRef<'a> {
    info: FrameInfo,
    source: Source<'a>,
}

impl<'a> FrameRef<'a> {
    pub(crate) fn lent(core: &'a Mutex<DeviceCore>, lent: LentFrame) -> Self {
        Self {
            info: lent.info,
            source: Source::Lent {
                core,
                frame: Some(lent.frame),
                converted: lent.converted,
            },
        }
    }

    pub(crate) fn snapshot(snapshot: Snapshot) -> Self {
        Self {
            info: snapshot.info,
            source: Source::Snapshot(snapshot.data),
        }
    }

    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn layers(&self) -> u32 {
        self.info.layers
    }

    pub fn pts(&self) -> f64 {
        self.info.pts
    }

    pub fn dropped(&self) -> u32 {
        self.info.dropped
    }

    /// True while the frame still occupies a transport buffer
    pub fn is_lent(&self) -> bool {
        matches!(self.source, Source::Lent { .. })
    }

    /// Delivered pixels, 16-bit samples unshifted and native-endian
    pub fn pixels(&self) -> &[u8] {
        match &self.source {
            Source::Lent {
                converted: Some(data),
                ..
            } => data,
            Source::Lent {
                frame: Some(frame), ..
            } => frame.image(),
            Source::Lent { .. } => &[],
            Source::Snapshot(data) => data,
        }
    }

    /// Mean sample value normalized to `0.0..=1.0`
    pub fn summed_intensity(&self) -> f64 {
        summed_intensity(
            self.pixels(),
            self.info.width,
            self.info.height,
            self.info.layers,
            self.info.data_depth,
        )
    }

    /// Copy the pixels with deep samples moved up to the top bits
    pub fn copy_raw_into(&self, out: &mut Vec<u8>) {
        shift_to_msb(self.pixels(), self.info.data_depth, out);
    }

    /// Give the transport buffer back
    pub fn release(mut self) -> Result<(), CaptureError> {
        self.give_back()
    }

    fn give_back(&mut self) -> Result<(), CaptureError> {
        if let Source::Lent {
            core,
            frame,
            converted,
        } = &mut self.source
        {
            if let Some(frame) = frame.take() {
                core.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .reclaim(frame, converted.take())?;
            }
        }
        Ok(())
    }
}

impl Drop for FrameRef<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.give_back() {
            warn!("Failed to return frame buffer to the transport: {}", err);
        }
    }
}
