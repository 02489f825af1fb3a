//! Bus and camera handles

use crate::error::BusError;
use crate::types::*;

/// Result alias for register and transport calls
pub type BusResult<T> = Result<T, BusError>;

/// Layout of the pixels carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub color_coding: ColorCoding,
    /// Bayer layout if the camera reports one (scalable modes only)
    pub color_filter: Option<ColorFilter>,
    /// Significant bits per channel (8, or 9..=16 in a 16-bit container)
    pub data_depth: u32,
}

impl FrameFormat {
    /// Bytes of pixel data in one frame
    pub fn image_bytes(&self) -> usize {
        (self.width as usize * self.height as usize * self.color_coding.bits_per_pixel() as usize)
            .div_ceil(8)
    }
}

pub(crate) enum FrameMemory {
    Owned(Vec<u8>),
    #[cfg(feature = "ffi")]
    Dma(std::ptr::NonNull<crate::ffi::dc1394video_frame_t>),
}

/// A frame lent by the transport. Must go back through
/// [`Camera::enqueue`] before its slot can be reused.
pub struct DmaFrame {
    pub(crate) slot: usize,
    pub(crate) memory: FrameMemory,
    pub format: FrameFormat,
    /// Capture time in microseconds of wall-clock time
    pub timestamp_us: u64,
    /// Completed frames still queued behind this one
    pub frames_behind: u32,
}

// SAFETY: a DMA frame is exclusively owned until it is enqueued again; the
// bus library does not touch the buffer while software holds it.
#[cfg(feature = "ffi")]
unsafe impl Send for DmaFrame {}

impl DmaFrame {
    /// Wrap an owned buffer taken from ring slot `slot`
    pub fn from_vec(
        slot: usize,
        format: FrameFormat,
        data: Vec<u8>,
        timestamp_us: u64,
        frames_behind: u32,
    ) -> Self {
        Self {
            slot,
            memory: FrameMemory::Owned(data),
            format,
            timestamp_us,
            frames_behind,
        }
    }

    /// Ring slot this frame occupies
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Raw pixel bytes as delivered by the camera
    pub fn image(&self) -> &[u8] {
        match &self.memory {
            FrameMemory::Owned(data) => data,
            #[cfg(feature = "ffi")]
            FrameMemory::Dma(raw) => {
                // SAFETY: the frame descriptor and its image buffer stay valid
                // until the frame is enqueued, which consumes `self`.
                unsafe {
                    let frame = raw.as_ref();
                    if frame.image.is_null() {
                        &[]
                    } else {
                        std::slice::from_raw_parts(frame.image, frame.image_bytes as usize)
                    }
                }
            }
        }
    }

    /// Give back the owned buffer of a simulated or user-built frame
    pub fn into_vec(self) -> Option<(usize, Vec<u8>)> {
        match self.memory {
            FrameMemory::Owned(data) => Some((self.slot, data)),
            #[cfg(feature = "ffi")]
            FrameMemory::Dma(_) => None,
        }
    }
}

impl std::fmt::Debug for DmaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaFrame")
            .field("slot", &self.slot)
            .field("format", &self.format)
            .field("timestamp_us", &self.timestamp_us)
            .field("frames_behind", &self.frames_behind)
            .finish()
    }
}

/// One IIDC camera. Every method maps to a single register or transport
/// operation; callers serialize access.
pub trait Camera: Send {
    fn identity(&self) -> &CameraIdentity;
    fn set_power(&mut self, on: bool) -> BusResult<()>;
    fn reset(&mut self) -> BusResult<()>;
    /// Human-readable dump of the camera's registers and feature set
    fn info(&mut self) -> BusResult<String>;

    fn supported_modes(&mut self) -> BusResult<Vec<VideoMode>>;
    /// Encoding of any mode (scalable modes report their current setting)
    fn mode_color_coding(&mut self, mode: VideoMode) -> BusResult<ColorCoding>;
    /// Size of any mode (scalable modes report their current setting)
    fn mode_image_size(&mut self, mode: VideoMode) -> BusResult<(u32, u32)>;
    /// Rates of a fixed mode, ascending
    fn supported_framerates(&mut self, mode: VideoMode) -> BusResult<Vec<Framerate>>;

    fn format7_max_image_size(&mut self, mode: VideoMode) -> BusResult<(u32, u32)>;
    fn format7_set_image_position(&mut self, mode: VideoMode, left: u32, top: u32) -> BusResult<()>;
    fn format7_set_image_size(&mut self, mode: VideoMode, width: u32, height: u32) -> BusResult<()>;
    /// (packet granularity, maximum packet) in bytes
    fn format7_packet_parameters(&mut self, mode: VideoMode) -> BusResult<(u32, u32)>;
    /// Bits per pixel on the wire
    fn format7_data_depth(&mut self, mode: VideoMode) -> BusResult<u32>;
    fn format7_color_coding(&mut self, mode: VideoMode) -> BusResult<ColorCoding>;
    #[allow(clippy::too_many_arguments)]
    fn format7_set_roi(
        &mut self,
        mode: VideoMode,
        coding: ColorCoding,
        packet_size: u32,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    ) -> BusResult<()>;

    fn iso_speed(&mut self) -> BusResult<IsoSpeed>;
    fn set_iso_speed(&mut self, speed: IsoSpeed) -> BusResult<()>;
    fn set_video_mode(&mut self, mode: VideoMode) -> BusResult<()>;
    fn set_framerate(&mut self, rate: Framerate) -> BusResult<()>;
    /// Significant bits per channel of the current mode
    fn video_data_depth(&mut self) -> BusResult<u32>;
    /// Isochronous allocation units in use (4915 = whole bus)
    fn bandwidth_usage(&mut self) -> BusResult<u32>;

    /// Allocate `buffers` DMA slots and isochronous resources
    fn capture_setup(&mut self, buffers: u32) -> BusResult<()>;
    fn capture_stop(&mut self) -> BusResult<()>;
    fn set_transmission(&mut self, on: bool) -> BusResult<()>;
    /// While enabled, commands written by this camera reach every camera on the bus
    fn set_broadcast(&mut self, on: bool) -> BusResult<()>;
    /// Take the oldest completed frame; `Ok(None)` only under [`DequeuePolicy::Poll`]
    fn dequeue(&mut self, policy: DequeuePolicy) -> BusResult<Option<DmaFrame>>;
    fn enqueue(&mut self, frame: DmaFrame) -> BusResult<()>;

    fn feature_present(&mut self, feature: Feature) -> BusResult<bool>;
    fn feature_value(&mut self, feature: Feature) -> BusResult<u32>;
    fn set_feature_value(&mut self, feature: Feature, value: u32) -> BusResult<()>;
    fn feature_boundaries(&mut self, feature: Feature) -> BusResult<(u32, u32)>;
    fn set_feature_mode(&mut self, feature: Feature, mode: FeatureMode) -> BusResult<()>;

    /// Enable or disable reception of external trigger signals
    fn set_trigger_power(&mut self, on: bool) -> BusResult<()>;
    fn trigger_mode(&mut self) -> BusResult<TriggerMode>;
    fn set_trigger_mode(&mut self, mode: TriggerMode) -> BusResult<()>;
    fn trigger_source(&mut self) -> BusResult<TriggerSource>;
    fn set_trigger_source(&mut self, source: TriggerSource) -> BusResult<()>;
    fn supported_trigger_sources(&mut self) -> BusResult<Vec<TriggerSource>>;
    fn trigger_has_polarity(&mut self) -> BusResult<bool>;
    fn trigger_polarity(&mut self) -> BusResult<TriggerPolarity>;
    fn set_trigger_polarity(&mut self, polarity: TriggerPolarity) -> BusResult<()>;
}

/// An IEEE-1394 bus with IIDC cameras attached
pub trait Bus: Send + Sync {
    fn enumerate(&self) -> BusResult<Vec<CameraId>>;
    fn open(&self, id: &CameraId) -> BusResult<Box<dyn Camera>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_bytes() {
        let format = FrameFormat {
            width: 640,
            height: 480,
            color_coding: ColorCoding::Yuv411,
            color_filter: None,
            data_depth: 8,
        };
        assert_eq!(format.image_bytes(), 640 * 480 * 3 / 2);
    }

    #[test]
    fn test_owned_frame_roundtrip() {
        let format = FrameFormat {
            width: 2,
            height: 2,
            color_coding: ColorCoding::Mono8,
            color_filter: None,
            data_depth: 8,
        };
        let frame = DmaFrame::from_vec(3, format, vec![1, 2, 3, 4], 10, 0);
        assert_eq!(frame.image(), &[1, 2, 3, 4]);
        let (slot, data) = frame.into_vec().unwrap();
        assert_eq!(slot, 3);
        assert_eq!(data.len(), 4);
    }
}
