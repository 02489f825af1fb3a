//! IIDC register values
//!
//! Value types for the camera registers the capture engine touches. Each
//! type carries the numeric code used by the bus library so the FFI layer
//! can convert without lookup tables elsewhere.

use serde::{Deserialize, Serialize};

/// Pixel encoding of a video mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorCoding {
    Mono8,
    Yuv411,
    Yuv422,
    Yuv444,
    Rgb8,
    Mono16,
    Rgb16,
    Mono16s,
    Rgb16s,
    Raw8,
    Raw16,
}

impl ColorCoding {
    const ALL: [ColorCoding; 11] = [
        Self::Mono8,
        Self::Yuv411,
        Self::Yuv422,
        Self::Yuv444,
        Self::Rgb8,
        Self::Mono16,
        Self::Rgb16,
        Self::Mono16s,
        Self::Rgb16s,
        Self::Raw8,
        Self::Raw16,
    ];

    /// Register code (352..=362)
    pub fn code(self) -> u32 {
        352 + self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        code.checked_sub(352)
            .and_then(|i| Self::ALL.get(i as usize).copied())
    }

    /// True for encodings that carry chroma (YUV and RGB)
    pub fn is_color(self) -> bool {
        matches!(
            self,
            Self::Yuv411 | Self::Yuv422 | Self::Yuv444 | Self::Rgb8 | Self::Rgb16 | Self::Rgb16s
        )
    }

    pub fn is_raw(self) -> bool {
        matches!(self, Self::Raw8 | Self::Raw16)
    }

    pub fn is_mono(self) -> bool {
        matches!(self, Self::Mono8 | Self::Mono16 | Self::Mono16s)
    }

    pub fn is_yuv(self) -> bool {
        matches!(self, Self::Yuv411 | Self::Yuv422 | Self::Yuv444)
    }

    /// Single-channel sensor data (mono or raw mosaic)
    pub fn is_single_channel(self) -> bool {
        matches!(self, Self::Mono8 | Self::Raw8 | Self::Mono16 | Self::Raw16)
    }

    /// Bits per channel of the container (8 or 16)
    pub fn data_depth(self) -> u32 {
        match self {
            Self::Mono8 | Self::Yuv411 | Self::Yuv422 | Self::Yuv444 | Self::Rgb8 | Self::Raw8 => 8,
            _ => 16,
        }
    }

    /// Average bits per pixel on the wire
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Mono8 | Self::Raw8 => 8,
            Self::Yuv411 => 12,
            Self::Yuv422 | Self::Mono16 | Self::Mono16s | Self::Raw16 => 16,
            Self::Yuv444 | Self::Rgb8 => 24,
            Self::Rgb16 | Self::Rgb16s => 48,
        }
    }

    /// Encoding with 8 or 16 bit channels for a requested bit depth
    pub fn raw_for_depth(bitdepth: u32) -> Self {
        if bitdepth <= 8 {
            Self::Raw8
        } else {
            Self::Raw16
        }
    }

    pub fn mono_for_depth(bitdepth: u32) -> Self {
        if bitdepth <= 8 {
            Self::Mono8
        } else {
            Self::Mono16
        }
    }
}

/// Bayer mosaic layout of a raw sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorFilter {
    Rggb,
    Gbrg,
    Grbg,
    Bggr,
}

impl ColorFilter {
    pub const ALL: [ColorFilter; 4] = [Self::Rggb, Self::Gbrg, Self::Grbg, Self::Bggr];

    /// Register code (512..=515)
    pub fn code(self) -> u32 {
        512 + self.index()
    }

    pub fn from_code(code: u32) -> Option<Self> {
        code.checked_sub(512).and_then(Self::from_index)
    }

    /// Zero-based position in the register range
    pub fn index(self) -> u32 {
        match self {
            Self::Rggb => 0,
            Self::Gbrg => 1,
            Self::Grbg => 2,
            Self::Bggr => 3,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// Fixed-table frame rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Framerate {
    F1_875,
    F3_75,
    F7_5,
    F15,
    F30,
    F60,
    F120,
    F240,
}

impl Framerate {
    pub const ALL: [Framerate; 8] = [
        Self::F1_875,
        Self::F3_75,
        Self::F7_5,
        Self::F15,
        Self::F30,
        Self::F60,
        Self::F120,
        Self::F240,
    ];

    /// Register code (32..=39)
    pub fn code(self) -> u32 {
        32 + self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        code.checked_sub(32)
            .and_then(|i| Self::ALL.get(i as usize).copied())
    }

    /// Frames per second
    pub fn as_f64(self) -> f64 {
        1.875 * f64::from(1u32 << (self as u32))
    }
}

/// Isochronous transfer speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IsoSpeed {
    S100,
    S200,
    S400,
    S800,
    S1600,
    S3200,
}

impl IsoSpeed {
    const ALL: [IsoSpeed; 6] = [
        Self::S100,
        Self::S200,
        Self::S400,
        Self::S800,
        Self::S1600,
        Self::S3200,
    ];

    /// Register code (0..=5)
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn megabits(self) -> u32 {
        100 << (self as u32)
    }

    /// Duration of one isochronous packet slot at this speed, in seconds
    pub fn bus_period_secs(self) -> f64 {
        0.0005 / f64::from(1u32 << (self as u32))
    }
}

/// IIDC video mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoMode {
    /// Fixed-geometry mode of formats 0-2, by register code (64..=86)
    Fixed(u32),
    /// Format 6 still image
    Exif,
    /// Scalable format 7 mode 0..=7
    Format7(u8),
}

/// (code, width, height, coding) of every fixed-geometry mode
const FIXED_MODES: [(u32, u32, u32, ColorCoding); 23] = [
    (64, 160, 120, ColorCoding::Yuv444),
    (65, 320, 240, ColorCoding::Yuv422),
    (66, 640, 480, ColorCoding::Yuv411),
    (67, 640, 480, ColorCoding::Yuv422),
    (68, 640, 480, ColorCoding::Rgb8),
    (69, 640, 480, ColorCoding::Mono8),
    (70, 640, 480, ColorCoding::Mono16),
    (71, 800, 600, ColorCoding::Yuv422),
    (72, 800, 600, ColorCoding::Rgb8),
    (73, 800, 600, ColorCoding::Mono8),
    (74, 1024, 768, ColorCoding::Yuv422),
    (75, 1024, 768, ColorCoding::Rgb8),
    (76, 1024, 768, ColorCoding::Mono8),
    (77, 800, 600, ColorCoding::Mono16),
    (78, 1024, 768, ColorCoding::Mono16),
    (79, 1280, 960, ColorCoding::Yuv422),
    (80, 1280, 960, ColorCoding::Rgb8),
    (81, 1280, 960, ColorCoding::Mono8),
    (82, 1600, 1200, ColorCoding::Yuv422),
    (83, 1600, 1200, ColorCoding::Rgb8),
    (84, 1600, 1200, ColorCoding::Mono8),
    (85, 1280, 960, ColorCoding::Mono16),
    (86, 1600, 1200, ColorCoding::Mono16),
];

impl VideoMode {
    const EXIF_CODE: u32 = 87;
    const FORMAT7_BASE: u32 = 88;

    /// Register code (64..=95)
    pub fn code(self) -> u32 {
        match self {
            Self::Fixed(code) => code,
            Self::Exif => Self::EXIF_CODE,
            Self::Format7(n) => Self::FORMAT7_BASE + u32::from(n),
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            64..=86 => Some(Self::Fixed(code)),
            Self::EXIF_CODE => Some(Self::Exif),
            88..=95 => Some(Self::Format7((code - Self::FORMAT7_BASE) as u8)),
            _ => None,
        }
    }

    /// Look up a fixed-geometry mode by size and encoding
    pub fn fixed(width: u32, height: u32, coding: ColorCoding) -> Option<Self> {
        FIXED_MODES
            .iter()
            .find(|&&(_, w, h, c)| w == width && h == height && c == coding)
            .map(|&(code, ..)| Self::Fixed(code))
    }

    pub fn is_format7(self) -> bool {
        matches!(self, Self::Format7(_))
    }

    /// Width, height and encoding of a fixed-geometry mode
    pub fn fixed_geometry(self) -> Option<(u32, u32, ColorCoding)> {
        match self {
            Self::Fixed(code) => FIXED_MODES
                .iter()
                .find(|&&(c, ..)| c == code)
                .map(|&(_, w, h, coding)| (w, h, coding)),
            _ => None,
        }
    }
}

/// Camera control features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Brightness,
    Exposure,
    Sharpness,
    WhiteBalance,
    Hue,
    Saturation,
    Gamma,
    Shutter,
    Gain,
    Iris,
    Focus,
    Temperature,
    Trigger,
    TriggerDelay,
}

impl Feature {
    /// Register code (416..=429)
    pub fn code(self) -> u32 {
        416 + self as u32
    }
}

/// Control mode of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureMode {
    Manual,
    Auto,
    OnePushAuto,
}

impl FeatureMode {
    /// Register code (736..=738)
    pub fn code(self) -> u32 {
        736 + self as u32
    }
}

/// External trigger modes, in register order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
    Mode4,
    Mode5,
    Mode14,
    Mode15,
}

impl TriggerMode {
    const ALL: [TriggerMode; 8] = [
        Self::Mode0,
        Self::Mode1,
        Self::Mode2,
        Self::Mode3,
        Self::Mode4,
        Self::Mode5,
        Self::Mode14,
        Self::Mode15,
    ];

    /// Zero-based position in the register range
    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Register code (384..=391)
    pub fn code(self) -> u32 {
        384 + self.index()
    }

    pub fn from_code(code: u32) -> Option<Self> {
        code.checked_sub(384)
            .and_then(|i| Self::from_index(i64::from(i)))
    }
}

/// External trigger inputs, in register order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerSource {
    Port0,
    Port1,
    Port2,
    Port3,
    Software,
}

impl TriggerSource {
    const ALL: [TriggerSource; 5] = [
        Self::Port0,
        Self::Port1,
        Self::Port2,
        Self::Port3,
        Self::Software,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Register code (576..=580)
    pub fn code(self) -> u32 {
        576 + self.index()
    }

    pub fn from_code(code: u32) -> Option<Self> {
        code.checked_sub(576)
            .and_then(|i| Self::from_index(i64::from(i)))
    }
}

/// Trigger edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerPolarity {
    ActiveLow,
    ActiveHigh,
}

impl TriggerPolarity {
    /// Register code (704, 705)
    pub fn code(self) -> u32 {
        match self {
            Self::ActiveLow => 704,
            Self::ActiveHigh => 705,
        }
    }
}

/// Whether a dequeue blocks for the next frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DequeuePolicy {
    Wait,
    Poll,
}

impl DequeuePolicy {
    /// Register code (672, 673)
    pub fn code(self) -> u32 {
        match self {
            Self::Wait => 672,
            Self::Poll => 673,
        }
    }
}

/// Bus-level camera address as returned by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraId {
    pub guid: u64,
    pub unit: u32,
}

/// Static information about an opened camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraIdentity {
    pub vendor: String,
    pub model: String,
    pub guid: u64,
    pub unit: u32,
    /// Bus node id
    pub node: u32,
    /// Bus reset generation the node id belongs to
    pub generation: u32,
    /// Host adapter port the camera is attached to
    pub port: u32,
}

impl CameraIdentity {
    pub fn id(&self) -> CameraId {
        CameraId {
            guid: self.guid,
            unit: self.unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_coding_codes() {
        assert_eq!(ColorCoding::Mono8.code(), 352);
        assert_eq!(ColorCoding::Raw16.code(), 362);
        assert_eq!(ColorCoding::from_code(356), Some(ColorCoding::Rgb8));
        assert_eq!(ColorCoding::from_code(363), None);
    }

    #[test]
    fn test_color_coding_properties() {
        assert!(ColorCoding::Yuv422.is_color());
        assert!(!ColorCoding::Raw8.is_color());
        assert_eq!(ColorCoding::Yuv411.bits_per_pixel(), 12);
        assert_eq!(ColorCoding::Rgb16.bits_per_pixel(), 48);
        assert_eq!(ColorCoding::Raw16.data_depth(), 16);
        assert_eq!(ColorCoding::Yuv444.data_depth(), 8);
    }

    #[test]
    fn test_framerate_values() {
        assert_eq!(Framerate::F1_875.as_f64(), 1.875);
        assert_eq!(Framerate::F30.as_f64(), 30.0);
        assert_eq!(Framerate::F240.as_f64(), 240.0);
        assert_eq!(Framerate::F15.code(), 35);
    }

    #[test]
    fn test_bus_periods() {
        assert_eq!(IsoSpeed::S100.bus_period_secs(), 0.0005);
        assert_eq!(IsoSpeed::S400.bus_period_secs(), 0.000125);
        assert_eq!(IsoSpeed::S3200.bus_period_secs(), 0.000015625);
        assert_eq!(IsoSpeed::S800.megabits(), 800);
    }

    #[test]
    fn test_video_mode_codes() {
        assert_eq!(VideoMode::from_code(64), Some(VideoMode::Fixed(64)));
        assert_eq!(VideoMode::from_code(87), Some(VideoMode::Exif));
        assert_eq!(VideoMode::from_code(95), Some(VideoMode::Format7(7)));
        assert_eq!(VideoMode::Format7(2).code(), 90);
        assert_eq!(VideoMode::from_code(96), None);
    }

    #[test]
    fn test_fixed_geometry_lookup() {
        let mode = VideoMode::fixed(1280, 960, ColorCoding::Mono8).unwrap();
        assert_eq!(mode.code(), 81);
        assert_eq!(
            mode.fixed_geometry(),
            Some((1280, 960, ColorCoding::Mono8))
        );
        assert_eq!(VideoMode::Format7(0).fixed_geometry(), None);
    }

    #[test]
    fn test_trigger_ranges() {
        assert_eq!(TriggerMode::from_index(7), Some(TriggerMode::Mode15));
        assert_eq!(TriggerMode::from_index(8), None);
        assert_eq!(TriggerMode::from_index(-1), None);
        assert_eq!(TriggerSource::Software.code(), 580);
        assert_eq!(TriggerSource::from_code(577), Some(TriggerSource::Port1));
    }
}
