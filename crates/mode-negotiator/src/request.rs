//! Negotiation inputs and outputs

use iidc_bus::{ColorCoding, Framerate, IsoSpeed, VideoMode};
use serde::{Deserialize, Serialize};

/// Rectangle in sensor pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self { left, top, width, height }
    }

    /// Full-frame rectangle of the given size
    pub fn sized(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }

    pub fn at_origin(&self) -> bool {
        self.left == 0 && self.top == 0
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// How sensor data may be transported and converted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataConversion {
    /// Pick whatever encoding fits the layer count
    #[default]
    Auto,
    /// Deliver undecoded Bayer data as-is
    RawPassthrough,
    /// Transport raw Bayer data and debayer on the host
    RawForPostprocess,
    /// Only accept encodings the camera already filtered
    PrefilteredOnly,
    /// Treat a mono encoding as raw Bayer data (for cameras that mislabel it)
    MonoAsRaw,
}

impl DataConversion {
    const ALL: [DataConversion; 5] = [
        Self::Auto,
        Self::RawPassthrough,
        Self::RawForPostprocess,
        Self::PrefilteredOnly,
        Self::MonoAsRaw,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }
}

/// Target acquisition rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FrameRate {
    Hz(f64),
    /// As fast as the camera can deliver
    Fastest,
}

impl FrameRate {
    /// Numeric target; `Fastest` compares above every real rate
    pub fn target(self) -> f64 {
        match self {
            Self::Hz(hz) => hz,
            Self::Fastest => f64::MAX,
        }
    }

    pub fn is_fastest(self) -> bool {
        matches!(self, Self::Fastest)
    }
}

/// What the client asks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRequest {
    /// `None` lets the negotiator pick the largest image
    pub roi: Option<Roi>,
    /// 0 = native, 1..=4 channels, 5 = YUV passthrough
    pub layers: u32,
    /// Requested bits per channel (8, or up to 16)
    pub bitdepth: u32,
    pub conversion: DataConversion,
    pub rate: FrameRate,
    /// Try continuous modes first even for standard sizes and rates
    pub prefer_continuous: bool,
}

impl Default for NegotiationRequest {
    fn default() -> Self {
        Self {
            roi: None,
            layers: 0,
            bitdepth: 8,
            conversion: DataConversion::Auto,
            rate: FrameRate::Hz(30.0),
            prefer_continuous: false,
        }
    }
}

/// The operating mode chosen for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiatedMode {
    pub mode: VideoMode,
    pub color_coding: ColorCoding,
    /// Captured rectangle; its size is the delivered image size
    pub roi: Roi,
    /// Frame rate the camera will actually run at
    pub fps: f64,
    /// Discrete rate register value (fixed modes only)
    pub framerate: Option<Framerate>,
    /// Isochronous packet size in bytes (continuous modes only)
    pub packet_size: Option<u32>,
    /// Bus speed to program, after vendor overrides
    pub iso_speed: IsoSpeed,
    /// Channels the engine delivers per pixel
    pub actual_layers: u32,
    /// Channel count reported back to the client
    pub layers: u32,
    /// Achieved rate is within half a frame per second of the request
    pub rate_matched: bool,
}

impl NegotiatedMode {
    pub fn is_continuous(&self) -> bool {
        self.mode.is_format7()
    }

    /// Host-side conversion is needed to deliver `actual_layers` channels
    pub fn needs_conversion(&self) -> bool {
        self.actual_layers == 3
            && !matches!(self.color_coding, ColorCoding::Rgb8 | ColorCoding::Rgb16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_index_roundtrip() {
        for policy in DataConversion::ALL {
            assert_eq!(DataConversion::from_index(policy.index() as i64), Some(policy));
        }
        assert_eq!(DataConversion::from_index(5), None);
        assert_eq!(DataConversion::from_index(-1), None);
    }

    #[test]
    fn test_fastest_outranks_real_rates() {
        assert!(FrameRate::Fastest.target() > 240.0);
        assert_eq!(FrameRate::Hz(7.5).target(), 7.5);
    }

    #[test]
    fn test_roi_edges() {
        let roi = Roi::new(8, 16, 640, 480);
        assert_eq!(roi.right(), 648);
        assert_eq!(roi.bottom(), 496);
        assert!(!roi.at_origin());
        assert!(Roi::sized(2, 2).at_origin());
        assert_eq!(roi.area(), 307_200);
    }
}
