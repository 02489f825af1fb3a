//! Per-device capture settings

use frame_processor::BayerMethod;
use iidc_bus::ColorFilter;
use mode_negotiator::{DataConversion, FrameRate, NegotiationRequest, Roi};
use serde::{Deserialize, Serialize};

use crate::recording::{RecordingFlags, RecordingTarget};
use crate::sync::SyncMode;

/// Settings fixed at open or changed through parameters. They take effect
/// at the next start unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// `None` lets negotiation pick the largest image
    pub roi: Option<Roi>,
    pub layers: u32,
    /// Requested bits per channel, 8 or 16
    pub bitdepth: u32,
    pub buffer_count: u32,
    pub conversion: DataConversion,
    pub prefer_continuous: bool,
    pub sync: SyncMode,
    /// Applied to a running stream immediately
    pub debayer: BayerMethod,
    /// Mosaic layout for cameras that don't report one; applied immediately
    pub bayer_override: Option<ColorFilter>,
    pub recording: Option<RecordingTarget>,
    pub flags: RecordingFlags,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            roi: None,
            layers: 0,
            bitdepth: 8,
            buffer_count: 8,
            conversion: DataConversion::Auto,
            prefer_continuous: false,
            sync: SyncMode::free_running(),
            debayer: BayerMethod::default(),
            bayer_override: None,
            recording: None,
            flags: RecordingFlags::default(),
        }
    }
}

impl DeviceSettings {
    pub fn negotiation_request(&self, rate: FrameRate) -> NegotiationRequest {
        NegotiationRequest {
            roi: self.roi,
            layers: self.layers,
            bitdepth: self.bitdepth,
            conversion: self.conversion,
            rate,
            prefer_continuous: self.prefer_continuous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_request() {
        let settings = DeviceSettings {
            roi: Some(Roi::sized(800, 600)),
            layers: 3,
            prefer_continuous: true,
            ..Default::default()
        };
        let req = settings.negotiation_request(FrameRate::Fastest);
        assert_eq!(req.roi, Some(Roi::sized(800, 600)));
        assert_eq!(req.layers, 3);
        assert!(req.rate.is_fastest());
        assert!(req.prefer_continuous);
    }
}
