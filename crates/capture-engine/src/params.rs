//! Camera parameters
//!
//! Parameters are addressed by name. Setting a parameter returns its
//! previous value; passing no value only queries it. Parameters the camera
//! lacks reply [`ParamReply::Unsupported`] after a diagnostic instead of
//! failing the call.

use frame_processor::BayerMethod;
use iidc_bus::{ColorFilter, Feature, FeatureMode, TriggerMode, TriggerPolarity, TriggerSource};
use mode_negotiator::{DataConversion, Roi};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::DeviceCore;
use crate::error::CaptureError;
use crate::sync::SyncMode;

/// Isochronous allocation units of a whole bus
const BUS_ALLOCATION_UNITS: f64 = 4915.0;

const MOVIE_NAME_PREFIX: &str = "SetNewMoviename=";

/// Controls addressable by name, with `Auto<name>` switching to automatic mode
const FEATURES: [(&str, Feature); 7] = [
    ("Brightness", Feature::Brightness),
    ("Gain", Feature::Gain),
    ("Exposure", Feature::Exposure),
    ("Shutter", Feature::Shutter),
    ("Sharpness", Feature::Sharpness),
    ("Saturation", Feature::Saturation),
    ("Gamma", Feature::Gamma),
];

/// A named parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parameter {
    Feature(Feature),
    AutoFeature(Feature),
    TriggerMode,
    TriggerSource,
    TriggerPolarity,
    TriggerSources,
    SyncMode,
    DebayerMethod,
    OverrideBayerPattern,
    DataConversionMode,
    PreferFormat7Modes,
    Framerate,
    Roi,
    VendorName,
    ModelName,
    BandwidthUsage,
    PrintParameters,
    NewMovieName(String),
}

impl Parameter {
    /// Look up a parameter name. Names are case-sensitive.
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(movie) = name.strip_prefix(MOVIE_NAME_PREFIX) {
            return Some(Self::NewMovieName(movie.to_string()));
        }
        if let Some(feature) = feature_named(name) {
            return Some(Self::Feature(feature));
        }
        if let Some(feature) = name.strip_prefix("Auto").and_then(feature_named) {
            return Some(Self::AutoFeature(feature));
        }

        let param = match name {
            "TriggerMode" => Self::TriggerMode,
            "TriggerSource" => Self::TriggerSource,
            "TriggerPolarity" => Self::TriggerPolarity,
            "GetTriggerSources" => Self::TriggerSources,
            "SyncMode" => Self::SyncMode,
            "DebayerMethod" => Self::DebayerMethod,
            "OverrideBayerPattern" => Self::OverrideBayerPattern,
            "DataConversionMode" => Self::DataConversionMode,
            "PreferFormat7Modes" => Self::PreferFormat7Modes,
            "GetFramerate" => Self::Framerate,
            "GetROI" => Self::Roi,
            "GetVendorname" => Self::VendorName,
            "GetModelname" => Self::ModelName,
            "GetBandwidthUsage" => Self::BandwidthUsage,
            "PrintParameters" => Self::PrintParameters,
            _ => return None,
        };
        Some(param)
    }

    /// Parameters that ignore a supplied value
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::TriggerSources
                | Self::Framerate
                | Self::Roi
                | Self::VendorName
                | Self::ModelName
                | Self::BandwidthUsage
                | Self::PrintParameters
        )
    }
}

fn feature_named(name: &str) -> Option<Feature> {
    FEATURES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, feature)| *feature)
}

/// Reply to a parameter call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamReply {
    /// Previous (or current, for queries) value
    Value(f64),
    /// Unknown parameter or a control the camera lacks
    Unsupported,
    Text(String),
    Rect(Roi),
    List(Vec<f64>),
}

impl ParamReply {
    /// Value the legacy numeric interface returns for "unknown"
    pub const UNKNOWN: f64 = f64::MAX;

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }
}

/// Round to the nearest integer, halves up
fn round_value(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

fn bool_value(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

pub(crate) fn apply(
    core: &mut DeviceCore,
    param: Parameter,
    value: Option<f64>,
) -> Result<ParamReply, CaptureError> {
    if value.is_some() && param.is_read_only() {
        debug!("{:?} is read-only, value ignored", param);
    }

    match param {
        Parameter::Feature(feature) => Ok(feature_value(core, feature, false, value)),
        Parameter::AutoFeature(feature) => Ok(feature_value(core, feature, true, value)),
        Parameter::TriggerMode => trigger_mode(core, value),
        Parameter::TriggerSource => trigger_source(core, value),
        Parameter::TriggerPolarity => trigger_polarity(core, value),
        Parameter::TriggerSources => {
            if !has_trigger(core) {
                return Ok(ParamReply::Unsupported);
            }
            let sources = core.camera.supported_trigger_sources()?;
            Ok(ParamReply::List(
                sources.iter().map(|s| f64::from(s.index())).collect(),
            ))
        }
        Parameter::SyncMode => sync_mode(core, value),
        Parameter::DebayerMethod => {
            let old = f64::from(core.settings.debayer.index());
            if let Some(v) = value {
                let method = BayerMethod::from_index(round_value(v)).ok_or_else(|| {
                    CaptureError::InvalidParameter(format!("debayer method {} out of range", v))
                })?;
                if !method.is_supported() {
                    warn!("Debayer method {:?} is not implemented, frames will fail to convert", method);
                }
                core.settings.debayer = method;
            }
            Ok(ParamReply::Value(old))
        }
        Parameter::OverrideBayerPattern => {
            let old = core.settings.bayer_override;
            if let Some(v) = value {
                let filter = u32::try_from(round_value(v))
                    .ok()
                    .and_then(ColorFilter::from_index)
                    .ok_or_else(|| {
                        CaptureError::InvalidParameter(format!("bayer pattern {} out of range", v))
                    })?;
                core.settings.bayer_override = Some(filter);
            }
            Ok(old.map_or(ParamReply::Unsupported, |f| {
                ParamReply::Value(f64::from(f.index()))
            }))
        }
        Parameter::DataConversionMode => {
            let old = f64::from(core.settings.conversion.index());
            if let Some(v) = value {
                core.settings.conversion = DataConversion::from_index(round_value(v))
                    .ok_or_else(|| {
                        CaptureError::InvalidParameter(format!("data conversion mode {} out of range", v))
                    })?;
            }
            Ok(ParamReply::Value(old))
        }
        Parameter::PreferFormat7Modes => {
            let old = bool_value(core.settings.prefer_continuous);
            if let Some(v) = value {
                core.settings.prefer_continuous = round_value(v) > 0;
            }
            Ok(ParamReply::Value(old))
        }
        Parameter::Framerate => Ok(ParamReply::Value(
            core.negotiated.as_ref().map_or(0.0, |m| m.fps),
        )),
        Parameter::Roi => Ok(core
            .negotiated
            .as_ref()
            .map(|m| m.roi)
            .or(core.settings.roi)
            .map_or(ParamReply::Unsupported, ParamReply::Rect)),
        Parameter::VendorName => Ok(ParamReply::Text(core.camera.identity().vendor.clone())),
        Parameter::ModelName => Ok(ParamReply::Text(core.camera.identity().model.clone())),
        Parameter::BandwidthUsage => match core.camera.bandwidth_usage() {
            Ok(units) => Ok(ParamReply::Value(f64::from(units) / BUS_ALLOCATION_UNITS)),
            Err(err) => {
                warn!("Could not query bandwidth usage: {}", err);
                Ok(ParamReply::Unsupported)
            }
        },
        Parameter::PrintParameters => match core.camera.info() {
            Ok(text) => {
                info!("Camera parameters:\n{}", text);
                Ok(ParamReply::Text(text))
            }
            Err(err) => {
                warn!("Could not read camera parameters: {}", err);
                Ok(ParamReply::Unsupported)
            }
        },
        Parameter::NewMovieName(name) => match core.settings.recording.as_mut() {
            Some(target) => {
                target.retarget(&name);
                info!("Next recording goes to {}", target.path.display());
                Ok(ParamReply::Value(0.0))
            }
            None => {
                warn!("No recording configured on this device, new movie name ignored");
                Ok(ParamReply::Value(-2.0))
            }
        },
    }
}

/// Read a control and optionally set it. Problems only warn.
fn feature_value(
    core: &mut DeviceCore,
    feature: Feature,
    auto: bool,
    value: Option<f64>,
) -> ParamReply {
    match core.camera.feature_present(feature) {
        Ok(true) => {}
        Ok(false) => {
            warn!("Camera has no {:?} control, parameter ignored", feature);
            return ParamReply::Unsupported;
        }
        Err(err) => {
            warn!("Could not query {:?} control: {}", feature, err);
            return ParamReply::Unsupported;
        }
    }

    let old = match core.camera.feature_value(feature) {
        Ok(v) => f64::from(v),
        Err(err) => {
            warn!("Could not read {:?}: {}", feature, err);
            return ParamReply::Unsupported;
        }
    };

    if auto {
        if let Err(err) = core.camera.set_feature_mode(feature, FeatureMode::Auto) {
            warn!("Could not switch {:?} to automatic mode: {}", feature, err);
        }
        return ParamReply::Value(old);
    }

    if let Some(v) = value {
        let requested = round_value(v);
        match core.camera.feature_boundaries(feature) {
            Err(err) => warn!("Could not read {:?} range: {}", feature, err),
            Ok((min, max)) if requested < i64::from(min) || requested > i64::from(max) => {
                warn!(
                    "{:?} value {} outside valid range {}..={}, ignored",
                    feature, requested, min, max
                );
            }
            Ok(_) => {
                if let Err(err) = core.camera.set_feature_mode(feature, FeatureMode::Manual) {
                    warn!("Could not switch {:?} to manual mode: {}", feature, err);
                }
                if let Err(err) = core.camera.set_feature_value(feature, requested as u32) {
                    warn!("Could not set {:?} to {}: {}", feature, requested, err);
                }
            }
        }
    }
    ParamReply::Value(old)
}

fn has_trigger(core: &mut DeviceCore) -> bool {
    match core.camera.feature_present(Feature::Trigger) {
        Ok(true) => true,
        Ok(false) => {
            warn!("Camera has no external trigger support");
            false
        }
        Err(err) => {
            warn!("Could not query trigger support: {}", err);
            false
        }
    }
}

fn trigger_mode(core: &mut DeviceCore, value: Option<f64>) -> Result<ParamReply, CaptureError> {
    if !has_trigger(core) {
        return Ok(ParamReply::Unsupported);
    }
    let old = core.camera.trigger_mode()?;
    if let Some(v) = value {
        let mode = TriggerMode::from_index(round_value(v)).ok_or_else(|| {
            CaptureError::InvalidParameter(format!("trigger mode {} out of range", v))
        })?;
        core.camera.set_trigger_mode(mode)?;
        debug!("Trigger mode {:?} -> {:?}", old, mode);
    }
    Ok(ParamReply::Value(f64::from(old.index())))
}

fn trigger_source(core: &mut DeviceCore, value: Option<f64>) -> Result<ParamReply, CaptureError> {
    if !has_trigger(core) {
        return Ok(ParamReply::Unsupported);
    }
    let old = core.camera.trigger_source()?;
    if let Some(v) = value {
        let source = TriggerSource::from_index(round_value(v)).ok_or_else(|| {
            CaptureError::InvalidParameter(format!("trigger source {} out of range", v))
        })?;
        core.camera.set_trigger_source(source)?;
        debug!("Trigger source {:?} -> {:?}", old, source);
    }
    Ok(ParamReply::Value(f64::from(old.index())))
}

fn trigger_polarity(core: &mut DeviceCore, value: Option<f64>) -> Result<ParamReply, CaptureError> {
    if !has_trigger(core) {
        return Ok(ParamReply::Unsupported);
    }
    if !core.camera.trigger_has_polarity()? {
        warn!("Camera trigger polarity is not programmable");
        return Ok(ParamReply::Unsupported);
    }
    let old = core.camera.trigger_polarity()?;
    if let Some(v) = value {
        let polarity = if round_value(v) > 0 {
            TriggerPolarity::ActiveHigh
        } else {
            TriggerPolarity::ActiveLow
        };
        core.camera.set_trigger_polarity(polarity)?;
    }
    Ok(ParamReply::Value(bool_value(old == TriggerPolarity::ActiveHigh)))
}

fn sync_mode(core: &mut DeviceCore, value: Option<f64>) -> Result<ParamReply, CaptureError> {
    let old = f64::from(core.settings.sync.bits());
    let Some(v) = value else {
        return Ok(ParamReply::Value(old));
    };

    let bits = u32::try_from(round_value(v))
        .map_err(|_| CaptureError::InvalidSyncMode(format!("{} is not a sync mask", v)))?;
    let mode = SyncMode::from_bits(bits)?;
    if mode.is_slave() && mode.is_hw() {
        let capable = core.camera.feature_present(Feature::Trigger).unwrap_or(false);
        if !capable {
            info!("Camera has no external trigger input, hardware sync slave mode not enabled");
            return Ok(ParamReply::Value(old));
        }
    }
    core.settings.sync = mode;
    debug!("Sync mode set to {}", mode);
    Ok(ParamReply::Value(old))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!(Parameter::parse("Gain"), Some(Parameter::Feature(Feature::Gain)));
        assert_eq!(
            Parameter::parse("AutoShutter"),
            Some(Parameter::AutoFeature(Feature::Shutter))
        );
        assert_eq!(Parameter::parse("GetROI"), Some(Parameter::Roi));
        assert_eq!(
            Parameter::parse("SetNewMoviename=/tmp/next.raw"),
            Some(Parameter::NewMovieName("/tmp/next.raw".to_string()))
        );
        assert_eq!(Parameter::parse("gain"), None);
        assert_eq!(Parameter::parse("AutoTriggerMode"), None);
        assert_eq!(Parameter::parse("Zoom"), None);
    }

    #[test]
    fn test_read_only() {
        assert!(Parameter::Framerate.is_read_only());
        assert!(!Parameter::SyncMode.is_read_only());
    }

    #[test]
    fn test_round_value() {
        assert_eq!(round_value(2.5), 3);
        assert_eq!(round_value(2.49), 2);
        assert_eq!(round_value(-0.2), 0);
    }
}
