//! Encoding compatibility rules
//!
//! Decides whether a camera encoding can serve a request's layer count,
//! bit depth and conversion policy. Rules are checked in priority order:
//! the conversion policy first, then the layer count, then depth.

use iidc_bus::ColorCoding;

use crate::request::{DataConversion, NegotiationRequest};

/// True if `coding` can deliver what `req` asks for
pub fn accepts(coding: ColorCoding, req: &NegotiationRequest) -> bool {
    let raw = ColorCoding::raw_for_depth(req.bitdepth);
    let mono = ColorCoding::mono_for_depth(req.bitdepth);
    let depth = if req.bitdepth <= 8 { 8 } else { 16 };

    if req.layers == 0 {
        return coding.data_depth() == depth;
    }

    if req.layers < 3 {
        let policy_ok = match req.conversion {
            DataConversion::RawPassthrough | DataConversion::RawForPostprocess => coding == raw,
            DataConversion::PrefilteredOnly | DataConversion::MonoAsRaw => coding == mono,
            DataConversion::Auto => true,
        };
        if !policy_ok || (coding != raw && coding != mono) {
            return false;
        }
    } else {
        let policy_ok = match req.conversion {
            DataConversion::RawForPostprocess => coding == raw,
            DataConversion::MonoAsRaw => coding == mono,
            _ => true,
        };
        if !policy_ok {
            return false;
        }
        let sensor_data_allowed = matches!(
            req.conversion,
            DataConversion::RawForPostprocess | DataConversion::MonoAsRaw
        );
        if !coding.is_color() && !sensor_data_allowed {
            return false;
        }
        if coding.data_depth() != depth {
            return false;
        }
    }

    if req.layers == 5 && !matches!(coding, ColorCoding::Yuv422 | ColorCoding::Yuv411) {
        return false;
    }
    true
}

/// Channels delivered for a negotiated encoding
pub fn native_layers(coding: ColorCoding, req: &NegotiationRequest) -> u32 {
    let sensor_to_color = req.layers >= 3
        && matches!(
            req.conversion,
            DataConversion::RawForPostprocess | DataConversion::MonoAsRaw
        );
    if coding.is_single_channel() && !sensor_to_color {
        1
    } else {
        3
    }
}
