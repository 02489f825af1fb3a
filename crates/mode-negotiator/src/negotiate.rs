//! Search ordering and post-selection fixups

use iidc_bus::{Camera, CameraIdentity, ColorCoding, IsoSpeed};
use tracing::{debug, info, warn};

use crate::compat::native_layers;
use crate::continuous::find_continuous;
use crate::discrete::find_discrete;
use crate::error::NegotiationError;
use crate::request::{FrameRate, NegotiatedMode, NegotiationRequest};

/// Image sizes every fixed-mode camera is likely to offer
const STANDARD_SIZES: [(u32, u32); 7] = [
    (160, 120),
    (320, 240),
    (640, 480),
    (800, 600),
    (1024, 768),
    (1280, 960),
    (1600, 1200),
];

const STANDARD_RATES: [f64; 8] = [1.875, 3.75, 7.5, 15.0, 30.0, 60.0, 120.0, 240.0];

/// True if the fixed mode table alone can serve `req`; otherwise continuous
/// modes are tried first with the fixed table as fallback.
pub fn discrete_only(req: &NegotiationRequest) -> bool {
    if req.prefer_continuous {
        return false;
    }
    let size_ok = match req.roi {
        None => true,
        Some(roi) => roi.at_origin() && STANDARD_SIZES.contains(&(roi.width, roi.height)),
    };
    let rate_ok = match req.rate {
        FrameRate::Hz(hz) => STANDARD_RATES.contains(&hz),
        FrameRate::Fastest => false,
    };
    size_ok && rate_ok
}

/// Bus speed to program. The Unibrain Fire-i reports 100 Mbit after a cold
/// start but runs at 400.
pub fn effective_iso_speed(identity: &CameraIdentity, reported: IsoSpeed) -> IsoSpeed {
    if identity.vendor.contains("Unibrain") && identity.model.contains("Fire-i") {
        debug!("Unibrain Fire-i detected, overriding bus speed to 400 Mbit");
        IsoSpeed::S400
    } else {
        reported
    }
}

/// Reconcile the requested layer count with what the mode delivers
pub fn reconcile_layers(requested: u32, actual: u32) -> Result<u32, NegotiationError> {
    match requested {
        0 => Ok(actual),
        1..=4 => {
            if requested != actual {
                warn!(
                    "Wanted {} layers, but mode delivers {} layers, using {}",
                    requested, actual, actual
                );
            }
            Ok(actual)
        }
        5 => Ok(3),
        other => Err(NegotiationError::InvalidLayerCount(other)),
    }
}

/// Choose a mode for `req` on `camera`. Continuous modes are left
/// programmed with the chosen geometry; nothing else is written.
pub fn negotiate(
    camera: &mut dyn Camera,
    req: &NegotiationRequest,
) -> Result<NegotiatedMode, NegotiationError> {
    if req.layers > 5 {
        return Err(NegotiationError::InvalidLayerCount(req.layers));
    }

    let reported = camera.iso_speed()?;
    let iso_speed = effective_iso_speed(camera.identity(), reported);
    let bus_period = iso_speed.bus_period_secs();

    let continuous = if discrete_only(req) {
        None
    } else {
        find_continuous(camera, req, bus_period)?
    };

    let mut mode = match continuous {
        Some(choice) => NegotiatedMode {
            mode: choice.mode,
            color_coding: choice.color_coding,
            roi: choice.roi,
            fps: choice.plan.fps,
            framerate: None,
            packet_size: Some(choice.plan.packet_size),
            iso_speed,
            actual_layers: 0,
            layers: 0,
            rate_matched: choice.rate_matched,
        },
        None => {
            let choice = find_discrete(camera, req)?;
            NegotiatedMode {
                mode: choice.mode,
                color_coding: choice.color_coding,
                roi: choice.roi,
                fps: choice.fps,
                framerate: Some(choice.framerate),
                packet_size: None,
                iso_speed,
                actual_layers: 0,
                layers: 0,
                rate_matched: choice.rate_matched,
            }
        }
    };

    mode.actual_layers = native_layers(mode.color_coding, req);
    mode.layers = reconcile_layers(req.layers, mode.actual_layers)?;

    if req.layers > 1 && !matches!(mode.color_coding, ColorCoding::Rgb8 | ColorCoding::Rgb16) {
        let source = if mode.color_coding.is_yuv() { "YUV" } else { "RAW" };
        info!(
            "Using {} encoding {:?}, host-side conversion will cost CPU time",
            source, mode.color_coding
        );
    }

    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::accepts;
    use crate::request::{DataConversion, Roi};
    use proptest::prelude::*;
    use iidc_bus::sim::{SimBus, SimCameraSpec, SimController};
    use iidc_bus::{Bus, ColorCoding, Framerate, VideoMode};

    fn open(spec: SimCameraSpec) -> (SimController, Box<dyn Camera>) {
        let bus = SimBus::new();
        let ctl = bus.attach(spec);
        let camera = bus.open(&ctl.id()).unwrap();
        (ctl, camera)
    }

    #[test]
    fn test_discrete_only_whitelist() {
        let mut req = NegotiationRequest::default();
        assert!(discrete_only(&req));

        req.roi = Some(Roi::sized(640, 480));
        assert!(discrete_only(&req));

        req.roi = Some(Roi::sized(800, 601));
        assert!(!discrete_only(&req));

        req.roi = Some(Roi::new(8, 0, 640, 480));
        assert!(!discrete_only(&req));

        req.roi = None;
        req.rate = FrameRate::Hz(25.0);
        assert!(!discrete_only(&req));

        req.rate = FrameRate::Fastest;
        assert!(!discrete_only(&req));

        req.rate = FrameRate::Hz(15.0);
        req.prefer_continuous = true;
        assert!(!discrete_only(&req));
    }

    #[test]
    fn test_reconcile_layers() {
        assert_eq!(reconcile_layers(0, 3).unwrap(), 3);
        assert_eq!(reconcile_layers(4, 3).unwrap(), 3);
        assert_eq!(reconcile_layers(1, 1).unwrap(), 1);
        assert_eq!(reconcile_layers(5, 3).unwrap(), 3);
        assert!(matches!(
            reconcile_layers(6, 3),
            Err(NegotiationError::InvalidLayerCount(6))
        ));
    }

    #[test]
    fn test_unibrain_speed_override() {
        let fire_i = SimCameraSpec::unibrain_fire_i(1).identity;
        assert_eq!(effective_iso_speed(&fire_i, IsoSpeed::S100), IsoSpeed::S400);
        let flea = SimCameraSpec::fixed_color(2).identity;
        assert_eq!(effective_iso_speed(&flea, IsoSpeed::S100), IsoSpeed::S100);
    }

    #[test]
    fn test_fixed_camera_negotiation() {
        let (_ctl, mut camera) = open(SimCameraSpec::fixed_color(3));
        let req = NegotiationRequest {
            roi: Some(Roi::sized(640, 480)),
            layers: 3,
            rate: FrameRate::Hz(15.0),
            ..Default::default()
        };
        let mode = negotiate(camera.as_mut(), &req).unwrap();
        assert_eq!(mode.color_coding, ColorCoding::Rgb8);
        assert_eq!(mode.framerate, Some(Framerate::F15));
        assert_eq!(mode.packet_size, None);
        assert_eq!(mode.layers, 3);
        assert!(!mode.needs_conversion());
    }

    #[test]
    fn test_non_standard_roi_falls_back_to_discrete() {
        let (_ctl, mut camera) = open(SimCameraSpec::fixed_color(4));
        let req = NegotiationRequest {
            rate: FrameRate::Hz(25.0),
            ..Default::default()
        };
        let mode = negotiate(camera.as_mut(), &req).unwrap();
        assert!(!mode.is_continuous());
        assert_eq!(mode.roi, Roi::sized(1280, 960));
    }

    #[test]
    fn test_continuous_raw_for_color() {
        let (_ctl, mut camera) = open(SimCameraSpec::scalable_raw(5));
        let req = NegotiationRequest {
            roi: Some(Roi::sized(800, 600)),
            layers: 3,
            conversion: DataConversion::RawForPostprocess,
            rate: FrameRate::Hz(30.0),
            ..Default::default()
        };
        let mode = negotiate(camera.as_mut(), &req).unwrap();
        assert_eq!(mode.mode, VideoMode::Format7(0));
        assert_eq!(mode.color_coding, ColorCoding::Raw8);
        assert_eq!(mode.actual_layers, 3);
        assert!(mode.needs_conversion());
        assert!(mode.packet_size.is_some());
        assert!(mode.rate_matched);
    }

    #[test]
    fn test_sixteen_bit_luminance() {
        let (_ctl, mut camera) = open(SimCameraSpec::scalable_raw(6));
        let req = NegotiationRequest {
            layers: 1,
            bitdepth: 12,
            rate: FrameRate::Fastest,
            ..Default::default()
        };
        let mode = negotiate(camera.as_mut(), &req).unwrap();
        assert_eq!(mode.color_coding, ColorCoding::Mono16);
        assert_eq!(mode.actual_layers, 1);
    }

    #[test]
    fn test_nothing_matches() {
        let (_ctl, mut camera) = open(SimCameraSpec::fixed_color(7));
        let req = NegotiationRequest {
            layers: 3,
            conversion: DataConversion::RawForPostprocess,
            ..Default::default()
        };
        let err = negotiate(camera.as_mut(), &req).unwrap_err();
        assert!(err.is_user_error());
    }

    #[test]
    fn test_invalid_layer_count() {
        let (_ctl, mut camera) = open(SimCameraSpec::fixed_color(8));
        let req = NegotiationRequest {
            layers: 9,
            ..Default::default()
        };
        assert!(matches!(
            negotiate(camera.as_mut(), &req),
            Err(NegotiationError::InvalidLayerCount(9))
        ));
    }

    #[test]
    fn test_fire_i_negotiates_at_400() {
        let (_ctl, mut camera) = open(SimCameraSpec::unibrain_fire_i(9));
        let mode = negotiate(camera.as_mut(), &NegotiationRequest::default()).unwrap();
        assert_eq!(mode.iso_speed, IsoSpeed::S400);
    }

    fn any_roi() -> impl Strategy<Value = Option<Roi>> {
        prop_oneof![
            Just(None),
            prop::sample::select(STANDARD_SIZES.to_vec()).prop_map(|(w, h)| Some(Roi::sized(w, h))),
            (0u32..64, 0u32..64, 1u32..1700, 1u32..1300)
                .prop_map(|(left, top, width, height)| Some(Roi::new(left, top, width, height))),
        ]
    }

    fn any_rate() -> impl Strategy<Value = FrameRate> {
        prop_oneof![
            Just(FrameRate::Fastest),
            prop::sample::select(STANDARD_RATES.to_vec()).prop_map(FrameRate::Hz),
            (0.5f64..240.0).prop_map(FrameRate::Hz),
        ]
    }

    proptest! {
        #[test]
        fn negotiated_mode_satisfies_request(
            layers in 0u32..=5,
            bitdepth in prop::sample::select(vec![8u32, 10, 12, 16]),
            conversion in prop::sample::select(vec![
                DataConversion::Auto,
                DataConversion::RawPassthrough,
                DataConversion::RawForPostprocess,
                DataConversion::PrefilteredOnly,
                DataConversion::MonoAsRaw,
            ]),
            roi in any_roi(),
            rate in any_rate(),
            prefer_continuous in any::<bool>(),
            scalable in any::<bool>(),
        ) {
            let spec = if scalable {
                SimCameraSpec::scalable_raw(10)
            } else {
                SimCameraSpec::fixed_color(11)
            };
            let (_ctl, mut camera) = open(spec);
            let req = NegotiationRequest {
                roi,
                layers,
                bitdepth,
                conversion,
                rate,
                prefer_continuous,
            };
            if let Ok(mode) = negotiate(camera.as_mut(), &req) {
                prop_assert!(accepts(mode.color_coding, &req));
                prop_assert!(mode.actual_layers == 1 || mode.actual_layers == 3);
                prop_assert_eq!(mode.layers, mode.actual_layers);
                if let Some(roi) = roi {
                    prop_assert_eq!(mode.roi, roi);
                }
                prop_assert_eq!(mode.is_continuous(), mode.packet_size.is_some());
            }
        }
    }
}
