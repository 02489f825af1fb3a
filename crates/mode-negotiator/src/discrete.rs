//! Fixed-table mode search

use iidc_bus::{Camera, ColorCoding, Framerate, VideoMode};
use tracing::{debug, info, warn};

use crate::compat::accepts;
use crate::error::NegotiationError;
use crate::request::{DataConversion, NegotiationRequest, Roi};

/// A fixed mode that passed the size and encoding filters
#[derive(Debug, Clone, Copy)]
pub(crate) struct DiscreteChoice {
    pub mode: VideoMode,
    pub color_coding: ColorCoding,
    pub roi: Roi,
    pub framerate: Framerate,
    pub fps: f64,
    pub rate_matched: bool,
}

/// Slowest supported rate at or above `target`, else the fastest one.
/// `rates` must be ascending.
pub fn pick_framerate(rates: &[Framerate], target: f64) -> Option<Framerate> {
    rates
        .iter()
        .copied()
        .find(|rate| rate.as_f64() >= target)
        .or_else(|| rates.last().copied())
}

/// RGB8 output needs no conversion, so it wins ties over YUV
fn prefers_unconverted(coding: ColorCoding, req: &NegotiationRequest) -> bool {
    (req.layers == 0 || req.layers > 2)
        && req.conversion == DataConversion::Auto
        && coding == ColorCoding::Rgb8
}

/// Search the fixed mode table for the best match to `req`
pub(crate) fn find_discrete(
    camera: &mut dyn Camera,
    req: &NegotiationRequest,
) -> Result<DiscreteChoice, NegotiationError> {
    let target = req.rate.target();
    let modes = camera.supported_modes()?;

    let mut best: Option<(VideoMode, ColorCoding, u32, u32)> = None;
    let mut best_area = 0u64;
    let mut best_rate = 0.0f64;

    for mode in modes {
        if mode.is_format7() || mode == VideoMode::Exif {
            continue;
        }
        let Ok(coding) = camera.mode_color_coding(mode) else {
            continue;
        };
        if !accepts(coding, req) {
            continue;
        }
        let Ok((width, height)) = camera.mode_image_size(mode) else {
            continue;
        };
        let rates = camera.supported_framerates(mode)?;
        let Some(rate) = pick_framerate(&rates, target) else {
            debug!("{:?} reports no frame rates, skipping", mode);
            continue;
        };

        match req.roi {
            None => {
                let area = u64::from(width) * u64::from(height);
                if area < best_area {
                    continue;
                }
                best_area = area;
                best = Some((mode, coding, width, height));
            }
            Some(roi) => {
                if !roi.at_origin() || roi.width != width || roi.height != height {
                    continue;
                }
                let fps = rate.as_f64();
                let bonus = prefers_unconverted(coding, req);
                if fps > best_rate || (bonus && (fps == best_rate || fps == target)) {
                    best_rate = fps;
                    best = Some((mode, coding, width, height));
                }
            }
        }
    }

    let Some((mode, color_coding, width, height)) = best else {
        return Err(NegotiationError::NoMatchingMode(match req.roi {
            Some(roi) => format!("{}x{} image at ({}, {})", roi.width, roi.height, roi.left, roi.top),
            None => format!("{} layers at {} bits", req.layers, req.bitdepth),
        }));
    };

    let rates = camera.supported_framerates(mode)?;
    let framerate = pick_framerate(&rates, target).ok_or(NegotiationError::NoFramerate(mode))?;
    let fps = framerate.as_f64();
    let rate_matched = req.rate.is_fastest() || (fps - target).abs() < 0.5;

    if !req.rate.is_fastest() && fps < target {
        warn!(
            "Requested {:.3} fps, but {:?} only supports up to {:.3} fps",
            target, mode, fps
        );
    }
    info!(
        "Selected fixed mode {:?}: {}x{} {:?} at {:.3} fps",
        mode, width, height, color_coding, fps
    );

    Ok(DiscreteChoice {
        mode,
        color_coding,
        roi: Roi::sized(width, height),
        framerate,
        fps,
        rate_matched,
    })
}

/// Run the fixed-table search on its own and report the chosen mode
pub fn search_discrete(
    camera: &mut dyn Camera,
    req: &NegotiationRequest,
) -> Result<(VideoMode, Framerate, Roi), NegotiationError> {
    let choice = find_discrete(camera, req)?;
    Ok((choice.mode, choice.framerate, choice.roi))
}
