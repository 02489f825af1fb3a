//! Continuous (Format 7) mode search

use iidc_bus::{BusResult, Camera, ColorCoding, VideoMode};
use tracing::{debug, info, warn};

use crate::compat::accepts;
use crate::packet::{compute_packet_size, PacketPlan};
use crate::request::{NegotiationRequest, Roi};

/// A programmed continuous mode with its packet plan
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContinuousChoice {
    pub mode: VideoMode,
    pub color_coding: ColorCoding,
    pub roi: Roi,
    pub plan: PacketPlan,
    pub rate_matched: bool,
}

/// Program the requested geometry into `mode` and return the image size.
/// Without a requested region the full sensor is used.
fn program_geometry(
    camera: &mut dyn Camera,
    mode: VideoMode,
    roi: Option<Roi>,
) -> BusResult<Option<Roi>> {
    let (max_width, max_height) = camera.format7_max_image_size(mode)?;
    match roi {
        None => {
            camera.format7_set_image_position(mode, 0, 0)?;
            camera.format7_set_image_size(mode, max_width, max_height)?;
            Ok(Some(Roi::sized(max_width, max_height)))
        }
        Some(roi) => {
            if roi.width > max_width || roi.height > max_height {
                return Ok(None);
            }
            // Position first goes to the origin so any size is legal, then
            // moves to the requested corner.
            camera.format7_set_image_position(mode, 0, 0)?;
            camera.format7_set_image_size(mode, roi.width, roi.height)?;
            camera.format7_set_image_position(mode, roi.left, roi.top)?;
            Ok(Some(roi))
        }
    }
}

fn plan_mode(
    camera: &mut dyn Camera,
    mode: VideoMode,
    req: &NegotiationRequest,
    bus_period: f64,
) -> BusResult<Option<(ColorCoding, Roi, PacketPlan)>> {
    let coding = camera.format7_color_coding(mode)?;
    if !accepts(coding, req) {
        return Ok(None);
    }
    let Some(roi) = program_geometry(camera, mode, req.roi)? else {
        return Ok(None);
    };
    let (unit, max) = camera.format7_packet_parameters(mode)?;
    let depth = camera.format7_data_depth(mode)?;
    let plan = compute_packet_size(
        roi.width,
        roi.height,
        depth,
        bus_period,
        req.rate.target(),
        unit,
        max,
    );
    Ok(plan.map(|plan| (coding, roi, plan)))
}

pub(crate) fn find_continuous(
    camera: &mut dyn Camera,
    req: &NegotiationRequest,
    bus_period: f64,
) -> BusResult<Option<ContinuousChoice>> {
    let target = req.rate.target();
    let modes = camera.supported_modes()?;

    let mut best: Option<(VideoMode, ColorCoding, Roi, PacketPlan)> = None;
    for mode in modes.into_iter().filter(|m| m.is_format7()) {
        let (coding, roi, plan) = match plan_mode(camera, mode, req, bus_period) {
            Ok(Some(candidate)) => candidate,
            Ok(None) => continue,
            Err(e) => {
                debug!("Skipping {:?}: {}", mode, e);
                continue;
            }
        };

        let better = match &best {
            None => true,
            Some((_, _, _, current)) if req.rate.is_fastest() => plan.fps > current.fps,
            Some((_, _, _, current)) => (target - plan.fps).abs() < (target - current.fps).abs(),
        };
        if better {
            best = Some((mode, coding, roi, plan));
        }
    }

    let Some((mode, color_coding, roi, plan)) = best else {
        info!("No usable continuous mode found, trying fixed modes");
        return Ok(None);
    };

    let rate_matched = req.rate.is_fastest() || (target - plan.fps).abs() < 0.5;
    if !req.rate.is_fastest() && plan.fps < target {
        warn!(
            "Requested {:.3} fps, but {:?} at {}x{} only reaches {:.3} fps",
            target, mode, roi.width, roi.height, plan.fps
        );
    }
    info!(
        "Selected continuous mode {:?}: {}x{} at ({}, {}) {:?}, packet {} bytes, {:.3} fps",
        mode, roi.width, roi.height, roi.left, roi.top, color_coding, plan.packet_size, plan.fps
    );

    Ok(Some(ContinuousChoice {
        mode,
        color_coding,
        roi,
        plan,
        rate_matched,
    }))
}

/// Run the continuous-mode search on its own. `Ok(None)` means no
/// continuous mode fits and the fixed table should be tried.
pub fn search_continuous(
    camera: &mut dyn Camera,
    req: &NegotiationRequest,
    bus_period: f64,
) -> BusResult<Option<(VideoMode, Roi, PacketPlan)>> {
    Ok(find_continuous(camera, req, bus_period)?.map(|c| (c.mode, c.roi, c.plan)))
}
