//! FFI Bindings for libdc1394
//!
//! Safe wrappers around the system IIDC library. Only the register and
//! transport calls the capture engine needs are bound. All raw pointers stay
//! inside this module; callers see [`Bus`] and [`Camera`].

#![allow(non_camel_case_types)]

use crate::camera::{Bus, BusResult, Camera, DmaFrame, FrameFormat, FrameMemory};
use crate::error::BusError;
use crate::types::*;
use libc::{c_char, c_int, c_void, FILE};
use std::ffi::CStr;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use tracing::{debug, info, warn};

const VIDEO_MODE_NUM: usize = 32;
const FRAMERATE_NUM: usize = 8;
const TRIGGER_SOURCE_NUM: usize = 5;
const FORMAT7_NUM: usize = 8;
const CAPTURE_FLAGS_DEFAULT: u32 = 0x0000_0004;

#[repr(C)]
pub struct dc1394_t {
    _private: [u8; 0],
}

/// Leading fields of the library's camera struct
#[repr(C)]
pub struct dc1394camera_t {
    pub guid: u64,
    pub unit: c_int,
    pub unit_spec_id: u32,
    pub unit_sw_version: u32,
    pub unit_sub_sw_version: u32,
    pub command_registers_base: u32,
    pub unit_directory: u32,
    pub unit_dependent_directory: u32,
    pub advanced_features_csr: u64,
    pub pio_control_csr: u64,
    pub sio_control_csr: u64,
    pub strobe_control_csr: u64,
    pub format7_csr: [u64; FORMAT7_NUM],
    pub iidc_version: u32,
    pub vendor: *mut c_char,
    pub model: *mut c_char,
}

#[repr(C)]
pub struct dc1394camera_id_t {
    pub guid: u64,
    pub unit: c_int,
}

#[repr(C)]
pub struct dc1394camera_list_t {
    pub num: u32,
    pub ids: *mut dc1394camera_id_t,
}

#[repr(C)]
pub struct dc1394video_modes_t {
    pub num: u32,
    pub modes: [u32; VIDEO_MODE_NUM],
}

#[repr(C)]
pub struct dc1394framerates_t {
    pub num: u32,
    pub framerates: [u32; FRAMERATE_NUM],
}

#[repr(C)]
pub struct dc1394trigger_sources_t {
    pub num: u32,
    pub sources: [u32; TRIGGER_SOURCE_NUM],
}

#[repr(C)]
pub struct dc1394video_frame_t {
    pub image: *mut u8,
    pub size: [u32; 2],
    pub position: [u32; 2],
    pub color_coding: u32,
    pub color_filter: u32,
    pub yuv_byte_order: u32,
    pub data_depth: u32,
    pub stride: u32,
    pub video_mode: u32,
    pub total_bytes: u64,
    pub image_bytes: u32,
    pub padding_bytes: u32,
    pub packet_size: u32,
    pub packets_per_frame: u32,
    pub timestamp: u64,
    pub frames_behind: u32,
    pub camera: *mut dc1394camera_t,
    pub id: u32,
    pub allocated_image_bytes: u64,
    pub little_endian: u32,
    pub data_in_padding: u32,
}

#[link(name = "dc1394")]
extern "C" {
    fn dc1394_new() -> *mut dc1394_t;
    fn dc1394_free(dc: *mut dc1394_t);
    fn dc1394_camera_enumerate(dc: *mut dc1394_t, list: *mut *mut dc1394camera_list_t) -> c_int;
    fn dc1394_camera_free_list(list: *mut dc1394camera_list_t);
    fn dc1394_camera_new_unit(dc: *mut dc1394_t, guid: u64, unit: c_int) -> *mut dc1394camera_t;
    fn dc1394_camera_free(camera: *mut dc1394camera_t);
    fn dc1394_camera_get_node(camera: *mut dc1394camera_t, node: *mut u32, generation: *mut u32) -> c_int;
    fn dc1394_camera_set_power(camera: *mut dc1394camera_t, on: u32) -> c_int;
    fn dc1394_camera_reset(camera: *mut dc1394camera_t) -> c_int;
    fn dc1394_camera_set_broadcast(camera: *mut dc1394camera_t, on: u32) -> c_int;
    fn dc1394_camera_print_info(camera: *mut dc1394camera_t, fd: *mut FILE) -> c_int;

    fn dc1394_video_get_supported_modes(camera: *mut dc1394camera_t, modes: *mut dc1394video_modes_t) -> c_int;
    fn dc1394_video_get_supported_framerates(
        camera: *mut dc1394camera_t,
        mode: u32,
        rates: *mut dc1394framerates_t,
    ) -> c_int;
    fn dc1394_get_color_coding_from_video_mode(camera: *mut dc1394camera_t, mode: u32, coding: *mut u32) -> c_int;
    fn dc1394_get_image_size_from_video_mode(
        camera: *mut dc1394camera_t,
        mode: u32,
        width: *mut u32,
        height: *mut u32,
    ) -> c_int;
    fn dc1394_video_get_iso_speed(camera: *mut dc1394camera_t, speed: *mut u32) -> c_int;
    fn dc1394_video_set_iso_speed(camera: *mut dc1394camera_t, speed: u32) -> c_int;
    fn dc1394_video_set_mode(camera: *mut dc1394camera_t, mode: u32) -> c_int;
    fn dc1394_video_set_framerate(camera: *mut dc1394camera_t, rate: u32) -> c_int;
    fn dc1394_video_set_transmission(camera: *mut dc1394camera_t, on: u32) -> c_int;
    fn dc1394_video_get_data_depth(camera: *mut dc1394camera_t, depth: *mut u32) -> c_int;
    fn dc1394_video_get_bandwidth_usage(camera: *mut dc1394camera_t, bandwidth: *mut u32) -> c_int;

    fn dc1394_format7_get_max_image_size(
        camera: *mut dc1394camera_t,
        mode: u32,
        width: *mut u32,
        height: *mut u32,
    ) -> c_int;
    fn dc1394_format7_set_image_size(camera: *mut dc1394camera_t, mode: u32, width: u32, height: u32) -> c_int;
    fn dc1394_format7_set_image_position(camera: *mut dc1394camera_t, mode: u32, left: u32, top: u32) -> c_int;
    fn dc1394_format7_get_packet_parameters(
        camera: *mut dc1394camera_t,
        mode: u32,
        unit_bytes: *mut u32,
        max_bytes: *mut u32,
    ) -> c_int;
    fn dc1394_format7_get_data_depth(camera: *mut dc1394camera_t, mode: u32, depth: *mut u32) -> c_int;
    fn dc1394_format7_get_color_coding(camera: *mut dc1394camera_t, mode: u32, coding: *mut u32) -> c_int;
    fn dc1394_format7_set_roi(
        camera: *mut dc1394camera_t,
        mode: u32,
        coding: u32,
        packet_size: i32,
        left: i32,
        top: i32,
        width: i32,
        height: i32,
    ) -> c_int;

    fn dc1394_capture_setup(camera: *mut dc1394camera_t, num_dma_buffers: u32, flags: u32) -> c_int;
    fn dc1394_capture_stop(camera: *mut dc1394camera_t) -> c_int;
    fn dc1394_capture_dequeue(
        camera: *mut dc1394camera_t,
        policy: u32,
        frame: *mut *mut dc1394video_frame_t,
    ) -> c_int;
    fn dc1394_capture_enqueue(camera: *mut dc1394camera_t, frame: *mut dc1394video_frame_t) -> c_int;

    fn dc1394_feature_is_present(camera: *mut dc1394camera_t, feature: u32, present: *mut u32) -> c_int;
    fn dc1394_feature_get_value(camera: *mut dc1394camera_t, feature: u32, value: *mut u32) -> c_int;
    fn dc1394_feature_set_value(camera: *mut dc1394camera_t, feature: u32, value: u32) -> c_int;
    fn dc1394_feature_get_boundaries(camera: *mut dc1394camera_t, feature: u32, min: *mut u32, max: *mut u32)
        -> c_int;
    fn dc1394_feature_set_mode(camera: *mut dc1394camera_t, feature: u32, mode: u32) -> c_int;

    fn dc1394_external_trigger_set_power(camera: *mut dc1394camera_t, on: u32) -> c_int;
    fn dc1394_external_trigger_get_mode(camera: *mut dc1394camera_t, mode: *mut u32) -> c_int;
    fn dc1394_external_trigger_set_mode(camera: *mut dc1394camera_t, mode: u32) -> c_int;
    fn dc1394_external_trigger_get_source(camera: *mut dc1394camera_t, source: *mut u32) -> c_int;
    fn dc1394_external_trigger_set_source(camera: *mut dc1394camera_t, source: u32) -> c_int;
    fn dc1394_external_trigger_get_supported_sources(
        camera: *mut dc1394camera_t,
        sources: *mut dc1394trigger_sources_t,
    ) -> c_int;
    fn dc1394_external_trigger_has_polarity(camera: *mut dc1394camera_t, present: *mut u32) -> c_int;
    fn dc1394_external_trigger_get_polarity(camera: *mut dc1394camera_t, polarity: *mut u32) -> c_int;
    fn dc1394_external_trigger_set_polarity(camera: *mut dc1394camera_t, polarity: u32) -> c_int;
}

fn check(code: c_int) -> BusResult<()> {
    BusError::check(code)
}

fn unknown_code(what: &str, code: u32) -> BusError {
    BusError::InvalidArgument(format!("unknown {} code {}", what, code))
}

/// Library context. Cameras keep it alive through an `Arc`.
struct Context {
    raw: NonNull<dc1394_t>,
}

// SAFETY: the library context is internally synchronized for enumeration
// and camera creation.
unsafe impl Send for Context {}
unsafe impl Sync for Context {}

impl Drop for Context {
    fn drop(&mut self) {
        debug!("Releasing libdc1394 context");
        unsafe { dc1394_free(self.raw.as_ptr()) };
    }
}

/// The host's IEEE-1394 buses as seen by libdc1394
pub struct Dc1394Bus {
    context: Arc<Context>,
}

impl Dc1394Bus {
    /// Initialize the library
    pub fn new() -> BusResult<Self> {
        let raw = NonNull::new(unsafe { dc1394_new() })
            .ok_or_else(|| BusError::Init("dc1394_new returned null".to_string()))?;
        info!("libdc1394 initialized");
        Ok(Self {
            context: Arc::new(Context { raw }),
        })
    }
}

impl Bus for Dc1394Bus {
    fn enumerate(&self) -> BusResult<Vec<CameraId>> {
        let mut list: *mut dc1394camera_list_t = ptr::null_mut();
        check(unsafe { dc1394_camera_enumerate(self.context.raw.as_ptr(), &mut list) })?;
        if list.is_null() {
            return Ok(Vec::new());
        }

        // SAFETY: the list was allocated by the library and holds `num` ids.
        let ids = unsafe {
            let list_ref = &*list;
            let ids = if list_ref.ids.is_null() {
                &[][..]
            } else {
                std::slice::from_raw_parts(list_ref.ids, list_ref.num as usize)
            };
            let out = ids
                .iter()
                .map(|id| CameraId {
                    guid: id.guid,
                    unit: id.unit.max(0) as u32,
                })
                .collect();
            dc1394_camera_free_list(list);
            out
        };
        Ok(ids)
    }

    fn open(&self, id: &CameraId) -> BusResult<Box<dyn Camera>> {
        let raw = unsafe {
            dc1394_camera_new_unit(self.context.raw.as_ptr(), id.guid, id.unit as c_int)
        };
        let raw = NonNull::new(raw).ok_or(BusError::CameraNotFound {
            guid: id.guid,
            unit: id.unit,
        })?;

        let (mut node, mut generation) = (0u32, 0u32);
        // SAFETY: `raw` is a live camera handle owned by this function.
        let identity = unsafe {
            if let Err(e) = check(dc1394_camera_get_node(raw.as_ptr(), &mut node, &mut generation)) {
                warn!("Could not query bus node of camera {:016x}: {}", id.guid, e);
            }
            let cam = raw.as_ref();
            CameraIdentity {
                vendor: c_string(cam.vendor),
                model: c_string(cam.model),
                guid: cam.guid,
                unit: cam.unit.max(0) as u32,
                node,
                generation,
                port: 0,
            }
        };

        debug!("Opened camera {} {} ({:016x})", identity.vendor, identity.model, identity.guid);
        Ok(Box::new(Dc1394Camera {
            raw,
            identity,
            _context: self.context.clone(),
        }))
    }
}

unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// A camera opened through libdc1394
pub struct Dc1394Camera {
    raw: NonNull<dc1394camera_t>,
    identity: CameraIdentity,
    _context: Arc<Context>,
}

// SAFETY: camera handles may move between threads; callers serialize access
// through `&mut self`.
unsafe impl Send for Dc1394Camera {}

impl Drop for Dc1394Camera {
    fn drop(&mut self) {
        unsafe { dc1394_camera_free(self.raw.as_ptr()) };
    }
}

impl Dc1394Camera {
    fn cam(&self) -> *mut dc1394camera_t {
        self.raw.as_ptr()
    }

    fn get_u32(&self, f: unsafe extern "C" fn(*mut dc1394camera_t, *mut u32) -> c_int) -> BusResult<u32> {
        let mut value = 0u32;
        check(unsafe { f(self.cam(), &mut value) })?;
        Ok(value)
    }

    fn get_arg_u32(
        &self,
        arg: u32,
        f: unsafe extern "C" fn(*mut dc1394camera_t, u32, *mut u32) -> c_int,
    ) -> BusResult<u32> {
        let mut value = 0u32;
        check(unsafe { f(self.cam(), arg, &mut value) })?;
        Ok(value)
    }

    fn get_pair(
        &self,
        arg: u32,
        f: unsafe extern "C" fn(*mut dc1394camera_t, u32, *mut u32, *mut u32) -> c_int,
    ) -> BusResult<(u32, u32)> {
        let (mut a, mut b) = (0u32, 0u32);
        check(unsafe { f(self.cam(), arg, &mut a, &mut b) })?;
        Ok((a, b))
    }
}

impl Camera for Dc1394Camera {
    fn identity(&self) -> &CameraIdentity {
        &self.identity
    }

    fn set_power(&mut self, on: bool) -> BusResult<()> {
        check(unsafe { dc1394_camera_set_power(self.cam(), on as u32) })
    }

    fn reset(&mut self) -> BusResult<()> {
        check(unsafe { dc1394_camera_reset(self.cam()) })
    }

    fn info(&mut self) -> BusResult<String> {
        // SAFETY: the temporary file is owned here and closed on every path.
        unsafe {
            let file = libc::tmpfile();
            if file.is_null() {
                return Err(BusError::Io("tmpfile failed".to_string()));
            }
            let rc = dc1394_camera_print_info(self.cam(), file);
            let mut out = Vec::new();
            if rc == 0 {
                libc::rewind(file);
                let mut buf = [0u8; 4096];
                loop {
                    let n = libc::fread(buf.as_mut_ptr() as *mut c_void, 1, buf.len(), file);
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&buf[..n]);
                }
            }
            libc::fclose(file);
            check(rc)?;
            Ok(String::from_utf8_lossy(&out).into_owned())
        }
    }

    fn supported_modes(&mut self) -> BusResult<Vec<VideoMode>> {
        let mut modes = dc1394video_modes_t {
            num: 0,
            modes: [0; VIDEO_MODE_NUM],
        };
        check(unsafe { dc1394_video_get_supported_modes(self.cam(), &mut modes) })?;
        let count = (modes.num as usize).min(VIDEO_MODE_NUM);
        Ok(modes.modes[..count]
            .iter()
            .filter_map(|&code| VideoMode::from_code(code))
            .collect())
    }

    fn mode_color_coding(&mut self, mode: VideoMode) -> BusResult<ColorCoding> {
        let code = self.get_arg_u32(mode.code(), dc1394_get_color_coding_from_video_mode)?;
        ColorCoding::from_code(code).ok_or_else(|| unknown_code("color coding", code))
    }

    fn mode_image_size(&mut self, mode: VideoMode) -> BusResult<(u32, u32)> {
        self.get_pair(mode.code(), dc1394_get_image_size_from_video_mode)
    }

    fn supported_framerates(&mut self, mode: VideoMode) -> BusResult<Vec<Framerate>> {
        let mut rates = dc1394framerates_t {
            num: 0,
            framerates: [0; FRAMERATE_NUM],
        };
        check(unsafe { dc1394_video_get_supported_framerates(self.cam(), mode.code(), &mut rates) })?;
        let count = (rates.num as usize).min(FRAMERATE_NUM);
        let mut out: Vec<Framerate> = rates.framerates[..count]
            .iter()
            .filter_map(|&code| Framerate::from_code(code))
            .collect();
        out.sort();
        Ok(out)
    }

    fn format7_max_image_size(&mut self, mode: VideoMode) -> BusResult<(u32, u32)> {
        self.get_pair(mode.code(), dc1394_format7_get_max_image_size)
    }

    fn format7_set_image_position(&mut self, mode: VideoMode, left: u32, top: u32) -> BusResult<()> {
        check(unsafe { dc1394_format7_set_image_position(self.cam(), mode.code(), left, top) })
    }

    fn format7_set_image_size(&mut self, mode: VideoMode, width: u32, height: u32) -> BusResult<()> {
        check(unsafe { dc1394_format7_set_image_size(self.cam(), mode.code(), width, height) })
    }

    fn format7_packet_parameters(&mut self, mode: VideoMode) -> BusResult<(u32, u32)> {
        self.get_pair(mode.code(), dc1394_format7_get_packet_parameters)
    }

    fn format7_data_depth(&mut self, mode: VideoMode) -> BusResult<u32> {
        self.get_arg_u32(mode.code(), dc1394_format7_get_data_depth)
    }

    fn format7_color_coding(&mut self, mode: VideoMode) -> BusResult<ColorCoding> {
        let code = self.get_arg_u32(mode.code(), dc1394_format7_get_color_coding)?;
        ColorCoding::from_code(code).ok_or_else(|| unknown_code("color coding", code))
    }

    fn format7_set_roi(
        &mut self,
        mode: VideoMode,
        coding: ColorCoding,
        packet_size: u32,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    ) -> BusResult<()> {
        let arg = |v: u32| i32::try_from(v).map_err(|_| BusError::OutOfRange);
        check(unsafe {
            dc1394_format7_set_roi(
                self.cam(),
                mode.code(),
                coding.code(),
                arg(packet_size)?,
                arg(left)?,
                arg(top)?,
                arg(width)?,
                arg(height)?,
            )
        })
    }

    fn iso_speed(&mut self) -> BusResult<IsoSpeed> {
        let code = self.get_u32(dc1394_video_get_iso_speed)?;
        IsoSpeed::from_code(code).ok_or_else(|| unknown_code("iso speed", code))
    }

    fn set_iso_speed(&mut self, speed: IsoSpeed) -> BusResult<()> {
        check(unsafe { dc1394_video_set_iso_speed(self.cam(), speed.code()) })
    }

    fn set_video_mode(&mut self, mode: VideoMode) -> BusResult<()> {
        check(unsafe { dc1394_video_set_mode(self.cam(), mode.code()) })
    }

    fn set_framerate(&mut self, rate: Framerate) -> BusResult<()> {
        check(unsafe { dc1394_video_set_framerate(self.cam(), rate.code()) })
    }

    fn video_data_depth(&mut self) -> BusResult<u32> {
        self.get_u32(dc1394_video_get_data_depth)
    }

    fn bandwidth_usage(&mut self) -> BusResult<u32> {
        self.get_u32(dc1394_video_get_bandwidth_usage)
    }

    fn capture_setup(&mut self, buffers: u32) -> BusResult<()> {
        check(unsafe { dc1394_capture_setup(self.cam(), buffers, CAPTURE_FLAGS_DEFAULT) })
    }

    fn capture_stop(&mut self) -> BusResult<()> {
        check(unsafe { dc1394_capture_stop(self.cam()) })
    }

    fn set_transmission(&mut self, on: bool) -> BusResult<()> {
        check(unsafe { dc1394_video_set_transmission(self.cam(), on as u32) })
    }

    fn set_broadcast(&mut self, on: bool) -> BusResult<()> {
        check(unsafe { dc1394_camera_set_broadcast(self.cam(), on as u32) })
    }

    fn dequeue(&mut self, policy: DequeuePolicy) -> BusResult<Option<DmaFrame>> {
        let mut raw: *mut dc1394video_frame_t = ptr::null_mut();
        check(unsafe { dc1394_capture_dequeue(self.cam(), policy.code(), &mut raw) })?;
        let Some(raw) = NonNull::new(raw) else {
            return Ok(None);
        };

        // SAFETY: the library hands out a valid descriptor until it is enqueued.
        let frame = unsafe { raw.as_ref() };
        let color_coding = ColorCoding::from_code(frame.color_coding)
            .ok_or_else(|| unknown_code("color coding", frame.color_coding))?;
        let format = FrameFormat {
            width: frame.size[0],
            height: frame.size[1],
            color_coding,
            color_filter: ColorFilter::from_code(frame.color_filter),
            data_depth: frame.data_depth,
        };

        Ok(Some(DmaFrame {
            slot: frame.id as usize,
            memory: FrameMemory::Dma(raw),
            format,
            timestamp_us: frame.timestamp,
            frames_behind: frame.frames_behind,
        }))
    }

    fn enqueue(&mut self, frame: DmaFrame) -> BusResult<()> {
        match frame.memory {
            FrameMemory::Dma(raw) => check(unsafe { dc1394_capture_enqueue(self.cam(), raw.as_ptr()) }),
            FrameMemory::Owned(_) => Err(BusError::InvalidArgument(
                "frame was not dequeued from this camera".to_string(),
            )),
        }
    }

    fn feature_present(&mut self, feature: Feature) -> BusResult<bool> {
        Ok(self.get_arg_u32(feature.code(), dc1394_feature_is_present)? != 0)
    }

    fn feature_value(&mut self, feature: Feature) -> BusResult<u32> {
        self.get_arg_u32(feature.code(), dc1394_feature_get_value)
    }

    fn set_feature_value(&mut self, feature: Feature, value: u32) -> BusResult<()> {
        check(unsafe { dc1394_feature_set_value(self.cam(), feature.code(), value) })
    }

    fn feature_boundaries(&mut self, feature: Feature) -> BusResult<(u32, u32)> {
        self.get_pair(feature.code(), dc1394_feature_get_boundaries)
    }

    fn set_feature_mode(&mut self, feature: Feature, mode: FeatureMode) -> BusResult<()> {
        check(unsafe { dc1394_feature_set_mode(self.cam(), feature.code(), mode.code()) })
    }

    fn set_trigger_power(&mut self, on: bool) -> BusResult<()> {
        check(unsafe { dc1394_external_trigger_set_power(self.cam(), on as u32) })
    }

    fn trigger_mode(&mut self) -> BusResult<TriggerMode> {
        let code = self.get_u32(dc1394_external_trigger_get_mode)?;
        TriggerMode::from_code(code).ok_or_else(|| unknown_code("trigger mode", code))
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> BusResult<()> {
        check(unsafe { dc1394_external_trigger_set_mode(self.cam(), mode.code()) })
    }

    fn trigger_source(&mut self) -> BusResult<TriggerSource> {
        let code = self.get_u32(dc1394_external_trigger_get_source)?;
        TriggerSource::from_code(code).ok_or_else(|| unknown_code("trigger source", code))
    }

    fn set_trigger_source(&mut self, source: TriggerSource) -> BusResult<()> {
        check(unsafe { dc1394_external_trigger_set_source(self.cam(), source.code()) })
    }

    fn supported_trigger_sources(&mut self) -> BusResult<Vec<TriggerSource>> {
        let mut sources = dc1394trigger_sources_t {
            num: 0,
            sources: [0; TRIGGER_SOURCE_NUM],
        };
        check(unsafe { dc1394_external_trigger_get_supported_sources(self.cam(), &mut sources) })?;
        let count = (sources.num as usize).min(TRIGGER_SOURCE_NUM);
        Ok(sources.sources[..count]
            .iter()
            .filter_map(|&code| TriggerSource::from_code(code))
            .collect())
    }

    fn trigger_has_polarity(&mut self) -> BusResult<bool> {
        Ok(self.get_u32(dc1394_external_trigger_has_polarity)? != 0)
    }

    fn trigger_polarity(&mut self) -> BusResult<TriggerPolarity> {
        match self.get_u32(dc1394_external_trigger_get_polarity)? {
            704 => Ok(TriggerPolarity::ActiveLow),
            705 => Ok(TriggerPolarity::ActiveHigh),
            code => Err(unknown_code("trigger polarity", code)),
        }
    }

    fn set_trigger_polarity(&mut self, polarity: TriggerPolarity) -> BusResult<()> {
        check(unsafe { dc1394_external_trigger_set_polarity(self.cam(), polarity.code()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_frame_descriptor_layout() {
        assert_eq!(std::mem::size_of::<dc1394video_frame_t>(), 120);
        assert_eq!(std::mem::align_of::<dc1394video_frame_t>(), 8);
    }

    #[test]
    fn test_capture_policy_codes() {
        assert_eq!(DequeuePolicy::Wait.code(), 672);
        assert_eq!(DequeuePolicy::Poll.code(), 673);
    }
}
