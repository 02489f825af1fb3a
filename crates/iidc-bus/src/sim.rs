//! Simulated IIDC bus
//!
//! In-process cameras with configurable mode tables, features and trigger
//! inputs. Frames are either injected through a [`SimController`] or, in
//! free-running mode, generated from the clock at the programmed rate. The
//! DMA ring is a [`DmaRing`], so tests can audit buffer ownership.

use crate::camera::{Bus, BusResult, Camera, DmaFrame, FrameFormat};
use crate::error::BusError;
use crate::types::*;
use ring_buffer::{DmaRing, RingStats};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// A scalable (format 7) mode of a simulated camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimFormat7Mode {
    pub index: u8,
    pub color_coding: ColorCoding,
    pub max_size: (u32, u32),
    /// Granularity of size and position
    pub unit: u32,
    pub packet_unit: u32,
    pub packet_max: u32,
    pub color_filter: Option<ColorFilter>,
}

impl SimFormat7Mode {
    pub fn new(index: u8, color_coding: ColorCoding, max_width: u32, max_height: u32) -> Self {
        Self {
            index,
            color_coding,
            max_size: (max_width, max_height),
            unit: 8,
            packet_unit: 4,
            packet_max: 4096,
            color_filter: None,
        }
    }

    pub fn with_filter(mut self, filter: ColorFilter) -> Self {
        self.color_filter = Some(filter);
        self
    }

    pub fn with_packet_limits(mut self, unit: u32, max: u32) -> Self {
        self.packet_unit = unit;
        self.packet_max = max;
        self
    }
}

/// A control feature of a simulated camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimFeature {
    pub value: u32,
    pub min: u32,
    pub max: u32,
    pub mode: FeatureMode,
}

/// External trigger capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimTrigger {
    pub mode: TriggerMode,
    pub source: TriggerSource,
    pub sources: Vec<TriggerSource>,
    /// `None` if the polarity is not programmable
    pub polarity: Option<TriggerPolarity>,
}

impl Default for SimTrigger {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Mode0,
            source: TriggerSource::Port0,
            sources: vec![
                TriggerSource::Port0,
                TriggerSource::Port1,
                TriggerSource::Port2,
                TriggerSource::Port3,
            ],
            polarity: Some(TriggerPolarity::ActiveLow),
        }
    }
}

/// Static description of a simulated camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimCameraSpec {
    pub identity: CameraIdentity,
    pub iso_speed: IsoSpeed,
    pub fixed_modes: Vec<(VideoMode, Vec<Framerate>)>,
    pub format7_modes: Vec<SimFormat7Mode>,
    pub features: HashMap<Feature, SimFeature>,
    pub trigger: Option<SimTrigger>,
    /// Significant bits of 16-bit encodings (e.g. 12 for a 12-bit sensor)
    pub sensor_depth: Option<u32>,
    /// Generate frames from the clock while transmitting
    pub free_run: bool,
}

impl SimCameraSpec {
    pub fn new(vendor: &str, model: &str, guid: u64) -> Self {
        Self {
            identity: CameraIdentity {
                vendor: vendor.to_string(),
                model: model.to_string(),
                guid,
                unit: 0,
                node: (guid & 0x3f) as u32,
                generation: 1,
                port: 0,
            },
            iso_speed: IsoSpeed::S400,
            fixed_modes: Vec::new(),
            format7_modes: Vec::new(),
            features: HashMap::new(),
            trigger: None,
            sensor_depth: None,
            free_run: false,
        }
    }

    /// Add a fixed-geometry mode. Unknown size/encoding pairs are skipped.
    pub fn with_fixed_mode(
        mut self,
        width: u32,
        height: u32,
        coding: ColorCoding,
        rates: &[Framerate],
    ) -> Self {
        match VideoMode::fixed(width, height, coding) {
            Some(mode) => {
                let mut rates = rates.to_vec();
                rates.sort();
                self.fixed_modes.push((mode, rates));
            }
            None => warn!(
                "No fixed IIDC mode for {}x{} {:?}, skipped",
                width, height, coding
            ),
        }
        self
    }

    pub fn with_format7_mode(mut self, mode: SimFormat7Mode) -> Self {
        self.format7_modes.push(mode);
        self
    }

    pub fn with_feature(mut self, feature: Feature, value: u32, min: u32, max: u32) -> Self {
        self.features.insert(
            feature,
            SimFeature {
                value,
                min,
                max,
                mode: FeatureMode::Manual,
            },
        );
        self
    }

    pub fn with_trigger(mut self, trigger: SimTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_iso_speed(mut self, speed: IsoSpeed) -> Self {
        self.iso_speed = speed;
        self
    }

    pub fn with_sensor_depth(mut self, depth: u32) -> Self {
        self.sensor_depth = Some(depth);
        self
    }

    pub fn on_port(mut self, port: u32) -> Self {
        self.identity.port = port;
        self
    }

    pub fn free_running(mut self) -> Self {
        self.free_run = true;
        self
    }

    /// Color camera with fixed modes only
    pub fn fixed_color(guid: u64) -> Self {
        use Framerate::*;
        Self::new("Point Grey", "Flea", guid)
            .with_fixed_mode(320, 240, ColorCoding::Yuv422, &[F15, F30, F60])
            .with_fixed_mode(640, 480, ColorCoding::Yuv422, &[F7_5, F15, F30, F60])
            .with_fixed_mode(640, 480, ColorCoding::Rgb8, &[F7_5, F15, F30])
            .with_fixed_mode(640, 480, ColorCoding::Mono8, &[F7_5, F15, F30, F60])
            .with_fixed_mode(1024, 768, ColorCoding::Rgb8, &[F3_75, F7_5, F15])
            .with_fixed_mode(1280, 960, ColorCoding::Mono8, &[F3_75, F7_5, F15])
            .with_feature(Feature::Brightness, 128, 0, 255)
            .with_feature(Feature::Gain, 16, 0, 511)
            .with_feature(Feature::Shutter, 400, 1, 4095)
            .with_feature(Feature::Exposure, 300, 0, 1023)
            .with_feature(Feature::Gamma, 1, 0, 1)
            .with_trigger(SimTrigger::default())
    }

    /// Raw-sensor camera with scalable modes only
    pub fn scalable_raw(guid: u64) -> Self {
        Self::new("Basler", "A602f", guid)
            .with_format7_mode(
                SimFormat7Mode::new(0, ColorCoding::Raw8, 1600, 1200).with_filter(ColorFilter::Rggb),
            )
            .with_format7_mode(SimFormat7Mode::new(1, ColorCoding::Mono8, 1600, 1200))
            .with_format7_mode(SimFormat7Mode::new(2, ColorCoding::Mono16, 1600, 1200))
            .with_sensor_depth(12)
            .with_feature(Feature::Gain, 0, 0, 255)
            .with_feature(Feature::Shutter, 1000, 20, 20000)
            .with_trigger(SimTrigger::default())
    }

    /// Webcam that reports 100 Mbit after a cold start
    pub fn unibrain_fire_i(guid: u64) -> Self {
        use Framerate::*;
        Self::new("Unibrain", "Fire-i 1.2", guid)
            .with_iso_speed(IsoSpeed::S100)
            .with_fixed_mode(320, 240, ColorCoding::Yuv422, &[F3_75, F7_5, F15, F30])
            .with_fixed_mode(640, 480, ColorCoding::Yuv411, &[F3_75, F7_5, F15, F30])
            .with_fixed_mode(640, 480, ColorCoding::Yuv422, &[F3_75, F7_5, F15])
            .with_fixed_mode(640, 480, ColorCoding::Rgb8, &[F3_75, F7_5, F15])
            .with_feature(Feature::Brightness, 304, 128, 383)
    }
}

/// Register writes recorded by a simulated camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEvent {
    Power(bool),
    Reset,
    IsoSpeed(IsoSpeed),
    VideoMode(VideoMode),
    Framerate(Framerate),
    Format7Roi {
        mode: u8,
        packet_size: u32,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    },
    CaptureSetup(u32),
    CaptureStop,
    Transmission(bool),
    Broadcast(bool),
    TriggerPower(bool),
}

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimFault {
    CaptureSetup,
    TransmissionStart,
    Dequeue,
    Enqueue,
    Broadcast,
    PowerOff,
    /// All programming of this scalable mode fails
    Format7Mode(u8),
}

/// Current scalable-mode registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format7Registers {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub packet_size: u32,
}

struct SimBuffer {
    data: Vec<u8>,
    timestamp_us: u64,
}

struct SimState {
    spec: SimCameraSpec,
    powered: bool,
    iso_speed: IsoSpeed,
    video_mode: Option<VideoMode>,
    fps: f64,
    format7: HashMap<u8, Format7Registers>,
    ring: Option<DmaRing<SimBuffer>>,
    last_stats: Option<RingStats>,
    transmitting: bool,
    broadcast: bool,
    trigger_power: bool,
    frame_counter: u64,
    next_due: Option<Instant>,
    faults: HashSet<SimFault>,
    events: Vec<SimEvent>,
}

impl SimState {
    fn new(spec: SimCameraSpec) -> Self {
        let format7 = spec
            .format7_modes
            .iter()
            .map(|m| {
                let regs = Format7Registers {
                    left: 0,
                    top: 0,
                    width: m.max_size.0,
                    height: m.max_size.1,
                    packet_size: m.packet_max,
                };
                (m.index, regs)
            })
            .collect();

        Self {
            iso_speed: spec.iso_speed,
            spec,
            powered: false,
            video_mode: None,
            fps: 30.0,
            format7,
            ring: None,
            last_stats: None,
            transmitting: false,
            broadcast: false,
            trigger_power: false,
            frame_counter: 0,
            next_due: None,
            faults: HashSet::new(),
            events: Vec::new(),
        }
    }

    fn format7_spec(&self, mode: VideoMode) -> BusResult<&SimFormat7Mode> {
        let VideoMode::Format7(index) = mode else {
            return Err(BusError::InvalidArgument(format!("{:?} is not scalable", mode)));
        };
        if self.faults.contains(&SimFault::Format7Mode(index)) {
            return Err(BusError::Io(format!("format 7 mode {} register write failed", index)));
        }
        self.spec
            .format7_modes
            .iter()
            .find(|m| m.index == index)
            .ok_or_else(|| BusError::InvalidArgument(format!("{:?} not supported", mode)))
    }

    fn current_format(&self) -> BusResult<FrameFormat> {
        let mode = self
            .video_mode
            .ok_or_else(|| BusError::InvalidArgument("no video mode set".to_string()))?;
        let (width, height, color_coding, color_filter) = match mode {
            VideoMode::Format7(index) => {
                let f7 = self.format7_spec(mode)?;
                let regs = self.format7.get(&index).copied().ok_or(BusError::NotSupported)?;
                (regs.width, regs.height, f7.color_coding, f7.color_filter)
            }
            other => {
                let (w, h, coding) = other.fixed_geometry().ok_or(BusError::NotSupported)?;
                (w, h, coding, None)
            }
        };
        Ok(FrameFormat {
            width,
            height,
            color_coding,
            color_filter,
            data_depth: self.data_depth_of(color_coding),
        })
    }

    fn data_depth_of(&self, coding: ColorCoding) -> u32 {
        match (coding.data_depth(), self.spec.sensor_depth) {
            (16, Some(depth)) => depth,
            (depth, _) => depth,
        }
    }

    /// Write one synthetic frame into the ring. Returns false on overrun or
    /// when the camera is not streaming.
    fn produce_frame(&mut self) -> bool {
        if !self.powered || !self.transmitting {
            return false;
        }
        let Ok(format) = self.current_format() else {
            return false;
        };
        let Some(ring) = self.ring.as_mut() else {
            return false;
        };

        let counter = self.frame_counter;
        let bytes = format.image_bytes();
        let mask: u32 = (1u32 << format.data_depth.min(16)) - 1;
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        let filled = ring.fill_with(|recycled| {
            let mut data = recycled.map(|b| b.data).unwrap_or_default();
            data.resize(bytes, 0);
            if format.color_coding.data_depth() == 16 {
                for (i, word) in data.chunks_exact_mut(2).enumerate() {
                    let value = ((i as u64 + counter) as u32 & mask) as u16;
                    word.copy_from_slice(&value.to_ne_bytes());
                }
            } else {
                for (i, byte) in data.iter_mut().enumerate() {
                    *byte = (i as u64 + counter) as u8;
                }
            }
            SimBuffer { data, timestamp_us }
        });

        self.frame_counter += 1;
        filled.is_some()
    }

    /// Generate every frame that became due since the last call
    fn catch_up(&mut self, now: Instant) {
        if !self.transmitting || self.ring.is_none() {
            self.next_due = None;
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / self.fps.max(0.1));
        let mut due = *self.next_due.get_or_insert(now + interval);
        let limit = self.ring.as_ref().map_or(1, |r| r.capacity() + 1);
        let mut produced = 0;
        while due <= now && produced < limit {
            self.produce_frame();
            due += interval;
            produced += 1;
        }
        if due <= now {
            due = now + interval;
        }
        self.next_due = Some(due);
    }
}

struct SimNode {
    state: Mutex<SimState>,
    frame_ready: Condvar,
}

impl SimNode {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

type NodeList = Arc<RwLock<Vec<Arc<SimNode>>>>;

/// A simulated IEEE-1394 bus
#[derive(Clone, Default)]
pub struct SimBus {
    nodes: NodeList,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug a camera into the bus
    pub fn attach(&self, spec: SimCameraSpec) -> SimController {
        let id = spec.identity.id();
        info!(
            "Simulated camera attached: {} {} guid={:016x}",
            spec.identity.vendor, spec.identity.model, spec.identity.guid
        );
        let node = Arc::new(SimNode {
            state: Mutex::new(SimState::new(spec)),
            frame_ready: Condvar::new(),
        });
        self.nodes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(node.clone());
        SimController { node, id }
    }

    /// Controller of an already attached camera
    pub fn controller(&self, id: &CameraId) -> Option<SimController> {
        self.find(id).map(|node| SimController { node, id: *id })
    }

    fn find(&self, id: &CameraId) -> Option<Arc<SimNode>> {
        self.nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|n| n.lock().spec.identity.id() == *id)
            .cloned()
    }
}

impl Bus for SimBus {
    fn enumerate(&self) -> BusResult<Vec<CameraId>> {
        Ok(self
            .nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|n| n.lock().spec.identity.id())
            .collect())
    }

    fn open(&self, id: &CameraId) -> BusResult<Box<dyn Camera>> {
        let node = self.find(id).ok_or(BusError::CameraNotFound {
            guid: id.guid,
            unit: id.unit,
        })?;
        let identity = node.lock().spec.identity.clone();
        debug!("Opened simulated camera {:016x}", identity.guid);
        Ok(Box::new(SimCamera {
            node,
            nodes: self.nodes.clone(),
            identity,
        }))
    }
}

/// Camera handle on a [`SimBus`]
pub struct SimCamera {
    node: Arc<SimNode>,
    nodes: NodeList,
    identity: CameraIdentity,
}

impl SimCamera {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.node.lock()
    }

    /// Apply a register write to this camera and, while broadcast is on, to
    /// every camera on the same port.
    fn write_register<F>(&self, apply: F)
    where
        F: Fn(&mut SimState),
    {
        let broadcast = self.state().broadcast;
        if !broadcast {
            apply(&mut self.state());
            self.node.frame_ready.notify_all();
            return;
        }

        let peers: Vec<Arc<SimNode>> = self
            .nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|n| Arc::ptr_eq(n, &self.node) || n.lock().spec.identity.port == self.identity.port)
            .cloned()
            .collect();
        for peer in peers {
            apply(&mut peer.lock());
            peer.frame_ready.notify_all();
        }
    }

    fn require_trigger(state: &SimState) -> BusResult<&SimTrigger> {
        state.spec.trigger.as_ref().ok_or(BusError::NotSupported)
    }
}

impl Camera for SimCamera {
    fn identity(&self) -> &CameraIdentity {
        &self.identity
    }

    fn set_power(&mut self, on: bool) -> BusResult<()> {
        let mut st = self.state();
        if !on && st.faults.contains(&SimFault::PowerOff) {
            return Err(BusError::Io("power register write failed".to_string()));
        }
        st.powered = on;
        st.events.push(SimEvent::Power(on));
        Ok(())
    }

    fn reset(&mut self) -> BusResult<()> {
        let mut st = self.state();
        st.iso_speed = st.spec.iso_speed;
        st.events.push(SimEvent::Reset);
        Ok(())
    }

    fn info(&mut self) -> BusResult<String> {
        let st = self.state();
        let id = &st.spec.identity;
        let mut out = format!(
            "Vendor: {}\nModel: {}\nGUID: 0x{:016x}\nUnit: {}\nNode: {}:{}\nISO speed: {} Mbit/s\n",
            id.vendor,
            id.model,
            id.guid,
            id.unit,
            id.node,
            id.generation,
            st.iso_speed.megabits()
        );
        let mut features: Vec<_> = st.spec.features.iter().collect();
        features.sort_by_key(|(f, _)| f.code());
        for (feature, value) in features {
            out.push_str(&format!(
                "{:?}: {} [{}..{}] {:?}\n",
                feature, value.value, value.min, value.max, value.mode
            ));
        }
        Ok(out)
    }

    fn supported_modes(&mut self) -> BusResult<Vec<VideoMode>> {
        let st = self.state();
        let fixed = st.spec.fixed_modes.iter().map(|(m, _)| *m);
        let scalable = st.spec.format7_modes.iter().map(|m| VideoMode::Format7(m.index));
        Ok(fixed.chain(scalable).collect())
    }

    fn mode_color_coding(&mut self, mode: VideoMode) -> BusResult<ColorCoding> {
        match mode {
            VideoMode::Format7(_) => self.format7_color_coding(mode),
            other => other
                .fixed_geometry()
                .map(|(_, _, coding)| coding)
                .ok_or(BusError::NotSupported),
        }
    }

    fn mode_image_size(&mut self, mode: VideoMode) -> BusResult<(u32, u32)> {
        match mode {
            VideoMode::Format7(index) => {
                let st = self.state();
                st.format7_spec(mode)?;
                st.format7
                    .get(&index)
                    .map(|r| (r.width, r.height))
                    .ok_or(BusError::NotSupported)
            }
            other => other
                .fixed_geometry()
                .map(|(w, h, _)| (w, h))
                .ok_or(BusError::NotSupported),
        }
    }

    fn supported_framerates(&mut self, mode: VideoMode) -> BusResult<Vec<Framerate>> {
        let st = self.state();
        Ok(st
            .spec
            .fixed_modes
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, rates)| rates.clone())
            .unwrap_or_default())
    }

    fn format7_max_image_size(&mut self, mode: VideoMode) -> BusResult<(u32, u32)> {
        Ok(self.state().format7_spec(mode)?.max_size)
    }

    fn format7_set_image_position(&mut self, mode: VideoMode, left: u32, top: u32) -> BusResult<()> {
        let mut st = self.state();
        let f7 = st.format7_spec(mode)?.clone();
        let VideoMode::Format7(index) = mode else {
            return Err(BusError::NotSupported);
        };
        let regs = st.format7.get_mut(&index).ok_or(BusError::NotSupported)?;
        if left % f7.unit != 0
            || top % f7.unit != 0
            || left + regs.width > f7.max_size.0
            || top + regs.height > f7.max_size.1
        {
            return Err(BusError::OutOfRange);
        }
        regs.left = left;
        regs.top = top;
        Ok(())
    }

    fn format7_set_image_size(&mut self, mode: VideoMode, width: u32, height: u32) -> BusResult<()> {
        let mut st = self.state();
        let f7 = st.format7_spec(mode)?.clone();
        let VideoMode::Format7(index) = mode else {
            return Err(BusError::NotSupported);
        };
        let regs = st.format7.get_mut(&index).ok_or(BusError::NotSupported)?;
        if width == 0
            || height == 0
            || width % f7.unit != 0
            || height % f7.unit != 0
            || regs.left + width > f7.max_size.0
            || regs.top + height > f7.max_size.1
        {
            return Err(BusError::OutOfRange);
        }
        regs.width = width;
        regs.height = height;
        Ok(())
    }

    fn format7_packet_parameters(&mut self, mode: VideoMode) -> BusResult<(u32, u32)> {
        let st = self.state();
        let f7 = st.format7_spec(mode)?;
        Ok((f7.packet_unit, f7.packet_max))
    }

    fn format7_data_depth(&mut self, mode: VideoMode) -> BusResult<u32> {
        Ok(self.state().format7_spec(mode)?.color_coding.bits_per_pixel())
    }

    fn format7_color_coding(&mut self, mode: VideoMode) -> BusResult<ColorCoding> {
        Ok(self.state().format7_spec(mode)?.color_coding)
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
        let mut st = self.state();
        let f7 = st.format7_spec(mode)?.clone();
        if coding != f7.color_coding {
            return Err(BusError::InvalidArgument(format!(
                "{:?} not available in {:?}",
                coding, mode
            )));
        }
        if packet_size == 0 || packet_size % f7.packet_unit != 0 || packet_size > f7.packet_max {
            return Err(BusError::OutOfRange);
        }
        if left + width > f7.max_size.0 || top + height > f7.max_size.1 || width == 0 || height == 0 {
            return Err(BusError::OutOfRange);
        }

        let regs = Format7Registers {
            left,
            top,
            width,
            height,
            packet_size,
        };
        st.format7.insert(f7.index, regs);

        let bits = f64::from(width) * f64::from(height) * f64::from(coding.bits_per_pixel());
        let packets = (bits / (f64::from(packet_size) * 8.0)).ceil().max(1.0);
        if st.video_mode == Some(mode) {
            st.fps = 1.0 / (st.iso_speed.bus_period_secs() * packets);
        }
        st.events.push(SimEvent::Format7Roi {
            mode: f7.index,
            packet_size,
            left,
            top,
            width,
            height,
        });
        Ok(())
    }

    fn iso_speed(&mut self) -> BusResult<IsoSpeed> {
        Ok(self.state().iso_speed)
    }

    fn set_iso_speed(&mut self, speed: IsoSpeed) -> BusResult<()> {
        let mut st = self.state();
        st.iso_speed = speed;
        st.events.push(SimEvent::IsoSpeed(speed));
        Ok(())
    }

    fn set_video_mode(&mut self, mode: VideoMode) -> BusResult<()> {
        let supported = self.supported_modes()?;
        if !supported.contains(&mode) {
            return Err(BusError::InvalidArgument(format!("{:?} not supported", mode)));
        }
        let mut st = self.state();
        st.video_mode = Some(mode);
        st.events.push(SimEvent::VideoMode(mode));
        Ok(())
    }

    fn set_framerate(&mut self, rate: Framerate) -> BusResult<()> {
        let mut st = self.state();
        let mode = st
            .video_mode
            .ok_or_else(|| BusError::InvalidArgument("no video mode set".to_string()))?;
        let supported = st
            .spec
            .fixed_modes
            .iter()
            .any(|(m, rates)| *m == mode && rates.contains(&rate));
        if !supported {
            return Err(BusError::InvalidArgument(format!(
                "{:?} not supported in {:?}",
                rate, mode
            )));
        }
        st.fps = rate.as_f64();
        st.events.push(SimEvent::Framerate(rate));
        Ok(())
    }

    fn video_data_depth(&mut self) -> BusResult<u32> {
        Ok(self.state().current_format()?.data_depth)
    }

    fn bandwidth_usage(&mut self) -> BusResult<u32> {
        let st = self.state();
        let Some(mode) = st.video_mode else {
            return Ok(0);
        };
        let bytes_per_cycle = match mode {
            VideoMode::Format7(index) => st.format7.get(&index).map_or(0, |r| r.packet_size),
            _ => {
                let format = st.current_format()?;
                (format.image_bytes() as f64 * st.fps / 8000.0).ceil() as u32
            }
        };
        // Allocation units are S1600 quadlet times, plus packet overhead.
        let quadlets = bytes_per_cycle.div_ceil(4) + 3;
        let scale = (16u32 >> st.iso_speed.code()).max(1);
        Ok(quadlets * scale)
    }

    fn capture_setup(&mut self, buffers: u32) -> BusResult<()> {
        let mut st = self.state();
        if st.faults.contains(&SimFault::CaptureSetup) {
            return Err(BusError::Resources("no bandwidth".to_string()));
        }
        if st.ring.is_some() {
            return Err(BusError::CaptureRunning);
        }
        st.current_format()?;
        st.ring = Some(DmaRing::new(buffers as usize)?);
        st.next_due = None;
        st.events.push(SimEvent::CaptureSetup(buffers));
        Ok(())
    }

    fn capture_stop(&mut self) -> BusResult<()> {
        let mut st = self.state();
        let mut ring = st.ring.take().ok_or(BusError::CaptureNotSet)?;
        let lent = ring.reset();
        if lent > 0 {
            warn!("Capture stopped with {} frames still lent out", lent);
        }
        st.last_stats = Some(ring.stats());
        st.events.push(SimEvent::CaptureStop);
        drop(st);
        self.node.frame_ready.notify_all();
        Ok(())
    }

    fn set_transmission(&mut self, on: bool) -> BusResult<()> {
        if on && self.state().faults.contains(&SimFault::TransmissionStart) {
            return Err(BusError::Io("transmission register write failed".to_string()));
        }
        self.write_register(|st| {
            st.transmitting = on;
            st.next_due = None;
            st.events.push(SimEvent::Transmission(on));
        });
        Ok(())
    }

    fn set_broadcast(&mut self, on: bool) -> BusResult<()> {
        let mut st = self.state();
        if st.faults.contains(&SimFault::Broadcast) {
            return Err(BusError::Io("broadcast register write failed".to_string()));
        }
        st.broadcast = on;
        st.events.push(SimEvent::Broadcast(on));
        Ok(())
    }

    fn dequeue(&mut self, policy: DequeuePolicy) -> BusResult<Option<DmaFrame>> {
        let mut st = self.state();
        loop {
            if st.faults.contains(&SimFault::Dequeue) {
                return Err(BusError::Io("dequeue ioctl failed".to_string()));
            }
            if st.spec.free_run {
                st.catch_up(Instant::now());
            }

            let format = st.current_format()?;
            let ring = st.ring.as_mut().ok_or(BusError::CaptureNotSet)?;
            if let Some(frame) = ring.dequeue() {
                return Ok(Some(DmaFrame::from_vec(
                    frame.slot,
                    format,
                    frame.payload.data,
                    frame.payload.timestamp_us,
                    frame.frames_behind as u32,
                )));
            }

            match policy {
                DequeuePolicy::Poll => return Ok(None),
                DequeuePolicy::Wait => match (st.spec.free_run, st.next_due) {
                    (true, Some(due)) => {
                        let pause = due.saturating_duration_since(Instant::now());
                        drop(st);
                        std::thread::sleep(pause);
                        st = self.state();
                    }
                    _ => {
                        st = self
                            .node
                            .frame_ready
                            .wait(st)
                            .unwrap_or_else(|e| e.into_inner());
                    }
                },
            }
        }
    }

    fn enqueue(&mut self, frame: DmaFrame) -> BusResult<()> {
        let mut st = self.state();
        if st.faults.contains(&SimFault::Enqueue) {
            return Err(BusError::Io("enqueue ioctl failed".to_string()));
        }
        let (slot, data) = frame
            .into_vec()
            .ok_or_else(|| BusError::InvalidArgument("frame not owned by this bus".to_string()))?;
        let ring = st.ring.as_mut().ok_or(BusError::CaptureNotSet)?;
        ring.enqueue(
            slot,
            SimBuffer {
                data,
                timestamp_us: 0,
            },
        )?;
        Ok(())
    }

    fn feature_present(&mut self, feature: Feature) -> BusResult<bool> {
        let st = self.state();
        Ok(match feature {
            Feature::Trigger => st.spec.trigger.is_some(),
            other => st.spec.features.contains_key(&other),
        })
    }

    fn feature_value(&mut self, feature: Feature) -> BusResult<u32> {
        self.state()
            .spec
            .features
            .get(&feature)
            .map(|f| f.value)
            .ok_or(BusError::NotSupported)
    }

    fn set_feature_value(&mut self, feature: Feature, value: u32) -> BusResult<()> {
        let mut st = self.state();
        let entry = st.spec.features.get_mut(&feature).ok_or(BusError::NotSupported)?;
        if value < entry.min || value > entry.max {
            return Err(BusError::OutOfRange);
        }
        entry.value = value;
        Ok(())
    }

    fn feature_boundaries(&mut self, feature: Feature) -> BusResult<(u32, u32)> {
        self.state()
            .spec
            .features
            .get(&feature)
            .map(|f| (f.min, f.max))
            .ok_or(BusError::NotSupported)
    }

    fn set_feature_mode(&mut self, feature: Feature, mode: FeatureMode) -> BusResult<()> {
        let mut st = self.state();
        let entry = st.spec.features.get_mut(&feature).ok_or(BusError::NotSupported)?;
        entry.mode = mode;
        Ok(())
    }

    fn set_trigger_power(&mut self, on: bool) -> BusResult<()> {
        Self::require_trigger(&self.state())?;
        self.write_register(|st| {
            if st.spec.trigger.is_some() {
                st.trigger_power = on;
                st.events.push(SimEvent::TriggerPower(on));
            }
        });
        Ok(())
    }

    fn trigger_mode(&mut self) -> BusResult<TriggerMode> {
        Ok(Self::require_trigger(&self.state())?.mode)
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> BusResult<()> {
        let mut st = self.state();
        let trigger = st.spec.trigger.as_mut().ok_or(BusError::NotSupported)?;
        trigger.mode = mode;
        Ok(())
    }

    fn trigger_source(&mut self) -> BusResult<TriggerSource> {
        Ok(Self::require_trigger(&self.state())?.source)
    }

    fn set_trigger_source(&mut self, source: TriggerSource) -> BusResult<()> {
        let mut st = self.state();
        let trigger = st.spec.trigger.as_mut().ok_or(BusError::NotSupported)?;
        if !trigger.sources.contains(&source) {
            return Err(BusError::InvalidArgument(format!("{:?} not wired", source)));
        }
        trigger.source = source;
        Ok(())
    }

    fn supported_trigger_sources(&mut self) -> BusResult<Vec<TriggerSource>> {
        Ok(Self::require_trigger(&self.state())?.sources.clone())
    }

    fn trigger_has_polarity(&mut self) -> BusResult<bool> {
        Ok(Self::require_trigger(&self.state())?.polarity.is_some())
    }

    fn trigger_polarity(&mut self) -> BusResult<TriggerPolarity> {
        Self::require_trigger(&self.state())?
            .polarity
            .ok_or(BusError::NotSupported)
    }

    fn set_trigger_polarity(&mut self, polarity: TriggerPolarity) -> BusResult<()> {
        let mut st = self.state();
        let trigger = st.spec.trigger.as_mut().ok_or(BusError::NotSupported)?;
        if trigger.polarity.is_none() {
            return Err(BusError::NotSupported);
        }
        trigger.polarity = Some(polarity);
        Ok(())
    }
}

/// Test-side view of a simulated camera
#[derive(Clone)]
pub struct SimController {
    node: Arc<SimNode>,
    id: CameraId,
}

impl SimController {
    pub fn id(&self) -> CameraId {
        self.id
    }

    /// Deliver `count` frames into the DMA ring. Returns how many found a
    /// free slot; the rest count as overruns.
    pub fn inject_frames(&self, count: usize) -> usize {
        let mut st = self.node.lock();
        let accepted = (0..count).filter(|_| st.produce_frame()).count();
        drop(st);
        self.node.frame_ready.notify_all();
        accepted
    }

    /// Ring counters of the running capture, or of the last one
    pub fn ring_stats(&self) -> Option<RingStats> {
        let st = self.node.lock();
        st.ring.as_ref().map(|r| r.stats()).or(st.last_stats)
    }

    pub fn queued_frames(&self) -> usize {
        self.node.lock().ring.as_ref().map_or(0, |r| r.len())
    }

    /// Frames currently lent to software
    pub fn outstanding_frames(&self) -> usize {
        self.node.lock().ring.as_ref().map_or(0, |r| r.outstanding())
    }

    pub fn is_capturing(&self) -> bool {
        self.node.lock().ring.is_some()
    }

    pub fn is_transmitting(&self) -> bool {
        self.node.lock().transmitting
    }

    pub fn is_broadcasting(&self) -> bool {
        self.node.lock().broadcast
    }

    pub fn is_powered(&self) -> bool {
        self.node.lock().powered
    }

    pub fn trigger_power(&self) -> bool {
        self.node.lock().trigger_power
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.node.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.node.lock().events.clear();
    }

    pub fn inject_fault(&self, fault: SimFault) {
        self.node.lock().faults.insert(fault);
    }

    pub fn clear_fault(&self, fault: SimFault) {
        self.node.lock().faults.remove(&fault);
    }

    pub fn feature(&self, feature: Feature) -> Option<SimFeature> {
        self.node.lock().spec.features.get(&feature).copied()
    }

    pub fn format7_registers(&self, index: u8) -> Option<Format7Registers> {
        self.node.lock().format7.get(&index).copied()
    }

    pub fn trigger(&self) -> Option<SimTrigger> {
        self.node.lock().spec.trigger.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming_camera(bus: &SimBus, spec: SimCameraSpec) -> (Box<dyn Camera>, SimController) {
        let ctl = bus.attach(spec);
        let mut cam = bus.open(&ctl.id()).unwrap();
        cam.set_power(true).unwrap();
        let mode = cam.supported_modes().unwrap()[0];
        cam.set_video_mode(mode).unwrap();
        cam.capture_setup(4).unwrap();
        cam.set_transmission(true).unwrap();
        (cam, ctl)
    }

    #[test]
    fn test_enumerate_and_open() {
        let bus = SimBus::new();
        bus.attach(SimCameraSpec::fixed_color(1));
        bus.attach(SimCameraSpec::scalable_raw(2));

        let ids = bus.enumerate().unwrap();
        assert_eq!(ids.len(), 2);

        let cam = bus.open(&ids[1]).unwrap();
        assert_eq!(cam.identity().vendor, "Basler");
        assert!(bus.open(&CameraId { guid: 99, unit: 0 }).is_err());
    }

    #[test]
    fn test_injected_frames_flow_through_ring() {
        let bus = SimBus::new();
        let (mut cam, ctl) = streaming_camera(&bus, SimCameraSpec::fixed_color(1));

        assert_eq!(ctl.inject_frames(6), 4);
        let frame = cam.dequeue(DequeuePolicy::Poll).unwrap().unwrap();
        assert_eq!(frame.frames_behind, 3);
        assert_eq!(frame.image().len(), frame.format.image_bytes());

        cam.enqueue(frame).unwrap();
        let stats = ctl.ring_stats().unwrap();
        assert_eq!(stats.overruns, 2);
        assert_eq!(stats.dequeued, stats.enqueued);
    }

    #[test]
    fn test_poll_without_frames_returns_none() {
        let bus = SimBus::new();
        let (mut cam, _ctl) = streaming_camera(&bus, SimCameraSpec::fixed_color(1));
        assert!(cam.dequeue(DequeuePolicy::Poll).unwrap().is_none());
    }

    #[test]
    fn test_broadcast_reaches_cameras_on_same_port() {
        let bus = SimBus::new();
        let master = bus.attach(SimCameraSpec::fixed_color(1));
        let slave = bus.attach(SimCameraSpec::fixed_color(2));
        let other_port = bus.attach(SimCameraSpec::fixed_color(3).on_port(1));

        let mut cam = bus.open(&master.id()).unwrap();
        cam.set_broadcast(true).unwrap();
        cam.set_transmission(true).unwrap();

        assert!(master.is_transmitting());
        assert!(slave.is_transmitting());
        assert!(!other_port.is_transmitting());
    }

    #[test]
    fn test_format7_roi_bounds() {
        let bus = SimBus::new();
        let ctl = bus.attach(SimCameraSpec::scalable_raw(7));
        let mut cam = bus.open(&ctl.id()).unwrap();
        let mode = VideoMode::Format7(0);

        cam.format7_set_image_position(mode, 0, 0).unwrap();
        cam.format7_set_image_size(mode, 800, 600).unwrap();
        cam.format7_set_image_position(mode, 800, 600).unwrap();
        assert!(cam.format7_set_image_position(mode, 808, 600).is_err());
        assert!(cam.format7_set_image_size(mode, 1600, 1200).is_err());

        let regs = ctl.format7_registers(0).unwrap();
        assert_eq!((regs.left, regs.top, regs.width, regs.height), (800, 600, 800, 600));
    }

    #[test]
    fn test_free_running_camera_waits_for_frame() {
        let bus = SimBus::new();
        let (mut cam, _ctl) =
            streaming_camera(&bus, SimCameraSpec::fixed_color(1).free_running());
        cam.set_framerate(Framerate::F60).unwrap();
        let frame = cam.dequeue(DequeuePolicy::Wait).unwrap().unwrap();
        assert!(frame.timestamp_us > 0);
        cam.enqueue(frame).unwrap();
    }

    #[test]
    fn test_sixteen_bit_frames_respect_sensor_depth() {
        let bus = SimBus::new();
        let ctl = bus.attach(SimCameraSpec::scalable_raw(5));
        let mut cam = bus.open(&ctl.id()).unwrap();
        cam.set_power(true).unwrap();
        cam.set_video_mode(VideoMode::Format7(2)).unwrap();
        cam.format7_set_roi(VideoMode::Format7(2), ColorCoding::Mono16, 4096, 0, 0, 64, 64)
            .unwrap();
        cam.capture_setup(2).unwrap();
        cam.set_transmission(true).unwrap();
        assert_eq!(cam.video_data_depth().unwrap(), 12);

        ctl.inject_frames(1);
        let frame = cam.dequeue(DequeuePolicy::Poll).unwrap().unwrap();
        let max = frame
            .image()
            .chunks_exact(2)
            .map(|w| u16::from_ne_bytes([w[0], w[1]]))
            .max()
            .unwrap();
        assert!(max < 4096);
        cam.enqueue(frame).unwrap();
    }
}
