//! Capture device
//!
//! One open camera with its settings and, while streaming, its session.
//! All hardware access goes through [`DeviceCore`] behind the device mutex;
//! the acquisition thread takes the same lock for each frame. The lock is
//! never held while waiting for a frame, and a fetched frame only keeps its
//! DMA slot, so a soft-sync master can start slaves that have consumers
//! waiting on them.
//!
//! Start programs the negotiated mode, allocates the DMA ring and starts
//! transmission. Sync roles change who switches transmission: bus-sync
//! masters wrap their commands in a broadcast window, non-hw slaves leave
//! transmission to their master, soft-sync masters start their slaves
//! themselves and hw sync gates frames on the external trigger input.

use frame_processor::{shift_to_msb, ConversionPlan, Converter};
use iidc_bus::{BusError, Camera, CameraIdentity, DequeuePolicy, DmaFrame, Feature};
use mode_negotiator::{negotiate, FrameRate, NegotiatedMode, NegotiationRequest, Roi};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::acquisition::{Step, Worker};
use crate::clock;
use crate::config::EngineConfig;
use crate::error::CaptureError;
use crate::frame::{Fetch, FrameInfo, FrameRef, Snapshot, WaitPolicy};
use crate::handle::CaptureHandle;
use crate::params::{ParamReply, Parameter};
use crate::recording::{MovieSink, MovieWriter, RecordingFlags, RecordingTarget, SinkFormat};
use crate::settings::DeviceSettings;
use crate::stats::CaptureStats;
use crate::sync::SyncMode;

/// Capture session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    /// Mode programmed, transport not yet running
    Configured,
    Streaming,
}

/// How to start a stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    pub rate: FrameRate,
    /// Deliver only the most recent frame, discarding older ones
    pub drop_frames: bool,
    /// Process-clock time to start transmission at
    pub start_at: Option<f64>,
}

impl Default for StartRequest {
    fn default() -> Self {
        Self {
            rate: FrameRate::Hz(30.0),
            drop_frames: false,
            start_at: None,
        }
    }
}

impl StartRequest {
    pub fn at_rate(hz: f64) -> Self {
        Self {
            rate: FrameRate::Hz(hz),
            ..Default::default()
        }
    }

    pub fn fastest() -> Self {
        Self {
            rate: FrameRate::Fastest,
            ..Default::default()
        }
    }

    pub fn dropping_frames(mut self) -> Self {
        self.drop_frames = true;
        self
    }
}

/// What a successful start produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartOutcome {
    /// Rate the camera runs at
    pub fps: f64,
    /// `fps` rounded to the nearest integer
    pub fps_rounded: u32,
    /// Process-clock time transmission started
    pub started_at: f64,
    pub mode: NegotiatedMode,
}

/// Snapshot of a device's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub state: SessionState,
    pub sync: SyncMode,
    /// Negotiated rate of the current or last stream
    pub fps: f64,
    pub roi: Option<Roi>,
    pub stats: CaptureStats,
    /// Error that stopped the acquisition thread
    pub last_error: Option<String>,
}

/// Resources of a running stream
pub(crate) struct Session {
    pub mode: NegotiatedMode,
    pub data_depth: u32,
    pub drop_frames: bool,
    pub converter: Converter,
    pub sink: Option<Box<dyn MovieSink>>,
    shifted: Vec<u8>,
}

impl Session {
    /// Pixels delivered for `frame` after conversion
    pub fn pixels<'a>(&'a self, frame: &'a DmaFrame) -> &'a [u8] {
        match self.converter.plan() {
            ConversionPlan::Passthrough => frame.image(),
            _ => self.converter.output(),
        }
    }

    /// Move converted pixels out for a lent frame; `None` when the frame's
    /// own buffer is delivered
    fn lease_pixels(&mut self) -> Option<Vec<u8>> {
        match self.converter.plan() {
            ConversionPlan::Passthrough => None,
            _ => Some(self.converter.take_output()),
        }
    }

    fn info(&self, frame: &DmaFrame, pts: f64, dropped: u32) -> FrameInfo {
        FrameInfo {
            width: frame.format.width,
            height: frame.format.height,
            layers: self.mode.actual_layers,
            data_depth: self.data_depth,
            pts,
            dropped,
        }
    }

    fn convert(&mut self, frame: &DmaFrame) -> Result<(), CaptureError> {
        self.converter.process(&frame.format, frame.image())?;
        Ok(())
    }

    /// Hand the converted frame to the movie sink, if recording
    fn record(&mut self, frame: &DmaFrame) -> Result<(), CaptureError> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let format = SinkFormat {
            width: frame.format.width,
            height: frame.format.height,
            channels: self.mode.actual_layers,
            bits_per_channel: if self.data_depth > 8 { 16 } else { 8 },
        };
        let pixels = match self.converter.plan() {
            ConversionPlan::Passthrough => frame.image(),
            _ => self.converter.output(),
        };
        if (9..16).contains(&self.data_depth) {
            shift_to_msb(pixels, self.data_depth, &mut self.shifted);
            sink.push(&format, &self.shifted)?;
        } else {
            sink.push(&format, pixels)?;
        }
        Ok(())
    }
}

/// Hardware-facing state of one device, guarded by the device mutex
pub(crate) struct DeviceCore {
    pub camera: Box<dyn Camera>,
    pub state: SessionState,
    pub settings: DeviceSettings,
    pub session: Option<Session>,
    pub stats: CaptureStats,
    /// Mode of the current or last stream
    pub negotiated: Option<NegotiatedMode>,
    pub last_error: Option<String>,
    /// Frames fetched synchronously and not yet released
    lent: usize,
    writer: Arc<dyn MovieWriter>,
    label: String,
}

impl DeviceCore {
    pub(crate) fn new(
        camera: Box<dyn Camera>,
        settings: DeviceSettings,
        writer: Arc<dyn MovieWriter>,
    ) -> Self {
        let label = format!("{:016x}", camera.identity().guid);
        Self {
            camera,
            state: SessionState::Idle,
            settings,
            session: None,
            stats: CaptureStats::default(),
            negotiated: None,
            last_error: None,
            lent: 0,
            writer,
            label,
        }
    }

    /// Take back a frame lent by a synchronous fetch
    pub(crate) fn reclaim(
        &mut self,
        frame: DmaFrame,
        converted: Option<Vec<u8>>,
    ) -> Result<(), CaptureError> {
        self.lent = self.lent.saturating_sub(1);
        if let (Some(session), Some(buffer)) = (self.session.as_mut(), converted) {
            session.converter.recycle(buffer);
        }
        self.camera.enqueue(frame)?;
        Ok(())
    }

    fn start(
        &mut self,
        req: &StartRequest,
        peers: &[Arc<CaptureDevice>],
    ) -> Result<StartOutcome, CaptureError> {
        if self.state != SessionState::Idle {
            return Err(CaptureError::AlreadyStarted);
        }
        if let FrameRate::Hz(hz) = req.rate {
            if !hz.is_finite() || hz <= 0.0 {
                return Err(CaptureError::InvalidRate(hz));
            }
        }
        if let Some(deadline) = req.start_at {
            if clock::remaining_until(deadline).is_none() {
                return Err(CaptureError::InvalidParameter(format!(
                    "start time {} is out of range",
                    deadline
                )));
            }
        }
        if self.settings.layers == 5 && self.settings.recording.is_some() {
            return Err(CaptureError::Recording(
                "YUV passthrough frames can't be recorded".to_string(),
            ));
        }

        self.stats = CaptureStats::default();
        self.last_error = None;

        let request: NegotiationRequest = self.settings.negotiation_request(req.rate);
        let mode = negotiate(self.camera.as_mut(), &request)?;
        self.program(&mode)?;
        self.negotiated = Some(mode.clone());
        self.state = SessionState::Configured;

        if let Err(err) = self.camera.capture_setup(self.settings.buffer_count) {
            error!(
                "Unable to set up capture with {} DMA buffers: {}",
                self.settings.buffer_count, err
            );
            self.state = SessionState::Idle;
            return Err(err.into());
        }

        match self.begin_streaming(req, mode, peers) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!("Capture start failed, tearing down: {}", err);
                self.abort(peers);
                Err(err)
            }
        }
    }

    /// Write bus speed, mode and rate or scalable geometry
    fn program(&mut self, mode: &NegotiatedMode) -> Result<(), CaptureError> {
        self.camera.set_iso_speed(mode.iso_speed)?;
        self.camera.set_video_mode(mode.mode)?;
        if let Some(rate) = mode.framerate {
            self.camera.set_framerate(rate)?;
        }
        if let Some(packet_size) = mode.packet_size {
            let roi = mode.roi;
            self.camera.format7_set_roi(
                mode.mode,
                mode.color_coding,
                packet_size,
                roi.left,
                roi.top,
                roi.width,
                roi.height,
            )?;
        }
        debug!(
            "Programmed {:?} {:?} {}x{} at {:.3} fps, {} Mbit/s",
            mode.mode,
            mode.color_coding,
            mode.roi.width,
            mode.roi.height,
            mode.fps,
            mode.iso_speed.megabits()
        );
        Ok(())
    }

    fn begin_streaming(
        &mut self,
        req: &StartRequest,
        mode: NegotiatedMode,
        peers: &[Arc<CaptureDevice>],
    ) -> Result<StartOutcome, CaptureError> {
        if let Some(deadline) = req.start_at {
            if !clock::wait_until(deadline) {
                warn!("Start time {} out of range, starting now", deadline);
            }
        }
        let started_at = self.begin_transport(peers)?;

        let data_depth = match self.camera.video_data_depth() {
            Ok(depth) => depth,
            Err(err) => {
                warn!(
                    "Could not query data depth, assuming {} bits: {}",
                    self.settings.bitdepth, err
                );
                self.settings.bitdepth
            }
        };

        let plan = if self.settings.layers == 5 {
            ConversionPlan::Passthrough
        } else {
            ConversionPlan::for_output(mode.color_coding, mode.actual_layers)
        };
        let mut converter = Converter::new(plan);
        converter.set_method(self.settings.debayer);
        converter.set_filter_override(self.settings.bayer_override);

        let sink = match &self.settings.recording {
            Some(target) => {
                let format = SinkFormat {
                    width: mode.roi.width,
                    height: mode.roi.height,
                    channels: mode.actual_layers,
                    bits_per_channel: if data_depth > 8 { 16 } else { 8 },
                };
                Some(self.writer.create(target, format, mode.fps)?)
            }
            None => None,
        };

        let fps = mode.fps;
        info!(
            "Capture started on {} {}: {}x{} {:?}, {} layers, {} bits, {:.3} fps",
            self.camera.identity().vendor,
            self.camera.identity().model,
            mode.roi.width,
            mode.roi.height,
            mode.color_coding,
            mode.actual_layers,
            data_depth,
            fps
        );

        self.session = Some(Session {
            mode: mode.clone(),
            data_depth,
            drop_frames: req.drop_frames,
            converter,
            sink,
            shifted: Vec::new(),
        });
        self.state = SessionState::Streaming;

        Ok(StartOutcome {
            fps,
            fps_rounded: (fps + 0.5) as u32,
            started_at,
            mode,
        })
    }

    /// Start transmission according to the sync role. Returns the start time.
    fn begin_transport(&mut self, peers: &[Arc<CaptureDevice>]) -> Result<f64, CaptureError> {
        let sync = self.settings.sync;
        if sync.controls_broadcast() {
            self.camera.set_broadcast(true)?;
        }

        let started = self.transmission_on(sync, peers);
        let started_at = clock::now_secs();

        if sync.controls_broadcast() {
            let closed = self.camera.set_broadcast(false);
            started?;
            closed?;
        } else {
            started?;
        }
        Ok(started_at)
    }

    fn transmission_on(
        &mut self,
        sync: SyncMode,
        peers: &[Arc<CaptureDevice>],
    ) -> Result<(), CaptureError> {
        if !sync.drives_transmission() {
            debug!("Slave device waits for its master to start transmission");
            return Ok(());
        }
        if sync.is_hw() {
            self.camera.set_trigger_power(false)?;
            if sync.is_slave() {
                self.camera.set_trigger_power(true)?;
            }
        }
        self.camera.set_transmission(true)?;

        if sync.is_soft_master() {
            for peer in peers {
                peer.lock_core().camera.set_transmission(true)?;
                debug!("Soft-sync slave {} started", peer.handle());
            }
        }
        Ok(())
    }

    /// Stop transmission according to the sync role
    fn end_transport(&mut self, peers: &[Arc<CaptureDevice>]) -> Result<(), CaptureError> {
        let sync = self.settings.sync;
        if sync.controls_broadcast() {
            self.camera.set_broadcast(true)?;
        }

        let stopped = self.transmission_off(sync, peers);

        if sync.controls_broadcast() {
            let closed = self.camera.set_broadcast(false);
            stopped?;
            closed?;
        } else {
            stopped?;
        }
        Ok(())
    }

    fn transmission_off(
        &mut self,
        sync: SyncMode,
        peers: &[Arc<CaptureDevice>],
    ) -> Result<(), CaptureError> {
        if !sync.drives_transmission() {
            return Ok(());
        }
        self.camera.set_transmission(false)?;
        if sync.is_soft_master() {
            for peer in peers {
                peer.lock_core().camera.set_transmission(false)?;
                debug!("Soft-sync slave {} stopped", peer.handle());
            }
        }
        if sync.is_hw() {
            self.camera.set_trigger_power(false)?;
        }
        Ok(())
    }

    /// Best-effort teardown after a failed start
    fn abort(&mut self, peers: &[Arc<CaptureDevice>]) {
        if let Err(err) = self.end_transport(peers) {
            warn!("Stopping transmission after failed start: {}", err);
        }
        if let Err(err) = self.camera.capture_stop() {
            warn!("Releasing DMA buffers after failed start: {}", err);
        }
        self.session = None;
        self.state = SessionState::Idle;
    }

    fn stop(&mut self, peers: &[Arc<CaptureDevice>]) -> Result<u64, CaptureError> {
        if self.state != SessionState::Streaming {
            return Ok(0);
        }
        if self.lent > 0 {
            return Err(CaptureError::FrameHeld(self.lent));
        }

        let mut failure: Option<CaptureError> = None;
        if let Err(err) = self.end_transport(peers) {
            error!("Unable to stop transmission: {}", err);
            failure.get_or_insert(err);
        }
        if let Err(err) = self.camera.capture_stop() {
            error!("Unable to release DMA buffers: {}", err);
            failure.get_or_insert(err.into());
        }

        if let Some(mut session) = self.session.take() {
            if let Some(mut sink) = session.sink.take() {
                match sink.finish() {
                    Ok(frames) => debug!("Movie finalized with {} frames", frames),
                    Err(err) => {
                        error!("Failed to finalize movie: {}", err);
                        failure.get_or_insert(err.into());
                    }
                }
            }
        }
        self.state = SessionState::Idle;

        info!(
            "Capture stopped on {} {}: {} frames captured, {} dropped",
            self.camera.identity().vendor,
            self.camera.identity().model,
            self.stats.frames,
            self.stats.dropped
        );

        match failure {
            Some(err) => Err(err),
            None => Ok(self.stats.dropped),
        }
    }

    /// Return a frame after a failed step, keeping the buffer accounting straight
    fn give_back(&mut self, frame: DmaFrame) {
        if let Err(err) = self.camera.enqueue(frame) {
            warn!("Failed to return frame buffer to the transport: {}", err);
        }
    }

    /// Synchronous fetch: dequeue, drain under frame dropping, convert and
    /// record. The returned frame is still lent by the transport.
    fn pull(&mut self) -> Result<Option<LentFrame>, CaptureError> {
        let Some(mut frame) = self.camera.dequeue(DequeuePolicy::Poll)? else {
            return Ok(None);
        };
        let drop_frames = self.session.as_ref().is_some_and(|s| s.drop_frames);

        let behind = frame.frames_behind;
        if drop_frames {
            while frame.frames_behind > 0 {
                self.camera.enqueue(frame)?;
                self.stats.frame_taken(&self.label);
                frame = self.camera.dequeue(DequeuePolicy::Poll)?.ok_or_else(|| {
                    BusError::Io("queued frame vanished while dropping".to_string())
                })?;
            }
            self.stats.frames_dropped(&self.label, behind);
            self.stats.set_backlog(&self.label, 0);
        } else {
            self.stats.set_backlog(&self.label, behind);
        }
        self.stats.frame_taken(&self.label);
        let pts = clock::frame_pts(frame.timestamp_us);
        self.stats.last_pts = pts;

        let Some(session) = self.session.as_mut() else {
            self.give_back(frame);
            return Ok(None);
        };
        let processed = session.convert(&frame).and_then(|()| session.record(&frame));
        let info = session.info(&frame, pts, behind);
        if let Err(err) = processed {
            self.give_back(frame);
            return Err(err);
        }
        let converted = session.lease_pixels();
        self.lent += 1;
        Ok(Some(LentFrame {
            frame,
            converted,
            info,
        }))
    }

    fn idle_sleep(&self, config: &EngineConfig) -> Duration {
        config.idle_sleep(self.session.as_ref().is_some_and(|s| s.drop_frames))
    }

    /// One acquisition thread cycle
    pub(crate) fn acquire(&mut self, deliver: bool) -> Result<Step, CaptureError> {
        if self.state != SessionState::Streaming {
            return Ok(Step::Idle);
        }
        let Some(frame) = self.camera.dequeue(DequeuePolicy::Poll)? else {
            return Ok(Step::Idle);
        };
        let behind = frame.frames_behind;
        self.stats.frame_taken(&self.label);
        self.stats.set_backlog(&self.label, behind);
        let pts = clock::frame_pts(frame.timestamp_us);
        self.stats.last_pts = pts;

        let Some(session) = self.session.as_mut() else {
            self.give_back(frame);
            return Ok(Step::Idle);
        };
        if let Err(err) = session.convert(&frame).and_then(|()| session.record(&frame)) {
            self.give_back(frame);
            return Err(err);
        }
        let snapshot = deliver.then(|| Snapshot {
            data: session.pixels(&frame).to_vec(),
            info: session.info(&frame, pts, behind),
        });
        self.camera.enqueue(frame)?;
        Ok(Step::Captured(snapshot))
    }

    pub(crate) fn superseded(&mut self) {
        self.stats.frames_dropped(&self.label, 1);
    }

    fn apply(&mut self, param: Parameter, value: Option<f64>) -> Result<ParamReply, CaptureError> {
        let reply = crate::params::apply(self, param, value)?;
        if let Some(session) = self.session.as_mut() {
            session.converter.set_method(self.settings.debayer);
            session.converter.set_filter_override(self.settings.bayer_override);
        }
        Ok(reply)
    }
}

/// A frame taken by a synchronous fetch
pub(crate) struct LentFrame {
    pub frame: DmaFrame,
    /// Converted pixels, when conversion is not a passthrough
    pub converted: Option<Vec<u8>>,
    pub info: FrameInfo,
}

/// An open capture device
pub struct CaptureDevice {
    handle: CaptureHandle,
    identity: CameraIdentity,
    core: Arc<Mutex<DeviceCore>>,
    worker: Mutex<Option<Worker>>,
    sync_bits: AtomicU32,
    streaming: AtomicBool,
    config: EngineConfig,
}

impl CaptureDevice {
    pub(crate) fn new(handle: CaptureHandle, core: DeviceCore, config: EngineConfig) -> Self {
        let identity = core.camera.identity().clone();
        let sync_bits = AtomicU32::new(core.settings.sync.bits());
        Self {
            handle,
            identity,
            core: Arc::new(Mutex::new(core)),
            worker: Mutex::new(None),
            sync_bits,
            streaming: AtomicBool::new(false),
            config,
        }
    }

    pub fn handle(&self) -> CaptureHandle {
        self.handle
    }

    pub fn identity(&self) -> &CameraIdentity {
        &self.identity
    }

    pub fn sync_mode(&self) -> SyncMode {
        SyncMode::from_bits(self.sync_bits.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Streaming with the DMA ring allocated
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn status(&self) -> DeviceStatus {
        let core = self.lock_core();
        DeviceStatus {
            state: core.state,
            sync: core.settings.sync,
            fps: core.negotiated.as_ref().map_or(0.0, |m| m.fps),
            roi: core.negotiated.as_ref().map(|m| m.roi).or(core.settings.roi),
            stats: core.stats,
            last_error: core.last_error.clone(),
        }
    }

    pub fn recording_flags(&self) -> RecordingFlags {
        self.lock_core().settings.flags
    }

    pub fn recording_target(&self) -> Option<RecordingTarget> {
        self.lock_core().settings.recording.clone()
    }

    pub(crate) fn lock_core(&self) -> MutexGuard<'_, DeviceCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn start(
        &self,
        req: &StartRequest,
        peers: &[Arc<CaptureDevice>],
    ) -> Result<StartOutcome, CaptureError> {
        let mut core = self.lock_core();
        let outcome = core.start(req, peers)?;
        let flags = core.settings.flags;
        drop(core);
        self.streaming.store(true, Ordering::Release);

        if flags.is_async() {
            let worker = Worker::spawn(
                format!("iidc-capture-{}", self.handle.index()),
                self.core.clone(),
                self.config.idle_sleep(req.drop_frames),
                self.config.delivery_capacity(req.drop_frames),
                req.drop_frames,
                flags.delivers_live(),
            );
            match worker {
                Ok(worker) => *self.lock_worker() = Some(worker),
                Err(err) => {
                    error!("Capture start failed: {}", err);
                    if let Err(stop_err) = self.stop(peers) {
                        warn!("Teardown after failed start: {}", stop_err);
                    }
                    return Err(err);
                }
            }
        }
        Ok(outcome)
    }

    /// Join the acquisition thread, then tear the stream down. Returns the
    /// frames dropped since start. Fails while a fetched frame is held.
    pub(crate) fn stop(&self, peers: &[Arc<CaptureDevice>]) -> Result<u64, CaptureError> {
        // Cleared first so consumers woken by the closing channel see Stopped
        self.streaming.store(false, Ordering::Release);
        let worker = self.lock_worker().take();
        if let Some(worker) = worker {
            worker.shutdown();
        }
        let mut core = self.lock_core();
        let result = core.stop(peers);
        if matches!(result, Err(CaptureError::FrameHeld(_))) {
            self.streaming
                .store(core.state == SessionState::Streaming, Ordering::Release);
        }
        result
    }

    /// Fetch the next frame
    pub fn fetch(&self, wait: WaitPolicy) -> Result<Fetch<'_>, CaptureError> {
        let delivery = self.lock_worker().as_ref().map(|w| w.frames());
        if let Some(frames) = delivery {
            let received = match wait {
                WaitPolicy::Poll => frames.try_recv().ok(),
                WaitPolicy::Block => frames.recv().ok(),
            };
            return Ok(match received {
                Some(snapshot) => Fetch::Ready(FrameRef::snapshot(snapshot)),
                None if self.is_streaming() => Fetch::NotReady,
                None => Fetch::Stopped,
            });
        }

        // Blocking polls with the lock released between attempts
        loop {
            let mut core = self.lock_core();
            if core.state != SessionState::Streaming {
                return Ok(Fetch::Stopped);
            }
            if core.settings.flags.is_async() {
                return Ok(Fetch::NotReady);
            }
            if let Some(lent) = core.pull()? {
                return Ok(Fetch::Ready(FrameRef::lent(&self.core, lent)));
            }
            let idle = core.idle_sleep(&self.config);
            drop(core);
            match wait {
                WaitPolicy::Poll => return Ok(Fetch::NotReady),
                WaitPolicy::Block => std::thread::sleep(idle),
            }
        }
    }

    pub(crate) fn set_parameter(
        &self,
        name: &str,
        value: Option<f64>,
    ) -> Result<ParamReply, CaptureError> {
        let Some(param) = Parameter::parse(name) else {
            warn!("Unknown capture parameter '{}' ignored", name);
            return Ok(ParamReply::Unsupported);
        };
        let mut core = self.lock_core();
        let reply = core.apply(param, value)?;
        self.sync_bits.store(core.settings.sync.bits(), Ordering::Release);
        Ok(reply)
    }

    /// Switch the camera off; failure only warns
    pub(crate) fn power_down(&self) {
        let mut core = self.lock_core();
        if let Err(err) = core.camera.set_power(false) {
            warn!(
                "Failed to power down {} {}: {}",
                self.identity.vendor, self.identity.model, err
            );
        }
    }

    /// Whether the camera reports an external trigger input
    pub fn has_trigger(&self) -> bool {
        self.lock_core()
            .camera
            .feature_present(Feature::Trigger)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureDevice")
            .field("handle", &self.handle)
            .field("vendor", &self.identity.vendor)
            .field("model", &self.identity.model)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}
