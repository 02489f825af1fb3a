//! Capture engine
//!
//! Owns the bus and the table of open devices. Every call addresses a
//! device by handle; the table lock is only held for lookup, insertion and
//! removal, never across camera I/O.

use iidc_bus::{Bus, CameraId};
use mode_negotiator::Roi;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::device::{CaptureDevice, DeviceCore, StartOutcome, StartRequest};
use crate::error::CaptureError;
use crate::handle::{CaptureHandle, SlotTable};
use crate::params::ParamReply;
use crate::recording::{MovieWriter, RawFileWriter, RecordingFlags, RecordingTarget};
use crate::settings::DeviceSettings;

/// Device class reported by enumeration
pub const DEVICE_CLASS: &str = "1394-IIDC";

/// A camera found on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub guid: u64,
    pub unit: u32,
    pub vendor: String,
    pub model: String,
    /// `'vendor':'model'`
    pub name: String,
    /// `node:generation` in hex, empty if the camera could not be opened
    pub address: String,
    pub port: u32,
    pub class_name: String,
}

/// Which camera to open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSelector {
    #[default]
    First,
    /// Position in enumeration order
    Index(usize),
}

/// How to open a camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub device: DeviceSelector,
    /// `None` or a 1x1 rectangle at the origin lets negotiation choose
    pub roi: Option<Roi>,
    /// 0 = native, 1..=4 channels, 5 = YUV passthrough
    pub layers: u32,
    pub buffer_count: Option<u32>,
    pub bit_depth: u32,
    /// `file[:CodecType=name][:CodecSettings=spec]`
    pub recording: Option<String>,
    pub recording_flags: RecordingFlags,
}

impl Default for OpenRequest {
    fn default() -> Self {
        Self {
            device: DeviceSelector::First,
            roi: None,
            layers: 0,
            buffer_count: None,
            bit_depth: 8,
            recording: None,
            recording_flags: RecordingFlags::default(),
        }
    }
}

impl OpenRequest {
    pub fn index(index: usize) -> Self {
        Self {
            device: DeviceSelector::Index(index),
            ..Default::default()
        }
    }

    pub fn with_roi(mut self, roi: Roi) -> Self {
        self.roi = Some(roi);
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_bit_depth(mut self, bit_depth: u32) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    pub fn with_buffers(mut self, count: u32) -> Self {
        self.buffer_count = Some(count);
        self
    }

    pub fn with_recording(mut self, target: &str, flags: u32) -> Self {
        self.recording = Some(target.to_string());
        self.recording_flags = RecordingFlags::from_bits(flags);
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.recording_flags = RecordingFlags::from_bits(flags);
        self
    }
}

/// Multi-camera capture engine
pub struct CaptureEngine {
    bus: Box<dyn Bus>,
    config: EngineConfig,
    writer: Arc<dyn MovieWriter>,
    devices: RwLock<SlotTable<CaptureDevice>>,
}

impl CaptureEngine {
    pub fn new<B: Bus + 'static>(bus: B, config: EngineConfig) -> Self {
        let devices = RwLock::new(SlotTable::new(config.max_devices));
        Self {
            bus: Box::new(bus),
            config,
            writer: Arc::new(RawFileWriter),
            devices,
        }
    }

    /// Use `writer` for recordings instead of raw dumps
    pub fn with_writer(mut self, writer: Arc<dyn MovieWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn table(&self) -> RwLockReadGuard<'_, SlotTable<CaptureDevice>> {
        self.devices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn table_mut(&self) -> RwLockWriteGuard<'_, SlotTable<CaptureDevice>> {
        self.devices.write().unwrap_or_else(|e| e.into_inner())
    }

    /// List the cameras on the bus
    pub fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        let ids = self.bus.enumerate()?;
        Ok(ids
            .iter()
            .enumerate()
            .map(|(index, id)| self.describe(index, id))
            .collect())
    }

    fn describe(&self, index: usize, id: &CameraId) -> DeviceInfo {
        match self.bus.open(id) {
            Ok(camera) => {
                let identity = camera.identity();
                DeviceInfo {
                    index,
                    guid: id.guid,
                    unit: id.unit,
                    vendor: identity.vendor.clone(),
                    model: identity.model.clone(),
                    name: format!("'{}':'{}'", identity.vendor, identity.model),
                    address: format!("{:x}:{:x}", identity.node, identity.generation),
                    port: identity.port,
                    class_name: DEVICE_CLASS.to_string(),
                }
            }
            Err(err) => {
                warn!("Could not open camera {:016x} for enumeration: {}", id.guid, err);
                DeviceInfo {
                    index,
                    guid: id.guid,
                    unit: id.unit,
                    vendor: "UNKNOWN".to_string(),
                    model: "UNKNOWN".to_string(),
                    name: "'UNKNOWN':'UNKNOWN'".to_string(),
                    address: String::new(),
                    port: 0,
                    class_name: DEVICE_CLASS.to_string(),
                }
            }
        }
    }

    /// Open a camera, power it up and reset it
    pub fn open(&self, req: OpenRequest) -> Result<CaptureHandle, CaptureError> {
        {
            let table = self.table();
            if table.len() >= table.limit() {
                return Err(CaptureError::TooManyDevices(table.limit()));
            }
        }

        let recording = req
            .recording
            .as_deref()
            .map(RecordingTarget::parse)
            .transpose()?;
        let mut flags = req.recording_flags;
        if flags.contains(RecordingFlags::AUDIO) {
            warn!("Sound recording is not supported, recording video only");
            flags = flags.without(RecordingFlags::AUDIO);
        }

        let ids = self.bus.enumerate()?;
        if ids.is_empty() {
            return Err(CaptureError::NoCameras);
        }
        let index = match req.device {
            DeviceSelector::First => 0,
            DeviceSelector::Index(index) => index,
        };
        let id = ids.get(index).ok_or(CaptureError::DeviceIndexOutOfRange {
            index,
            count: ids.len(),
        })?;

        let mut camera = self.bus.open(id)?;
        if let Err(err) = camera.set_power(true) {
            warn!("Failed to power up camera {:016x}: {}", id.guid, err);
        }
        if let Err(err) = camera.reset() {
            warn!("Failed to reset camera {:016x}: {}", id.guid, err);
        }

        let settings = DeviceSettings {
            roi: req.roi.filter(|roi| *roi != Roi::new(0, 0, 1, 1)),
            layers: req.layers,
            bitdepth: if req.bit_depth <= 8 { 8 } else { 16 },
            buffer_count: req
                .buffer_count
                .filter(|&n| n > 0)
                .unwrap_or(self.config.buffer_count),
            recording,
            flags,
            ..Default::default()
        };
        let vendor = camera.identity().vendor.clone();
        let model = camera.identity().model.clone();
        let core = DeviceCore::new(camera, settings, self.writer.clone());

        let limit = self.config.max_devices;
        let config = self.config.clone();
        let (handle, _) = self
            .table_mut()
            .insert_with(|handle| CaptureDevice::new(handle, core, config))
            .ok_or(CaptureError::TooManyDevices(limit))?;

        info!("Opened camera {} {} as device {}", vendor, model, handle);
        Ok(handle)
    }

    /// Look up an open device
    pub fn device(&self, handle: CaptureHandle) -> Result<Arc<CaptureDevice>, CaptureError> {
        self.table()
            .get(handle)
            .ok_or(CaptureError::InvalidHandle(handle))
    }

    /// Handles of all open devices
    pub fn open_devices(&self) -> Vec<CaptureHandle> {
        self.table().handles()
    }

    /// Soft-sync slaves a device starts and stops, if it is a soft-sync master
    fn soft_slaves(&self, device: &CaptureDevice) -> Vec<Arc<CaptureDevice>> {
        if !device.sync_mode().is_soft_master() {
            return Vec::new();
        }
        self.table()
            .entries()
            .into_iter()
            .filter(|peer| {
                peer.handle() != device.handle()
                    && peer.identity().port == device.identity().port
                    && peer.sync_mode().is_soft_slave()
            })
            .collect()
    }

    /// Start streaming. A soft-sync master requires all its slaves to be
    /// started first; they begin transmitting together with the master.
    pub fn start(
        &self,
        handle: CaptureHandle,
        req: StartRequest,
    ) -> Result<StartOutcome, CaptureError> {
        let device = self.device(handle)?;
        let slaves = self.soft_slaves(&device);
        if let Some(unarmed) = slaves.iter().find(|slave| !slave.is_streaming()) {
            return Err(CaptureError::UnarmedSlave(unarmed.handle()));
        }
        if !slaves.is_empty() {
            debug!("Device {} starts {} soft-sync slaves", handle, slaves.len());
        }
        device.start(&req, &slaves)
    }

    /// Stop streaming. Returns the frames dropped since start.
    pub fn stop(&self, handle: CaptureHandle) -> Result<u64, CaptureError> {
        let device = self.device(handle)?;
        let slaves = self.soft_slaves(&device);
        device.stop(&slaves)
    }

    /// Set or query a named parameter, see [`crate::params`]
    pub fn set_parameter(
        &self,
        handle: CaptureHandle,
        name: &str,
        value: Option<f64>,
    ) -> Result<ParamReply, CaptureError> {
        self.device(handle)?.set_parameter(name, value)
    }

    /// Stop and power down a device, invalidating its handle
    pub fn close(&self, handle: CaptureHandle) -> Result<(), CaptureError> {
        let device = self.device(handle)?;
        let slaves = self.soft_slaves(&device);
        match device.stop(&slaves) {
            Ok(_) => {}
            Err(err @ CaptureError::FrameHeld(_)) => return Err(err),
            Err(err) => warn!("Stopping device {} on close failed: {}", handle, err),
        }
        device.power_down();
        self.table_mut()
            .remove(handle)
            .ok_or(CaptureError::InvalidHandle(handle))?;
        info!("Closed capture device {}", handle);
        Ok(())
    }

    /// Close every open device
    pub fn close_all(&self) {
        for handle in self.open_devices() {
            if let Err(err) = self.close(handle) {
                warn!("Closing device {} failed: {}", handle, err);
            }
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iidc_bus::sim::{SimBus, SimCameraSpec};

    #[test]
    fn test_enumerate_names() {
        let bus = SimBus::new();
        bus.attach(SimCameraSpec::fixed_color(0x10));
        bus.attach(SimCameraSpec::scalable_raw(0x21).on_port(1));
        let engine = CaptureEngine::new(bus, EngineConfig::default());

        let devices = engine.enumerate_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "'Point Grey':'Flea'");
        assert_eq!(devices[0].address, "10:1");
        assert_eq!(devices[0].class_name, DEVICE_CLASS);
        assert_eq!(devices[1].port, 1);
        assert_eq!(devices[1].address, "21:1");
    }

    #[test]
    fn test_open_errors() {
        let engine = CaptureEngine::new(SimBus::new(), EngineConfig::default());
        assert!(matches!(
            engine.open(OpenRequest::default()),
            Err(CaptureError::NoCameras)
        ));

        let bus = SimBus::new();
        bus.attach(SimCameraSpec::fixed_color(1));
        let engine = CaptureEngine::new(bus, EngineConfig::default());
        assert!(matches!(
            engine.open(OpenRequest::index(3)),
            Err(CaptureError::DeviceIndexOutOfRange { index: 3, count: 1 })
        ));
        assert!(matches!(
            engine.open(OpenRequest::default().with_recording("x.raw:CodecSettings=", 0)),
            Err(CaptureError::Recording(_))
        ));
    }

    #[test]
    fn test_device_limit() {
        let bus = SimBus::new();
        bus.attach(SimCameraSpec::fixed_color(1));
        let config = EngineConfig {
            max_devices: 1,
            ..Default::default()
        };
        let engine = CaptureEngine::new(bus, config);
        engine.open(OpenRequest::default()).unwrap();
        assert!(matches!(
            engine.open(OpenRequest::default()),
            Err(CaptureError::TooManyDevices(1))
        ));
    }
}
