//! Multi-camera synchronization roles
//!
//! A sync mode is a role (master or slave) combined with one or more
//! mechanisms: soft (the master's host starts its slaves), bus (the
//! master's start command is broadcast to the whole bus) and hw (cameras
//! wait for an external trigger signal).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CaptureError;

/// Sync role and mechanism bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncMode(u32);

impl SyncMode {
    pub const MASTER: u32 = 1;
    pub const SLAVE: u32 = 2;
    pub const SOFT: u32 = 4;
    pub const BUS: u32 = 8;
    pub const HW: u32 = 16;

    const MECHANISMS: u32 = Self::SOFT | Self::BUS | Self::HW;
    const ALL: u32 = Self::MASTER | Self::SLAVE | Self::MECHANISMS;

    /// Free-running, no synchronization
    pub const fn free_running() -> Self {
        Self(0)
    }

    /// Validate a raw bitmask
    pub fn from_bits(bits: u32) -> Result<Self, CaptureError> {
        if bits == 0 {
            return Ok(Self(0));
        }
        if bits & !Self::ALL != 0 {
            return Err(CaptureError::InvalidSyncMode(format!(
                "unknown bits in {:#x}",
                bits
            )));
        }

        let master = bits & Self::MASTER != 0;
        let slave = bits & Self::SLAVE != 0;
        let mechanisms = (bits & Self::MECHANISMS).count_ones();
        match (master, slave) {
            (true, true) => Err(CaptureError::InvalidSyncMode(
                "device can't be master and slave at the same time".to_string(),
            )),
            (false, false) => Err(CaptureError::InvalidSyncMode(
                "device must be either master or slave".to_string(),
            )),
            (true, false) if mechanisms == 0 => Err(CaptureError::InvalidSyncMode(
                "master needs at least one of soft, bus or hw sync".to_string(),
            )),
            (false, true) if mechanisms != 1 => Err(CaptureError::InvalidSyncMode(
                "slave needs exactly one of soft, bus or hw sync".to_string(),
            )),
            _ => Ok(Self(bits)),
        }
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_free_running(self) -> bool {
        self.0 == 0
    }

    pub fn is_master(self) -> bool {
        self.0 & Self::MASTER != 0
    }

    pub fn is_slave(self) -> bool {
        self.0 & Self::SLAVE != 0
    }

    pub fn is_soft(self) -> bool {
        self.0 & Self::SOFT != 0
    }

    pub fn is_bus(self) -> bool {
        self.0 & Self::BUS != 0
    }

    pub fn is_hw(self) -> bool {
        self.0 & Self::HW != 0
    }

    /// The master controls the bus broadcast flag around its commands
    pub fn controls_broadcast(self) -> bool {
        self.is_master() && self.is_bus()
    }

    /// Devices that switch their own transmission on and off. Non-hw slaves
    /// are started by their master.
    pub fn drives_transmission(self) -> bool {
        !self.is_slave() || self.is_hw()
    }

    pub fn is_soft_master(self) -> bool {
        self.is_master() && self.is_soft()
    }

    pub fn is_soft_slave(self) -> bool {
        self.is_slave() && self.is_soft()
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_free_running() {
            return write!(f, "free-running");
        }
        let role = if self.is_master() { "master" } else { "slave" };
        let mechanisms: Vec<&str> = [(Self::SOFT, "soft"), (Self::BUS, "bus"), (Self::HW, "hw")]
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{} ({})", role, mechanisms.join("+"))
    }
}
