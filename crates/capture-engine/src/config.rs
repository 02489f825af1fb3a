//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capture engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of simultaneously open devices
    pub max_devices: usize,

    /// DMA buffers per device when the open request does not say
    pub buffer_count: u32,

    /// Acquisition thread sleep when no frame is ready, with frame dropping (milliseconds)
    pub low_latency_idle_ms: u64,

    /// Acquisition thread sleep when no frame is ready, without frame dropping (milliseconds)
    pub idle_ms: u64,

    /// Snapshots buffered between acquisition thread and consumer when
    /// frames are not dropped
    pub delivery_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_devices: 100,
            buffer_count: 8,
            low_latency_idle_ms: 1,
            idle_ms: 4,
            delivery_queue: 8,
        }
    }
}

impl EngineConfig {
    /// Few buffers and a short idle sleep
    pub fn low_latency() -> Self {
        Self {
            buffer_count: 4,
            idle_ms: 1,
            delivery_queue: 2,
            ..Default::default()
        }
    }

    /// Deep buffering for recording without frame loss
    pub fn recording() -> Self {
        Self {
            buffer_count: 32,
            delivery_queue: 32,
            ..Default::default()
        }
    }

    /// Idle sleep of the acquisition thread
    pub fn idle_sleep(&self, drop_frames: bool) -> Duration {
        if drop_frames {
            Duration::from_millis(self.low_latency_idle_ms)
        } else {
            Duration::from_millis(self.idle_ms)
        }
    }

    /// Capacity of the snapshot channel
    pub fn delivery_capacity(&self, drop_frames: bool) -> usize {
        if drop_frames {
            1
        } else {
            self.delivery_queue.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer_count, 8);
        assert_eq!(config.idle_sleep(true), Duration::from_millis(1));
        assert_eq!(config.idle_sleep(false), Duration::from_millis(4));
        assert_eq!(config.delivery_capacity(true), 1);
        assert_eq!(config.delivery_capacity(false), 8);
    }

    #[test]
    fn test_partial_json() {
        let config: EngineConfig = serde_json::from_str(r#"{"buffer_count": 16}"#).unwrap();
        assert_eq!(config.buffer_count, 16);
        assert_eq!(config.max_devices, 100);
    }
}
