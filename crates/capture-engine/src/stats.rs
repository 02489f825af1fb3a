//! Stream counters

use serde::{Deserialize, Serialize};

/// Per-stream frame counters, reset at stream start
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Frames taken from the transport, discarded ones included
    pub frames: u64,
    /// Frames discarded by the frame-dropping policy
    pub dropped: u64,
    /// Completed frames queued behind the last delivered one
    pub backlog: u32,
    /// Presentation time of the last frame
    pub last_pts: f64,
}

impl CaptureStats {
    pub(crate) fn frame_taken(&mut self, device: &str) {
        self.frames += 1;
        metrics::counter!("iidc_frames_captured_total", "device" => device.to_string()).increment(1);
    }

    pub(crate) fn frames_dropped(&mut self, device: &str, count: u32) {
        if count == 0 {
            return;
        }
        self.dropped += u64::from(count);
        metrics::counter!("iidc_frames_dropped_total", "device" => device.to_string())
            .increment(u64::from(count));
    }

    pub(crate) fn set_backlog(&mut self, device: &str, backlog: u32) {
        self.backlog = backlog;
        metrics::gauge!("iidc_frame_backlog", "device" => device.to_string()).set(f64::from(backlog));
    }
}
