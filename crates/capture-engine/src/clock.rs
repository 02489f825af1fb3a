//! Process clock
//!
//! Transport timestamps are microseconds of wall-clock time. The process
//! clock is wall-clock time on Linux and host uptime on macOS, where frame
//! timestamps are shifted by the current offset between the two.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time in seconds
pub fn wall_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Current time on the process clock, in seconds
#[cfg(not(target_os = "macos"))]
pub fn now_secs() -> f64 {
    wall_secs()
}

/// Current time on the process clock, in seconds
#[cfg(target_os = "macos")]
pub fn now_secs() -> f64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec.
    let ret = unsafe { libc::clock_gettime(libc::CLOCK_UPTIME_RAW, &mut ts) };
    if ret != 0 {
        return wall_secs();
    }
    ts.tv_sec as f64 + ts.tv_nsec as f64 / 1e9
}

/// Presentation time of a frame on the process clock
pub fn frame_pts(timestamp_us: u64) -> f64 {
    let wall = timestamp_us as f64 / 1e6;
    if cfg!(target_os = "macos") {
        wall - (wall_secs() - now_secs())
    } else {
        wall
    }
}

/// Time left until `deadline`: zero once it has passed, `None` when the
/// wait can't be represented
pub fn remaining_until(deadline: f64) -> Option<Duration> {
    let remaining = deadline - now_secs();
    if remaining.is_nan() {
        None
    } else if remaining <= 0.0 {
        Some(Duration::ZERO)
    } else {
        Duration::try_from_secs_f64(remaining).ok()
    }
}

/// Sleep until the process clock reaches `deadline`. Returns false without
/// sleeping if the deadline is out of range.
pub fn wait_until(deadline: f64) -> bool {
    match remaining_until(deadline) {
        Some(remaining) => {
            if !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
            true
        }
        None => false,
    }
}
