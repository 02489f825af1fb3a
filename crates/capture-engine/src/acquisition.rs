//! Acquisition thread
//!
//! Polls the transport without blocking, converts and records each frame
//! under the device lock, and publishes copies through a bounded channel.
//! With frame dropping the channel holds one snapshot and a newer frame
//! replaces an unread one; otherwise the thread waits for room, which
//! leaves frames queued in the DMA ring.

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

use crate::device::DeviceCore;
use crate::error::CaptureError;
use crate::frame::Snapshot;

/// Outcome of one acquisition cycle
pub(crate) enum Step {
    /// No frame was ready
    Idle,
    /// A frame was captured; `None` when live delivery is off
    Captured(Option<Snapshot>),
}

/// Handle to a running acquisition thread
pub(crate) struct Worker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    frames: Receiver<Snapshot>,
}

impl Worker {
    pub(crate) fn spawn(
        name: String,
        core: Arc<Mutex<DeviceCore>>,
        idle: Duration,
        capacity: usize,
        latest_wins: bool,
        deliver: bool,
    ) -> Result<Self, CaptureError> {
        let (tx, rx) = crossbeam_channel::bounded::<Snapshot>(capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let acquisition = AcquisitionLoop {
            core,
            stop: stop.clone(),
            frames: tx,
            superseded: rx.clone(),
            idle,
            latest_wins,
            deliver,
        };

        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || acquisition.run())
            .map_err(|e| CaptureError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            stop,
            thread: Some(thread),
            frames: rx,
        })
    }

    pub(crate) fn frames(&self) -> Receiver<Snapshot> {
        self.frames.clone()
    }

    /// Signal the thread and wait for it to exit
    pub(crate) fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Acquisition thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

struct AcquisitionLoop {
    core: Arc<Mutex<DeviceCore>>,
    stop: Arc<AtomicBool>,
    frames: Sender<Snapshot>,
    /// Receiving end used to discard an unread snapshot
    superseded: Receiver<Snapshot>,
    idle: Duration,
    latest_wins: bool,
    deliver: bool,
}

impl AcquisitionLoop {
    fn lock(&self) -> MutexGuard<'_, DeviceCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(self) {
        debug!("Acquisition thread running");
        while !self.stop.load(Ordering::Acquire) {
            let step = self.lock().acquire(self.deliver);
            match step {
                Ok(Step::Idle) => std::thread::sleep(self.idle),
                Ok(Step::Captured(Some(snapshot))) => self.publish(snapshot),
                Ok(Step::Captured(None)) => {}
                Err(err) => {
                    error!("Acquisition thread stopped: {}", err);
                    self.lock().last_error = Some(err.to_string());
                    break;
                }
            }
        }
        debug!("Acquisition thread exiting");
    }

    fn publish(&self, snapshot: Snapshot) {
        let mut pending = snapshot;
        if self.latest_wins {
            loop {
                match self.frames.try_send(pending) {
                    Ok(()) => return,
                    Err(TrySendError::Full(back)) => {
                        pending = back;
                        if self.superseded.try_recv().is_ok() {
                            pending.info.dropped += 1;
                            self.lock().superseded();
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
        }

        loop {
            match self.frames.send_timeout(pending, self.idle) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(back)) => {
                    if self.stop.load(Ordering::Acquire) {
                        return;
                    }
                    pending = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}
