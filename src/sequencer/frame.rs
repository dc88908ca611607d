// Frame task - Cancellable repeating task standing in for an animation-frame callback
// The transport starts one on play and cancels it on pause/stop

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Nominal display refresh rate
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// Cancellation handle for a frame task
///
/// Cheap to clone; cancelling any clone cancels the task.
#[derive(Debug, Clone, Default)]
pub struct FrameHandle {
    cancelled: Arc<AtomicBool>,
}

impl FrameHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// A repeating per-frame task
///
/// The owner calls `begin_frame` on each display refresh; it returns false
/// once the task is cancelled, and no frame work may run after that.
#[derive(Debug)]
pub struct FrameTask {
    handle: FrameHandle,
    frames: u64,
}

impl FrameTask {
    /// Start a new task
    pub fn start() -> Self {
        Self {
            handle: FrameHandle::default(),
            frames: 0,
        }
    }

    pub fn handle(&self) -> FrameHandle {
        self.handle.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_cancelled()
    }

    /// Enter a frame. Returns false if the task was cancelled.
    pub fn begin_frame(&mut self) -> bool {
        if self.handle.is_cancelled() {
            return false;
        }
        self.frames += 1;
        true
    }

    /// Frames run so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

impl Drop for FrameTask {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Paces a host loop at a fixed frame rate
///
/// Deadlines are absolute, so a late frame does not push later frames back.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    next_deadline: Instant,
}

impl FramePacer {
    pub fn new(frame_rate: f64) -> Self {
        let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            DEFAULT_FRAME_RATE
        };
        let interval = Duration::from_secs_f64(1.0 / frame_rate);
        Self {
            interval,
            next_deadline: Instant::now() + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep until the next frame deadline
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next_deadline > now {
            thread::sleep(self.next_deadline - now);
            self.next_deadline += self.interval;
        } else {
            // Missed one or more frames: resynchronize instead of bursting
            self.next_deadline = now + self.interval;
        }
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE)
    }
}
