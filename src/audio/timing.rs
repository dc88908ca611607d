// Audio clock sources - the hardware time base the transport polls
// Every clock reports absolute seconds; the transport never accumulates deltas

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

/// Errors raised when a clock cannot be (re)started
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("Audio clock could not be resumed: {0}")]
    ResumeFailed(String),
}

/// Monotonic time source in seconds
///
/// Mirrors an audio context: the clock may start suspended and must be resumed
/// before it advances.
pub trait AudioClock: Send + Sync {
    /// Current time in seconds
    fn now(&self) -> f64;

    /// Whether the clock is currently suspended
    fn is_suspended(&self) -> bool {
        false
    }

    /// Resume a suspended clock
    fn resume(&self) -> Result<(), ClockError> {
        Ok(())
    }
}

/// Shared audio timing state, driven by the audio callback
///
/// The audio thread advances the sample counter; every other thread reads the
/// time derived from it.
#[derive(Clone)]
pub struct SampleClock {
    /// Current sample position (incremented by audio callback)
    sample_position: Arc<AtomicU64>,
    /// Sample rate (for timestamp conversions)
    sample_rate: f64,
    suspended: Arc<AtomicBool>,
}

impl SampleClock {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1.0),
            suspended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a clock that stays frozen until `resume` is called
    pub fn suspended(sample_rate: f64) -> Self {
        let clock = Self::new(sample_rate);
        clock.suspended.store(true, Ordering::Relaxed);
        clock
    }

    /// Get current sample position
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Relaxed)
    }

    /// Advance sample position (called from audio callback)
    ///
    /// Ignored while suspended.
    pub fn advance(&self, frames: usize) {
        if self.suspended.load(Ordering::Relaxed) {
            return;
        }
        self.sample_position
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Suspend the clock (the audio device went away)
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Relaxed);
    }

    /// Convert a sample count to seconds
    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    /// Convert seconds to a sample count (truncated)
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate) as u64
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl AudioClock for SampleClock {
    fn now(&self) -> f64 {
        self.samples_to_seconds(self.current_sample())
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Relaxed)
    }

    fn resume(&self) -> Result<(), ClockError> {
        self.suspended.store(false, Ordering::Relaxed);
        Ok(())
    }
}

/// Wall clock backed by `Instant`, for hosts without an audio device
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock whose time is set explicitly
///
/// Used for offline rendering and tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    // f64 bit pattern
    seconds: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(seconds: f64) -> Self {
        let clock = Self::new();
        clock.set(seconds);
        clock
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::Relaxed))
    }
}
