// Loop regions - Bar-domain and step-domain loop windows
// The step loop is canonical for note dispatch; it is derived from the
// transport's bar loop through `StepMapping::bar_loop_to_steps`.

use super::timeline::{MusicalTime, TimeSignature};
use serde::{Deserialize, Serialize};

/// Inclusive loop window in bars (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarLoop {
    pub start_bar: u32,
    pub end_bar: u32,
}

impl BarLoop {
    /// Build a loop clamped to `[1, total_bars]` with `start_bar <= end_bar`
    pub fn clamped(start_bar: u32, end_bar: u32, total_bars: u32) -> Self {
        let total_bars = total_bars.max(1);
        let start_bar = start_bar.clamp(1, total_bars);
        let end_bar = end_bar.min(total_bars).max(start_bar);
        Self { start_bar, end_bar }
    }

    pub fn length_bars(&self) -> u64 {
        self.end_bar.saturating_sub(self.start_bar) as u64 + 1
    }

    /// Wrap a 0-based bar index into the loop
    ///
    /// Bars before the loop start are left alone; only the bar index is
    /// wrapped, never the time base.
    pub fn wrap_bar_index(&self, bars: u64) -> u64 {
        let loop_start = self.start_bar.saturating_sub(1) as u64;
        if bars < loop_start {
            return bars;
        }
        loop_start + (bars - loop_start) % self.length_bars()
    }
}

/// Inclusive loop window in steps (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLoop {
    pub start: u64,
    pub end: u64,
}

impl StepLoop {
    /// Build a loop clamped to `[0, total_steps - 1]` with `start <= end`
    pub fn clamped(start: u64, end: u64, total_steps: u64) -> Self {
        let last = total_steps.max(1) - 1;
        let start = start.min(last);
        let end = end.min(last).max(start);
        Self { start, end }
    }

    /// Loop over every step of the sequence
    pub fn full(total_steps: u64) -> Self {
        Self::clamped(0, u64::MAX, total_steps)
    }

    /// Number of steps in the window (at least 1)
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn contains(&self, step: u64) -> bool {
        step >= self.start && step <= self.end
    }

    /// Map a raw step onto the grid
    ///
    /// Inside the window the step is kept, past the end it wraps back to the
    /// loop start, and before the start it folds onto the whole sequence.
    pub fn wrap(&self, step: u64, total_steps: u64) -> u64 {
        if self.contains(step) {
            step
        } else if step > self.end {
            self.start + (step - self.start) % self.length()
        } else {
            step % total_steps.max(1)
        }
    }
}

/// Raised when the step loop no longer matches the transport's bar loop
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoopConsistencyError {
    #[error(
        "step loop {actual_start}..={actual_end} diverges from transport bar loop (expected {expected_start}..={expected_end})"
    )]
    Diverged {
        expected_start: u64,
        expected_end: u64,
        actual_start: u64,
        actual_end: u64,
    },

    #[error("step looping is {step_looping} but transport looping is {bar_looping}")]
    LoopingMismatch { step_looping: bool, bar_looping: bool },

    #[error(
        "transport bar loop covers steps {loop_start}..={loop_end} but the grid only has {total_steps} steps"
    )]
    ExceedsGrid {
        loop_start: u64,
        loop_end: u64,
        total_steps: u64,
    },
}

/// Step grid geometry: subdivision, signature and sequence length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMapping {
    subdivision: u32,
    time_signature: TimeSignature,
    total_steps: u64,
}

impl StepMapping {
    pub const DEFAULT_SUBDIVISION: u32 = 16;
    pub const DEFAULT_TOTAL_STEPS: u64 = 32;
    pub const MIN_SUBDIVISION: u32 = 4;
    pub const MAX_SUBDIVISION: u32 = 32;

    pub fn new(subdivision: u32, time_signature: TimeSignature, total_steps: u64) -> Self {
        Self {
            subdivision: Self::snap_subdivision(subdivision),
            time_signature,
            total_steps: total_steps.max(1),
        }
    }

    /// Snap to one of 4, 8, 16 or 32
    pub fn snap_subdivision(subdivision: u32) -> u32 {
        subdivision
            .clamp(Self::MIN_SUBDIVISION, Self::MAX_SUBDIVISION)
            .next_power_of_two()
    }

    pub fn subdivision(&self) -> u32 {
        self.subdivision
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn set_subdivision(&mut self, subdivision: u32) {
        self.subdivision = Self::snap_subdivision(subdivision);
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
    }

    pub fn set_total_steps(&mut self, total_steps: u64) {
        self.total_steps = total_steps.max(1);
    }

    /// Steps per quarter-note beat (16th notes = 4)
    pub fn steps_per_beat(&self) -> u64 {
        (self.subdivision / 4) as u64
    }

    pub fn steps_per_bar(&self) -> u64 {
        self.steps_per_beat() * self.time_signature.numerator as u64
    }

    pub fn ticks_per_step(&self) -> u64 {
        MusicalTime::TICKS_PER_BEAT as u64 / self.steps_per_beat()
    }

    /// Zero-based step for a bar/beat/tick position
    pub fn bar_beat_tick_to_step(&self, bar: u32, beat: u32, tick: u32) -> u64 {
        let bar_0 = bar.saturating_sub(1) as u64;
        let beat_0 = beat.saturating_sub(1) as u64;

        bar_0 * self.steps_per_bar()
            + beat_0 * self.steps_per_beat()
            + tick as u64 / self.ticks_per_step()
    }

    /// Position of the first tick of `step`
    pub fn step_to_bar_beat_tick(&self, step: u64) -> MusicalTime {
        let bar = step / self.steps_per_bar();
        let beat = (step % self.steps_per_bar()) / self.steps_per_beat();
        let tick = (step % self.steps_per_beat()) * self.ticks_per_step();
        MusicalTime::new(bar as u32 + 1, beat as u32 + 1, tick as u32)
    }

    /// Step window covering the bars of `bar_loop`, ignoring the sequence length
    pub fn bar_loop_window(&self, bar_loop: &BarLoop) -> StepLoop {
        let steps_per_bar = self.steps_per_bar();
        let start = bar_loop.start_bar.saturating_sub(1) as u64 * steps_per_bar;
        let end = (bar_loop.end_bar.max(bar_loop.start_bar).max(1) as u64 * steps_per_bar) - 1;
        StepLoop { start, end }
    }

    /// Step window covering the bars of `bar_loop`, clamped to the sequence
    pub fn bar_loop_to_steps(&self, bar_loop: &BarLoop) -> StepLoop {
        let window = self.bar_loop_window(bar_loop);
        StepLoop::clamped(window.start, window.end, self.total_steps)
    }

    /// Whether every bar of `bar_loop` lands on the grid
    pub fn fits_bar_loop(&self, bar_loop: &BarLoop) -> Result<(), LoopConsistencyError> {
        let window = self.bar_loop_window(bar_loop);
        if window.end < self.total_steps {
            Ok(())
        } else {
            Err(LoopConsistencyError::ExceedsGrid {
                loop_start: window.start,
                loop_end: window.end,
                total_steps: self.total_steps,
            })
        }
    }

    /// Bar loop whose step window is exactly `step_loop`, if it is bar aligned
    pub fn aligned_bar_loop(&self, step_loop: &StepLoop) -> Option<BarLoop> {
        let bar_loop = self.steps_to_bar_loop(step_loop);
        (self.bar_loop_window(&bar_loop) == *step_loop).then_some(bar_loop)
    }

    /// Smallest bar window containing `step_loop`
    pub fn steps_to_bar_loop(&self, step_loop: &StepLoop) -> BarLoop {
        let steps_per_bar = self.steps_per_bar();
        BarLoop {
            start_bar: (step_loop.start / steps_per_bar) as u32 + 1,
            end_bar: (step_loop.end / steps_per_bar) as u32 + 1,
        }
    }

    /// Check that `step_loop` is exactly the window covering `bar_loop`
    ///
    /// A bar loop reaching past the end of the grid is never consistent.
    pub fn check_consistency(
        &self,
        bar_loop: &BarLoop,
        step_loop: &StepLoop,
    ) -> Result<(), LoopConsistencyError> {
        self.fits_bar_loop(bar_loop)?;
        let expected = self.bar_loop_window(bar_loop);
        if expected == *step_loop {
            Ok(())
        } else {
            Err(LoopConsistencyError::Diverged {
                expected_start: expected.start,
                expected_end: expected.end,
                actual_start: step_loop.start,
                actual_end: step_loop.end,
            })
        }
    }
}

impl Default for StepMapping {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_SUBDIVISION,
            TimeSignature::default(),
            Self::DEFAULT_TOTAL_STEPS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_loop_clamping() {
        assert_eq!(BarLoop::clamped(0, 20, 8), BarLoop { start_bar: 1, end_bar: 8 });
        assert_eq!(BarLoop::clamped(6, 3, 8), BarLoop { start_bar: 6, end_bar: 6 });
        assert_eq!(BarLoop::clamped(12, 14, 8), BarLoop { start_bar: 8, end_bar: 8 });
    }

    #[test]
    fn test_bar_wrap() {
        let bar_loop = BarLoop { start_bar: 3, end_bar: 4 };

        // Before the loop: untouched
        assert_eq!(bar_loop.wrap_bar_index(0), 0);
        assert_eq!(bar_loop.wrap_bar_index(1), 1);

        // Inside and past the loop: bars 3,4,3,4 (0-based 2,3,2,3)
        assert_eq!(bar_loop.wrap_bar_index(2), 2);
        assert_eq!(bar_loop.wrap_bar_index(3), 3);
        assert_eq!(bar_loop.wrap_bar_index(4), 2);
        assert_eq!(bar_loop.wrap_bar_index(5), 3);
    }

    #[test]
    fn test_step_wrap() {
        let full = StepLoop { start: 0, end: 31 };
        assert_eq!(full.wrap(35, 32), 3);
        assert_eq!(full.wrap(17, 32), 17);

        let window = StepLoop { start: 8, end: 15 };
        assert_eq!(window.wrap(16, 32), 8);
        assert_eq!(window.wrap(23, 32), 15);
        // Before the window: modulo total steps
        assert_eq!(window.wrap(5, 32), 5);
    }

    #[test]
    fn test_step_loop_clamping() {
        assert_eq!(StepLoop::clamped(40, 50, 32), StepLoop { start: 31, end: 31 });
        assert_eq!(StepLoop::clamped(10, 2, 32), StepLoop { start: 10, end: 10 });
        assert_eq!(StepLoop::full(16), StepLoop { start: 0, end: 15 });
    }

    #[test]
    fn test_subdivision_snapping() {
        assert_eq!(StepMapping::snap_subdivision(1), 4);
        assert_eq!(StepMapping::snap_subdivision(8), 8);
        assert_eq!(StepMapping::snap_subdivision(12), 16);
        assert_eq!(StepMapping::snap_subdivision(64), 32);
    }

    #[test]
    fn test_step_geometry() {
        let mapping = StepMapping::default();
        assert_eq!(mapping.steps_per_beat(), 4);
        assert_eq!(mapping.steps_per_bar(), 16);
        assert_eq!(mapping.ticks_per_step(), 24);

        let eighths = StepMapping::new(8, TimeSignature::three_four(), 24);
        assert_eq!(eighths.steps_per_beat(), 2);
        assert_eq!(eighths.steps_per_bar(), 6);
        assert_eq!(eighths.ticks_per_step(), 48);
    }

    #[test]
    fn test_bar_beat_tick_to_step() {
        let mapping = StepMapping::default();
        assert_eq!(mapping.bar_beat_tick_to_step(1, 1, 0), 0);
        assert_eq!(mapping.bar_beat_tick_to_step(1, 1, 23), 0);
        assert_eq!(mapping.bar_beat_tick_to_step(1, 1, 24), 1);
        assert_eq!(mapping.bar_beat_tick_to_step(1, 2, 0), 4);
        assert_eq!(mapping.bar_beat_tick_to_step(2, 3, 95), 16 + 8 + 3);
    }

    #[test]
    fn test_step_to_bar_beat_tick() {
        let mapping = StepMapping::default();
        assert_eq!(mapping.step_to_bar_beat_tick(0), MusicalTime::new(1, 1, 0));
        assert_eq!(mapping.step_to_bar_beat_tick(27), MusicalTime::new(2, 3, 72));

        for step in 0..64 {
            let pos = mapping.step_to_bar_beat_tick(step);
            assert_eq!(mapping.bar_beat_tick_to_step(pos.bar, pos.beat, pos.tick), step);
        }
    }

    #[test]
    fn test_bar_loop_to_steps() {
        let mapping = StepMapping::new(16, TimeSignature::four_four(), 128);
        let steps = mapping.bar_loop_to_steps(&BarLoop { start_bar: 2, end_bar: 3 });
        assert_eq!(steps, StepLoop { start: 16, end: 47 });
        assert_eq!(
            mapping.steps_to_bar_loop(&steps),
            BarLoop { start_bar: 2, end_bar: 3 }
        );

        // Clamped to the sequence length
        let short = StepMapping::default();
        let steps = short.bar_loop_to_steps(&BarLoop { start_bar: 1, end_bar: 8 });
        assert_eq!(steps, StepLoop { start: 0, end: 31 });
    }

    #[test]
    fn test_consistency_check() {
        let mapping = StepMapping::default();
        let bar_loop = BarLoop { start_bar: 1, end_bar: 2 };

        assert!(mapping
            .check_consistency(&bar_loop, &StepLoop { start: 0, end: 31 })
            .is_ok());

        let err = mapping
            .check_consistency(&bar_loop, &StepLoop { start: 0, end: 15 })
            .unwrap_err();
        assert_eq!(
            err,
            LoopConsistencyError::Diverged {
                expected_start: 0,
                expected_end: 31,
                actual_start: 0,
                actual_end: 15,
            }
        );
    }

    #[test]
    fn test_bar_loop_past_grid_is_inconsistent() {
        // 8 bars of 16ths need 128 steps; the default grid has 32
        let mapping = StepMapping::default();
        let bar_loop = BarLoop { start_bar: 1, end_bar: 8 };
        let clamped = mapping.bar_loop_to_steps(&bar_loop);
        assert_eq!(clamped, StepLoop { start: 0, end: 31 });

        assert_eq!(
            mapping.check_consistency(&bar_loop, &clamped),
            Err(LoopConsistencyError::ExceedsGrid {
                loop_start: 0,
                loop_end: 127,
                total_steps: 32,
            })
        );
        assert!(mapping.fits_bar_loop(&BarLoop { start_bar: 1, end_bar: 2 }).is_ok());
    }

    #[test]
    fn test_aligned_bar_loop() {
        let mapping = StepMapping::new(16, TimeSignature::four_four(), 128);
        assert_eq!(
            mapping.aligned_bar_loop(&StepLoop { start: 16, end: 47 }),
            Some(BarLoop { start_bar: 2, end_bar: 3 })
        );
        assert_eq!(mapping.aligned_bar_loop(&StepLoop { start: 16, end: 40 }), None);
        assert_eq!(mapping.aligned_bar_loop(&StepLoop { start: 4, end: 15 }), None);
    }
}
