// Step scheduler - Turns step notifications into timed notes
// Notes start at the step time (plus swing) and last a whole number of steps

use super::note::NoteName;
use super::step_translator::{StepListener, StepTiming, TimingHandle};
use crate::messaging::channels::NoteProducer;
use ringbuf::traits::Producer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A note placed on the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepNote {
    pub pitch: NoteName,
    /// 0.0 - 1.0
    pub velocity: f32,
    /// Length in steps (at least 1)
    pub duration_steps: u32,
}

impl StepNote {
    pub fn new(pitch: NoteName, velocity: f32, duration_steps: u32) -> Self {
        Self {
            pitch,
            velocity: velocity.clamp(0.0, 1.0),
            duration_steps: duration_steps.max(1),
        }
    }
}

/// Source of the notes placed on a step
pub trait StepNotes: Send {
    fn notes_at(&self, step: u64) -> Vec<StepNote>;
}

/// Shared, editable note grid
///
/// Clones are handles to the same grid, so the editor and the scheduler can
/// each hold one.
#[derive(Debug, Clone, Default)]
pub struct NoteGrid {
    cells: Arc<Mutex<BTreeMap<u64, Vec<StepNote>>>>,
}

impl NoteGrid {
    pub fn new() -> Self {
        Self::default()
    }

    fn cells(&self) -> MutexGuard<'_, BTreeMap<u64, Vec<StepNote>>> {
        self.cells
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Place `note` on `step`, replacing a note of the same pitch
    pub fn insert(&self, step: u64, note: StepNote) {
        let mut cells = self.cells();
        let notes = cells.entry(step).or_default();
        match notes.iter_mut().find(|n| n.pitch == note.pitch) {
            Some(existing) => *existing = note,
            None => notes.push(note),
        }
    }

    /// Remove the note of `pitch` on `step`. Returns false if there was none.
    pub fn remove(&self, step: u64, pitch: NoteName) -> bool {
        let mut cells = self.cells();
        let Some(notes) = cells.get_mut(&step) else {
            return false;
        };
        let before = notes.len();
        notes.retain(|n| n.pitch != pitch);
        let removed = notes.len() != before;
        if notes.is_empty() {
            cells.remove(&step);
        }
        removed
    }

    /// Add the note if absent, remove it otherwise. Returns true if it is now set.
    pub fn toggle(&self, step: u64, note: StepNote) -> bool {
        if self.remove(step, note.pitch) {
            false
        } else {
            self.insert(step, note);
            true
        }
    }

    pub fn clear(&self) {
        self.cells().clear();
    }

    /// Total number of notes on the grid
    pub fn note_count(&self) -> usize {
        self.cells().values().map(Vec::len).sum()
    }
}

impl StepNotes for NoteGrid {
    fn notes_at(&self, step: u64) -> Vec<StepNote> {
        self.cells().get(&step).cloned().unwrap_or_default()
    }
}

/// A note with absolute start and end times
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledNote {
    pub step: u64,
    pub pitch: NoteName,
    pub frequency: f64,
    pub velocity: f32,
    /// Seconds on the audio clock
    pub start: f64,
    pub end: f64,
}

enum TimingSource {
    Fixed(StepTiming),
    Linked(TimingHandle),
}

impl TimingSource {
    fn current(&self) -> StepTiming {
        match self {
            TimingSource::Fixed(timing) => *timing,
            TimingSource::Linked(handle) => handle.timing(),
        }
    }
}

/// Schedules grid notes as the playhead reaches their step
pub struct StepScheduler {
    notes: Box<dyn StepNotes>,
    timing: TimingSource,
    /// Scheduled notes that have not ended yet
    active: Vec<ScheduledNote>,
    output: Option<NoteProducer>,
}

impl StepScheduler {
    /// Scheduler with fixed timing
    pub fn new(notes: Box<dyn StepNotes>, timing: StepTiming) -> Self {
        Self {
            notes,
            timing: TimingSource::Fixed(timing),
            active: Vec::new(),
            output: None,
        }
    }

    /// Scheduler following a translator's tempo and swing
    pub fn linked(notes: Box<dyn StepNotes>, timing: TimingHandle) -> Self {
        Self {
            notes,
            timing: TimingSource::Linked(timing),
            active: Vec::new(),
            output: None,
        }
    }

    /// Also push every scheduled note into `output`
    pub fn with_output(mut self, output: NoteProducer) -> Self {
        self.output = Some(output);
        self
    }

    pub fn set_timing(&mut self, timing: StepTiming) {
        self.timing = TimingSource::Fixed(timing);
    }

    pub fn timing(&self) -> StepTiming {
        self.timing.current()
    }

    /// Schedule the notes on `step`, which starts at `time`
    ///
    /// Notes that ended by `time` are retired first.
    pub fn schedule_step(&mut self, step: u64, time: f64) -> Vec<ScheduledNote> {
        self.active.retain(|note| note.end > time);

        let timing = self.timing.current();
        let start = time + timing.swing_offset(step);

        let scheduled: Vec<ScheduledNote> = self
            .notes
            .notes_at(step)
            .into_iter()
            .map(|note| ScheduledNote {
                step,
                pitch: note.pitch,
                frequency: note.pitch.frequency(),
                velocity: note.velocity,
                start,
                end: start + note.duration_steps as f64 * timing.step_duration,
            })
            .collect();

        for note in &scheduled {
            if let Some(output) = self.output.as_mut() {
                if output.try_push(*note).is_err() {
                    log::warn!("Note queue full, dropping {} at step {}", note.pitch, step);
                }
            }
        }
        self.active.extend_from_slice(&scheduled);
        scheduled
    }

    /// Notes scheduled and not yet ended
    pub fn active_notes(&self) -> &[ScheduledNote] {
        &self.active
    }

    /// Forget every pending or sounding note and return them
    pub fn stop_all(&mut self) -> Vec<ScheduledNote> {
        std::mem::take(&mut self.active)
    }
}

impl StepListener for StepScheduler {
    fn on_step(&mut self, step: u64, time: f64) {
        self.schedule_step(step, time);
    }

    fn on_pause(&mut self) {
        let stopped = self.stop_all();
        log::debug!("Paused, released {} notes", stopped.len());
    }

    fn on_stop(&mut self) {
        let stopped = self.stop_all();
        log::debug!("Stopped, released {} notes", stopped.len());
    }
}

impl std::fmt::Debug for StepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepScheduler")
            .field("timing", &self.timing.current())
            .field("active", &self.active.len())
            .field("has_output", &self.output.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::create_note_channel;
    use crate::sequencer::step_translator::StepTranslator;
    use ringbuf::traits::Consumer;

    fn note(name: &str, duration_steps: u32) -> StepNote {
        StepNote::new(NoteName::parse(name).unwrap(), 0.8, duration_steps)
    }

    fn timing(swing: f64) -> StepTiming {
        StepTiming {
            step_duration: 0.125,
            swing,
        }
    }

    #[test]
    fn test_grid_insert_remove_toggle() {
        let grid = NoteGrid::new();
        grid.insert(0, note("C4", 1));
        grid.insert(0, note("C4", 2));
        grid.insert(0, note("E4", 1));
        assert_eq!(grid.note_count(), 2);
        assert_eq!(grid.notes_at(0)[0].duration_steps, 2);

        assert!(grid.remove(0, NoteName::parse("C4").unwrap()));
        assert!(!grid.remove(0, NoteName::parse("C4").unwrap()));

        assert!(!grid.toggle(0, note("E4", 1)));
        assert!(grid.toggle(3, note("G4", 1)));
        assert_eq!(grid.note_count(), 1);
        assert!(grid.notes_at(0).is_empty());
    }

    #[test]
    fn test_step_note_clamps() {
        let n = StepNote::new(NoteName::parse("A4").unwrap(), 1.5, 0);
        assert_eq!(n.velocity, 1.0);
        assert_eq!(n.duration_steps, 1);
    }

    #[test]
    fn test_schedule_step_times() {
        let grid = NoteGrid::new();
        grid.insert(2, note("A4", 4));
        let mut scheduler = StepScheduler::new(Box::new(grid), timing(0.0));

        let notes = scheduler.schedule_step(2, 10.0);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].start, 10.0);
        assert_eq!(notes[0].end, 10.5);
        assert_eq!(notes[0].frequency, 440.0);

        assert!(scheduler.schedule_step(3, 10.125).is_empty());
    }

    #[test]
    fn test_swing_delays_odd_steps() {
        let grid = NoteGrid::new();
        grid.insert(0, note("C4", 1));
        grid.insert(1, note("C4", 1));
        let mut scheduler = StepScheduler::new(Box::new(grid), timing(100.0));

        assert_eq!(scheduler.schedule_step(0, 0.0)[0].start, 0.0);
        let off_beat = scheduler.schedule_step(1, 0.125)[0];
        assert_eq!(off_beat.start, 0.1875);
        assert_eq!(off_beat.end, 0.3125);
    }

    #[test]
    fn test_ended_notes_are_retired() {
        let grid = NoteGrid::new();
        grid.insert(0, note("C4", 1));
        grid.insert(1, note("E4", 4));
        let mut scheduler = StepScheduler::new(Box::new(grid), timing(0.0));

        scheduler.schedule_step(0, 0.0);
        scheduler.schedule_step(1, 0.125);
        assert_eq!(scheduler.active_notes().len(), 1);
        assert_eq!(scheduler.active_notes()[0].step, 1);
    }

    #[test]
    fn test_stop_all_returns_active_notes() {
        let grid = NoteGrid::new();
        grid.insert(0, note("C4", 8));
        grid.insert(0, note("G4", 8));
        let mut scheduler = StepScheduler::new(Box::new(grid), timing(0.0));

        scheduler.schedule_step(0, 0.0);
        let stopped = scheduler.stop_all();
        assert_eq!(stopped.len(), 2);
        assert!(scheduler.active_notes().is_empty());
        assert!(scheduler.stop_all().is_empty());
    }

    #[test]
    fn test_output_queue() {
        let grid = NoteGrid::new();
        grid.insert(0, note("C4", 1));
        grid.insert(0, note("D4", 1));
        grid.insert(0, note("E4", 1));
        let (producer, mut consumer) = create_note_channel(2);
        let mut scheduler = StepScheduler::new(Box::new(grid), timing(0.0)).with_output(producer);

        // Third note does not fit and is dropped from the queue only
        assert_eq!(scheduler.schedule_step(0, 0.0).len(), 3);
        assert_eq!(consumer.try_pop().map(|n| n.pitch.to_string()), Some("C4".to_string()));
        assert_eq!(consumer.try_pop().map(|n| n.pitch.to_string()), Some("D4".to_string()));
        assert!(consumer.try_pop().is_none());
    }

    #[test]
    fn test_linked_timing_follows_translator() {
        let translator = StepTranslator::new();
        let grid = NoteGrid::new();
        grid.insert(0, note("C4", 2));
        let mut scheduler = StepScheduler::linked(Box::new(grid), translator.timing_handle());

        translator.set_tempo(60.0);
        let notes = scheduler.schedule_step(0, 1.0);
        assert_eq!(notes[0].end, 1.5);
    }

    #[test]
    fn test_as_translator_listener() {
        let mut translator = StepTranslator::new();
        let grid = NoteGrid::new();
        grid.insert(1, note("A4", 1));
        let (producer, mut consumer) = create_note_channel(8);
        let scheduler =
            StepScheduler::linked(Box::new(grid.clone()), translator.timing_handle())
                .with_output(producer);
        translator.add_listener(Box::new(scheduler));

        let tick = |beat_tick: u32, time: f64| crate::sequencer::events::TickData {
            bar: 1,
            beat: 1,
            tick: beat_tick,
            total_ticks: beat_tick as u64,
            time,
        };
        translator.handle_timer_tick(&tick(0, 0.0));
        translator.handle_timer_tick(&tick(24, 0.125));
        translator.handle_timer_tick(&tick(30, 0.15));

        let scheduled = consumer.try_pop().unwrap();
        assert_eq!(scheduled.step, 1);
        assert_eq!(scheduled.start, 0.125);
        assert!(consumer.try_pop().is_none());
    }
}
