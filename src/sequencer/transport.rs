// Transport - Playback control and musical position
// Derives bar/beat/tick from the audio clock on every frame and broadcasts events

use super::events::{TickData, TransportEvent};
use super::frame::{FrameHandle, FrameTask};
use super::loop_region::BarLoop;
use super::subscribers::{SubscriberCallback, SubscriberRegistry};
use super::timeline::{MusicalTime, Tempo, TimeSignature, seconds_to_total_ticks};
use crate::audio::timing::AudioClock;
use crate::messaging::channels::{
    COMMAND_QUEUE_CAPACITY, CommandConsumer, TransportControl, create_command_channel,
};
use crate::messaging::command::TransportCommand;
use ringbuf::traits::Consumer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Transport state (play/pause/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, TransportState::Paused)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped)
    }
}

/// Startup configuration for a transport
///
/// Every field is clamped when the transport is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub tempo: f64,
    pub time_signature: TimeSignature,
    pub total_bars: u32,
    pub looping: bool,
    pub loop_start_bar: u32,
    pub loop_end_bar: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            time_signature: TimeSignature::four_four(),
            total_bars: 8,
            looping: true,
            loop_start_bar: 1,
            loop_end_bar: 8,
        }
    }
}

/// Read-only view of the transport at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransportSnapshot {
    pub state: TransportState,
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
    pub start_time: f64,
    pub elapsed_time: f64,
    pub current_bar: u32,
    pub current_beat: u32,
    pub current_tick: u32,
    pub looping: bool,
    pub loop_region: BarLoop,
}

impl TransportSnapshot {
    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn position(&self) -> MusicalTime {
        MusicalTime::new(self.current_bar, self.current_beat, self.current_tick)
    }
}

impl Default for TransportSnapshot {
    fn default() -> Self {
        let config = TransportConfig::default();
        Self {
            state: TransportState::Stopped,
            tempo_bpm: config.tempo,
            time_signature: config.time_signature,
            start_time: 0.0,
            elapsed_time: 0.0,
            current_bar: 1,
            current_beat: 1,
            current_tick: 0,
            looping: config.looping,
            loop_region: BarLoop::clamped(
                config.loop_start_bar,
                config.loop_end_bar,
                config.total_bars,
            ),
        }
    }
}

/// Transport controller
///
/// Owns the clock-to-position mapping and the play/pause/stop state machine.
/// Position is always recomputed as a function of `now - start_time`, so
/// frame jitter never accumulates into timing error.
pub struct Transport {
    clock: Arc<dyn AudioClock>,
    registry: SubscriberRegistry,
    state: TransportState,
    tempo: Tempo,
    time_signature: TimeSignature,
    start_time: f64,
    elapsed_time: f64,
    position: MusicalTime,
    total_bars: u32,
    looping: bool,
    loop_region: BarLoop,
    frame_task: Option<FrameTask>,
    control: TransportControl,
    commands: CommandConsumer,
}

impl Transport {
    /// Create a transport driven by `clock`
    pub fn new(clock: Arc<dyn AudioClock>, config: TransportConfig) -> Self {
        let total_bars = config.total_bars.max(1);
        let (producer, commands) = create_command_channel(COMMAND_QUEUE_CAPACITY);
        Self {
            clock,
            registry: SubscriberRegistry::new(),
            state: TransportState::Stopped,
            tempo: Tempo::new(config.tempo),
            time_signature: config.time_signature.sanitized(),
            start_time: 0.0,
            elapsed_time: 0.0,
            position: MusicalTime::zero(),
            total_bars,
            looping: config.looping,
            loop_region: BarLoop::clamped(config.loop_start_bar, config.loop_end_bar, total_bars),
            frame_task: None,
            control: TransportControl::new(producer),
            commands,
        }
    }

    /// 120 BPM, 4/4, 8 bars, looping over the whole sequence
    pub fn with_defaults(clock: Arc<dyn AudioClock>) -> Self {
        Self::new(clock, TransportConfig::default())
    }

    pub fn clock(&self) -> &Arc<dyn AudioClock> {
        &self.clock
    }

    fn now(&self) -> f64 {
        self.clock.now()
    }

    // ---- Transport controls ----

    /// Start or resume playback
    ///
    /// Resumes a suspended clock first. Calling while already playing does nothing.
    pub fn play(&mut self) {
        if self.clock.is_suspended() {
            if let Err(err) = self.clock.resume() {
                log::error!("Cannot start playback: {}", err);
                return;
            }
        }

        if self.state.is_playing() {
            return;
        }

        let now = self.now();
        self.start_time = now - self.elapsed_time;
        self.state = TransportState::Playing;
        self.frame_task = Some(FrameTask::start());
        log::debug!("Transport playing from {} at {:.3}s", self.position, now);

        self.registry.broadcast(&TransportEvent::Play { time: now });
    }

    /// Pause playback, keeping the position
    pub fn pause(&mut self) {
        if !self.state.is_playing() {
            return;
        }

        let now = self.now();
        self.elapsed_time = (now - self.start_time).max(0.0);
        self.cancel_frame_task();
        self.state = TransportState::Paused;
        self.position = self.position_at(self.elapsed_time);
        log::debug!("Transport paused at {}", self.position);

        self.registry.broadcast(&TransportEvent::Pause { time: now });
    }

    /// Stop playback and rewind to bar 1
    pub fn stop(&mut self) {
        let now = self.now();
        self.state = TransportState::Stopped;
        self.elapsed_time = 0.0;
        self.position = MusicalTime::zero();
        self.cancel_frame_task();
        log::debug!("Transport stopped");

        self.registry.broadcast(&TransportEvent::Stop { time: now });
    }

    /// Toggle play/pause
    pub fn toggle_play(&mut self) {
        if self.state.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    fn cancel_frame_task(&mut self) {
        if let Some(task) = self.frame_task.take() {
            task.cancel();
        }
    }

    // ---- Frame processing ----

    /// Recompute the position and broadcast a tick
    ///
    /// Call once per display frame. Returns `None` when not playing or when
    /// the frame task was cancelled.
    pub fn on_frame(&mut self) -> Option<TickData> {
        if !self.state.is_playing() {
            return None;
        }
        let task = self.frame_task.as_mut()?;
        if !task.begin_frame() {
            return None;
        }

        let tick = self.calculate_position();
        self.registry.broadcast(&TransportEvent::Tick(tick));
        Some(tick)
    }

    /// Cancellation handle of the running frame task, if any
    pub fn frame_handle(&self) -> Option<FrameHandle> {
        self.frame_task.as_ref().map(FrameTask::handle)
    }

    /// Frames processed since the last `play`
    pub fn frames_since_play(&self) -> u64 {
        self.frame_task.as_ref().map_or(0, FrameTask::frames)
    }

    fn calculate_position(&mut self) -> TickData {
        let now = self.now();
        let total_elapsed = (now - self.start_time).max(0.0);
        self.elapsed_time = total_elapsed;

        let total_ticks = seconds_to_total_ticks(total_elapsed, &self.tempo);
        self.position = self.decompose(total_ticks);

        TickData {
            bar: self.position.bar,
            beat: self.position.beat,
            tick: self.position.tick,
            total_ticks,
            time: now,
        }
    }

    /// Split total ticks into a loop-wrapped bar/beat/tick position
    fn decompose(&self, total_ticks: u64) -> MusicalTime {
        let ticks_per_beat = MusicalTime::TICKS_PER_BEAT as u64;
        let ticks_per_bar = self.time_signature.ticks_per_bar();

        let mut bars = total_ticks / ticks_per_bar;
        let remaining_ticks = total_ticks % ticks_per_bar;
        let beats = remaining_ticks / ticks_per_beat;
        let ticks = remaining_ticks % ticks_per_beat;

        if self.looping {
            bars = self.loop_region.wrap_bar_index(bars);
        }

        MusicalTime::new(bars as u32 + 1, beats as u32 + 1, ticks as u32)
    }

    fn position_at(&self, elapsed: f64) -> MusicalTime {
        self.decompose(seconds_to_total_ticks(elapsed, &self.tempo))
    }

    /// Elapsed seconds right now, whatever the state
    fn live_elapsed(&self) -> f64 {
        match self.state {
            TransportState::Playing => (self.now() - self.start_time).max(0.0),
            _ => self.elapsed_time,
        }
    }

    // ---- Configuration ----

    /// Set the tempo, clamped to [30, 300] BPM
    ///
    /// The musical position is continuous across the change. Returns the
    /// tempo actually applied.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        let old_tempo = self.tempo.bpm();
        let tempo = Tempo::new(bpm);
        if tempo.bpm() != bpm {
            log::debug!("Tempo {} clamped to {}", bpm, tempo);
        }

        let ratio = old_tempo / tempo.bpm();
        match self.state {
            TransportState::Playing => {
                let now = self.now();
                let scaled = (now - self.start_time).max(0.0) * ratio;
                self.start_time = now - scaled;
                self.elapsed_time = scaled;
            }
            TransportState::Paused => {
                self.elapsed_time *= ratio;
            }
            TransportState::Stopped => {}
        }
        self.tempo = tempo;

        self.registry.broadcast(&TransportEvent::TempoChange {
            tempo: tempo.bpm(),
            old_tempo,
        });
        tempo.bpm()
    }

    /// Replace the time signature without touching the elapsed time
    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) {
        let time_signature = TimeSignature::new(numerator, denominator);
        self.time_signature = time_signature;
        if !self.state.is_stopped() {
            // Keep the stored beat inside the new bar length
            self.position = self.position_at(self.live_elapsed());
        }

        self.registry.broadcast(&TransportEvent::TimeSignatureChange {
            numerator: time_signature.numerator,
            denominator: time_signature.denominator,
        });
    }

    pub fn set_looping(&mut self, enabled: bool) {
        self.looping = enabled;
        self.registry
            .broadcast(&TransportEvent::LoopChange { enabled });
    }

    /// Set the inclusive bar loop, clamped to `[1, total_bars]`
    pub fn set_loop_region(&mut self, start_bar: u32, end_bar: u32) {
        self.loop_region = BarLoop::clamped(start_bar, end_bar, self.total_bars);
        self.registry.broadcast(&TransportEvent::LoopRegionChange {
            start_bar: self.loop_region.start_bar,
            end_bar: self.loop_region.end_bar,
        });
    }

    // ---- Remote control ----

    /// Handle that queues commands for this transport
    pub fn control(&self) -> TransportControl {
        self.control.clone()
    }

    /// Apply every queued command in order
    ///
    /// Returns false when a `Shutdown` was dequeued; the commands behind it
    /// stay queued.
    pub fn process_commands(&mut self) -> bool {
        while let Some(command) = self.commands.try_pop() {
            if !self.apply_command(command) {
                return false;
            }
        }
        true
    }

    /// Apply one command. Returns false on `Shutdown`.
    pub fn apply_command(&mut self, command: TransportCommand) -> bool {
        match command {
            TransportCommand::Play => self.play(),
            TransportCommand::Pause => self.pause(),
            TransportCommand::Stop => self.stop(),
            TransportCommand::TogglePlay => self.toggle_play(),
            TransportCommand::SetTempo(bpm) => {
                self.set_tempo(bpm);
            }
            TransportCommand::SetTimeSignature(numerator, denominator) => {
                self.set_time_signature(numerator, denominator)
            }
            TransportCommand::SetLooping(enabled) => self.set_looping(enabled),
            TransportCommand::SetLoopRegion(start_bar, end_bar) => {
                self.set_loop_region(start_bar, end_bar)
            }
            TransportCommand::Subscribe { id, callback } => self.subscribe(id, callback),
            TransportCommand::Unsubscribe(id) => {
                if !self.unsubscribe(&id) {
                    log::debug!("Unsubscribe for unknown subscriber '{}'", id);
                }
            }
            TransportCommand::Shutdown => return false,
        }
        true
    }

    // ---- Subscribers ----

    pub fn subscribe(&mut self, id: impl Into<String>, callback: SubscriberCallback) {
        self.registry.subscribe(id, callback);
    }

    pub fn unsubscribe(&mut self, id: &str) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Handle to the subscriber registry
    pub fn registry(&self) -> SubscriberRegistry {
        self.registry.clone()
    }

    // ---- Queries ----

    pub fn current_position(&self) -> TransportSnapshot {
        TransportSnapshot {
            state: self.state,
            tempo_bpm: self.tempo.bpm(),
            time_signature: self.time_signature,
            start_time: self.start_time,
            elapsed_time: self.elapsed_time,
            current_bar: self.position.bar,
            current_beat: self.position.beat,
            current_tick: self.position.tick,
            looping: self.looping,
            loop_region: self.loop_region,
        }
    }

    /// Configuration that would rebuild this transport's settings
    pub fn config(&self) -> TransportConfig {
        TransportConfig {
            tempo: self.tempo.bpm(),
            time_signature: self.time_signature,
            total_bars: self.total_bars,
            looping: self.looping,
            loop_start_bar: self.loop_region.start_bar,
            loop_end_bar: self.loop_region.end_bar,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn total_bars(&self) -> u32 {
        self.total_bars
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn loop_region(&self) -> BarLoop {
        self.loop_region
    }

    // ---- Conversions ----

    /// Seconds from the start of the timeline to `bar:beat:tick`
    pub fn bar_beat_tick_to_seconds(&self, bar: u32, beat: u32, tick: u32) -> f64 {
        MusicalTime::new(bar, beat, tick).to_seconds(&self.tempo, &self.time_signature)
    }

    /// Position reached after `seconds` (not loop-wrapped)
    pub fn seconds_to_bar_beat_tick(&self, seconds: f64) -> MusicalTime {
        MusicalTime::from_seconds(seconds, &self.tempo, &self.time_signature)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state)
            .field("tempo", &self.tempo)
            .field("time_signature", &self.time_signature)
            .field("position", &self.position)
            .field("looping", &self.looping)
            .field("loop_region", &self.loop_region)
            .field("subscribers", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::timing::{ManualClock, SampleClock};
    use crate::sequencer::subscribers::SubscriberError;
    use std::sync::Mutex;

    fn transport_at(seconds: f64) -> (Transport, ManualClock) {
        let clock = ManualClock::at(seconds);
        let transport = Transport::with_defaults(Arc::new(clock.clone()));
        (transport, clock)
    }

    fn event_log(transport: &mut Transport) -> Arc<Mutex<Vec<TransportEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        transport.subscribe(
            "log",
            Box::new(move |event| {
                log_clone.lock().unwrap().push(*event);
                Ok(())
            }),
        );
        log
    }

    #[test]
    fn test_transport_state() {
        assert!(TransportState::Playing.is_playing());
        assert!(TransportState::Paused.is_paused());
        assert!(TransportState::Stopped.is_stopped());
        assert_eq!(TransportState::default(), TransportState::Stopped);
    }

    #[test]
    fn test_defaults() {
        let (transport, _) = transport_at(0.0);
        let snapshot = transport.current_position();

        assert_eq!(snapshot.state, TransportState::Stopped);
        assert_eq!(snapshot.tempo_bpm, 120.0);
        assert_eq!(snapshot.time_signature, TimeSignature::four_four());
        assert_eq!(snapshot.position(), MusicalTime::zero());
        assert!(snapshot.looping);
        assert_eq!(snapshot.loop_region, BarLoop { start_bar: 1, end_bar: 8 });
    }

    #[test]
    fn test_transport_control() {
        let (mut transport, clock) = transport_at(10.0);

        transport.play();
        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!(transport.current_position().start_time, 10.0);

        clock.advance(1.5);
        transport.pause();
        assert_eq!(transport.state(), TransportState::Paused);
        assert_eq!(transport.current_position().elapsed_time, 1.5);

        // Resume continues from the paused position
        clock.advance(100.0);
        transport.play();
        assert_eq!(transport.current_position().start_time, 111.5 - 1.5);

        transport.stop();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.current_position().elapsed_time, 0.0);
    }

    #[test]
    fn test_play_is_idempotent() {
        let (mut transport, clock) = transport_at(2.0);
        let log = event_log(&mut transport);

        transport.play();
        let start = transport.current_position().start_time;

        clock.advance(0.5);
        transport.play();
        assert_eq!(transport.current_position().start_time, start);

        let plays = log
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, TransportEvent::Play { .. }))
            .count();
        assert_eq!(plays, 1);
    }

    #[test]
    fn test_pause_when_not_playing_is_noop() {
        let (mut transport, _) = transport_at(0.0);
        let log = event_log(&mut transport);

        transport.pause();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_resets_from_any_state() {
        let (mut transport, clock) = transport_at(0.0);

        transport.play();
        clock.advance(3.3);
        transport.on_frame();
        assert_ne!(transport.current_position().position(), MusicalTime::zero());
        transport.stop();
        assert_eq!(transport.current_position().position(), MusicalTime::zero());
        assert_eq!(transport.current_position().elapsed_time, 0.0);

        transport.play();
        clock.advance(1.1);
        transport.pause();
        transport.stop();
        assert_eq!(transport.current_position().position(), MusicalTime::zero());
        assert_eq!(transport.current_position().elapsed_time, 0.0);

        // Stopping while stopped still publishes
        let log = event_log(&mut transport);
        transport.stop();
        assert!(matches!(log.lock().unwrap()[0], TransportEvent::Stop { .. }));
    }

    #[test]
    fn test_on_frame_position() {
        let (mut transport, clock) = transport_at(0.0);
        transport.play();

        // 120 BPM: 192 ticks per second. 2.25 s = 432 ticks = bar 2, beat 1, tick 48
        clock.set(2.25);
        let tick = transport.on_frame().unwrap();
        assert_eq!(tick.total_ticks, 432);
        assert_eq!((tick.bar, tick.beat, tick.tick), (2, 1, 48));
        assert_eq!(tick.time, 2.25);
        assert_eq!(transport.frames_since_play(), 1);
    }

    #[test]
    fn test_no_frames_after_pause_or_stop() {
        let (mut transport, clock) = transport_at(0.0);
        transport.play();
        let handle = transport.frame_handle().unwrap();

        transport.pause();
        assert!(handle.is_cancelled());
        clock.advance(1.0);
        assert!(transport.on_frame().is_none());

        transport.play();
        transport.stop();
        assert!(transport.on_frame().is_none());
        assert!(transport.frame_handle().is_none());
    }

    #[test]
    fn test_bar_loop_wraps_position() {
        let (mut transport, clock) = transport_at(0.0);
        transport.set_loop_region(2, 3);
        transport.play();

        // One bar lasts 2 s. At 7.0 s the raw position is bar 4 beat 3,
        // which wraps to bar 2 beat 3.
        clock.set(7.0);
        let tick = transport.on_frame().unwrap();
        assert_eq!((tick.bar, tick.beat, tick.tick), (2, 3, 0));
        assert_eq!(tick.total_ticks, 1344);

        // Before the loop start nothing wraps
        clock.set(1.0);
        let tick = transport.on_frame().unwrap();
        assert_eq!((tick.bar, tick.beat), (1, 3));
    }

    #[test]
    fn test_no_wrap_when_not_looping() {
        let (mut transport, clock) = transport_at(0.0);
        transport.set_looping(false);
        transport.play();

        clock.set(40.0);
        let tick = transport.on_frame().unwrap();
        assert_eq!(tick.bar, 21);
    }

    #[test]
    fn test_tempo_change_keeps_position() {
        let (mut transport, clock) = transport_at(5.0);
        transport.play();

        clock.set(7.0); // elapsed 2.0 s at 120 BPM
        let before = transport.on_frame().unwrap();
        let snapshot_before = transport.current_position();

        assert_eq!(transport.set_tempo(60.0), 60.0);
        assert_eq!(transport.current_position().position(), snapshot_before.position());

        let after = transport.on_frame().unwrap();
        assert!(after.total_ticks.abs_diff(before.total_ticks) <= 1);
        assert_eq!((after.bar, after.beat), (before.bar, before.beat));

        // Playback continues at the new rate: one second = one beat
        clock.advance(1.0);
        let later = transport.on_frame().unwrap();
        assert!(later.total_ticks.abs_diff(before.total_ticks + 96) <= 1);
    }

    #[test]
    fn test_tempo_change_while_paused_keeps_position() {
        let (mut transport, clock) = transport_at(0.0);
        transport.play();
        clock.set(3.0);
        transport.pause();
        let paused_at = transport.current_position().position();

        transport.set_tempo(240.0);
        clock.advance(10.0);
        transport.play();
        let tick = transport.on_frame().unwrap();
        assert_eq!(MusicalTime::new(tick.bar, tick.beat, tick.tick), paused_at);
    }

    #[test]
    fn test_tempo_clamping_and_event() {
        let (mut transport, _) = transport_at(0.0);
        let log = event_log(&mut transport);

        assert_eq!(transport.set_tempo(500.0), 300.0);
        assert_eq!(transport.set_tempo(1.0), 30.0);

        let events = log.lock().unwrap();
        assert_eq!(
            events[0],
            TransportEvent::TempoChange {
                tempo: 300.0,
                old_tempo: 120.0
            }
        );
        assert_eq!(
            events[1],
            TransportEvent::TempoChange {
                tempo: 30.0,
                old_tempo: 300.0
            }
        );
    }

    #[test]
    fn test_time_signature_change_keeps_elapsed() {
        let (mut transport, clock) = transport_at(0.0);
        transport.play();
        clock.set(1.75); // 336 ticks: bar 1, beat 4, tick 48 in 4/4
        transport.on_frame();
        assert_eq!(transport.current_position().current_beat, 4);

        transport.set_time_signature(3, 4);
        let snapshot = transport.current_position();
        assert_eq!(snapshot.elapsed_time, 1.75);
        // 336 ticks in 3/4: bar 2, beat 1, tick 48
        assert_eq!(snapshot.position(), MusicalTime::new(2, 1, 48));
        assert!(snapshot.current_beat <= snapshot.time_signature.numerator as u32);
    }

    #[test]
    fn test_loop_region_clamping_and_event() {
        let (mut transport, _) = transport_at(0.0);
        let log = event_log(&mut transport);

        transport.set_loop_region(0, 50);
        assert_eq!(transport.loop_region(), BarLoop { start_bar: 1, end_bar: 8 });

        transport.set_loop_region(5, 2);
        assert_eq!(transport.loop_region(), BarLoop { start_bar: 5, end_bar: 5 });

        assert_eq!(
            log.lock().unwrap()[0],
            TransportEvent::LoopRegionChange {
                start_bar: 1,
                end_bar: 8
            }
        );
    }

    #[test]
    fn test_failing_subscriber_does_not_corrupt_state() {
        let (mut transport, clock) = transport_at(0.0);
        transport.subscribe(
            "broken",
            Box::new(|_| Err(SubscriberError::Failed("renderer crashed".to_string()))),
        );
        let log = event_log(&mut transport);

        transport.play();
        clock.set(0.5);
        let tick = transport.on_frame().unwrap();

        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!((tick.bar, tick.beat), (1, 2));
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_conversions() {
        let (transport, _) = transport_at(0.0);

        assert_eq!(transport.bar_beat_tick_to_seconds(1, 1, 0), 0.0);
        assert_eq!(transport.bar_beat_tick_to_seconds(2, 1, 0), 2.0);
        assert_eq!(transport.bar_beat_tick_to_seconds(1, 2, 48), 0.75);

        assert_eq!(transport.seconds_to_bar_beat_tick(0.75), MusicalTime::new(1, 2, 48));
    }

    #[test]
    fn test_suspended_clock_is_resumed_on_play() {
        let clock = SampleClock::suspended(48000.0);
        let mut transport = Transport::with_defaults(Arc::new(clock.clone()));

        transport.play();
        assert!(!clock.is_suspended());
        assert!(transport.state().is_playing());

        clock.advance(24000);
        let tick = transport.on_frame().unwrap();
        assert_eq!((tick.bar, tick.beat, tick.tick), (1, 2, 0));
    }

    #[test]
    fn test_toggle_play() {
        let (mut transport, _) = transport_at(0.0);

        transport.toggle_play();
        assert_eq!(transport.state(), TransportState::Playing);

        transport.toggle_play();
        assert_eq!(transport.state(), TransportState::Paused);

        transport.toggle_play();
        assert_eq!(transport.state(), TransportState::Playing);
    }

    #[test]
    fn test_queued_commands_apply_in_order() {
        let (mut transport, clock) = transport_at(0.0);
        let control = transport.control();

        control.send(TransportCommand::SetTempo(60.0)).unwrap();
        control.send(TransportCommand::SetLoopRegion(2, 3)).unwrap();
        control.send(TransportCommand::Play).unwrap();
        // Nothing happens until the owner drains the queue
        assert_eq!(transport.state(), TransportState::Stopped);

        assert!(transport.process_commands());
        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!(transport.tempo().bpm(), 60.0);
        assert_eq!(transport.loop_region(), BarLoop { start_bar: 2, end_bar: 3 });

        clock.set(1.0);
        let tick = transport.on_frame().unwrap();
        assert_eq!((tick.bar, tick.beat), (1, 2));
    }

    #[test]
    fn test_shutdown_command_stops_draining() {
        let (mut transport, _) = transport_at(0.0);
        let control = transport.control();

        control.send(TransportCommand::Shutdown).unwrap();
        control.send(TransportCommand::Play).unwrap();
        assert!(!transport.process_commands());
        assert_eq!(transport.state(), TransportState::Stopped);

        // The command behind the shutdown is still queued
        assert!(transport.process_commands());
        assert_eq!(transport.state(), TransportState::Playing);
    }
}
