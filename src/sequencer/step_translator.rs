// Step translator - Turns transport ticks into grid steps
// Publishes `on_step` once per distinct step and `on_visual_update` on every tick

use super::events::{TickData, TransportEvent};
use super::loop_region::{BarLoop, LoopConsistencyError, StepLoop, StepMapping};
use super::subscribers::SubscriberRegistry;
use super::timeline::{Tempo, TimeSignature};
use super::transport::Transport;
use crate::messaging::channels::TransportControl;
use crate::messaging::command::TransportCommand;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Id the translator subscribes to the transport under
pub const TRANSLATOR_SUBSCRIBER_ID: &str = "step-translator";

/// Consumer of step notifications (renderer, sound scheduler)
///
/// Listeners run on the thread that drives the transport. They may call the
/// translator's setters but must not feed ticks back into it.
pub trait StepListener: Send {
    /// The playhead entered a new step. Fires once per distinct step.
    fn on_step(&mut self, _step: u64, _time: f64) {}

    /// Fires on every transport tick, for smooth playhead drawing
    fn on_visual_update(&mut self, _time: f64, _step: u64) {}

    fn on_play(&mut self) {}

    fn on_pause(&mut self) {}

    fn on_stop(&mut self) {}
}

/// Exportable translator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorSettings {
    pub tempo: f64,
    pub time_signature: TimeSignature,
    pub subdivision: u32,
    pub total_steps: u64,
    pub loop_start: u64,
    pub loop_end: u64,
    pub looping: bool,
    /// Swing amount in percent (0-100)
    pub swing: f64,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            time_signature: TimeSignature::four_four(),
            subdivision: StepMapping::DEFAULT_SUBDIVISION,
            total_steps: StepMapping::DEFAULT_TOTAL_STEPS,
            loop_start: 0,
            loop_end: StepMapping::DEFAULT_TOTAL_STEPS - 1,
            looping: true,
            swing: 0.0,
        }
    }
}

/// Where a step sits on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepInfo {
    pub step: u64,
    /// 1-based
    pub bar: u64,
    /// 1-based
    pub beat: u64,
    /// 1-based position inside the beat
    pub subdivision: u64,
    pub is_bar_start: bool,
    pub is_beat_start: bool,
    pub is_loop_start: bool,
    pub is_loop_end: bool,
}

/// Step length and swing at one moment
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepTiming {
    /// Seconds per step
    pub step_duration: f64,
    /// Swing amount in percent (0-100)
    pub swing: f64,
}

impl StepTiming {
    /// Delay applied to `step`: odd steps are pushed back by up to half a step
    pub fn swing_offset(&self, step: u64) -> f64 {
        if step % 2 == 0 {
            return 0.0;
        }
        (self.swing / 100.0) * self.step_duration / 2.0
    }
}

/// Read-only view of a translator's timing, usable from its listeners
#[derive(Clone)]
pub struct TimingHandle {
    core: Arc<Mutex<TranslatorCore>>,
}

impl TimingHandle {
    pub fn timing(&self) -> StepTiming {
        lock(&self.core).timing()
    }
}

impl std::fmt::Debug for TimingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TimingHandle").field(&self.timing()).finish()
    }
}

/// What the listeners must be told after an event was applied
enum Dispatch {
    Tick {
        step: u64,
        time: f64,
        step_changed: bool,
    },
    Play,
    Pause,
    Stop,
    Nothing,
}

/// Translator state; written only by event handling and the setters
struct TranslatorCore {
    mapping: StepMapping,
    tempo: Tempo,
    swing: f64,
    looping: bool,
    loop_region: StepLoop,
    current_step: u64,
    last_dispatched: Option<u64>,
    is_playing: bool,
    /// Transport looping flag and bar loop while connected
    linked_loop: Option<(bool, BarLoop)>,
}

impl TranslatorCore {
    fn new(settings: &TranslatorSettings) -> Self {
        let mut core = Self {
            mapping: StepMapping::default(),
            tempo: Tempo::default(),
            swing: 0.0,
            looping: true,
            loop_region: StepLoop::full(StepMapping::DEFAULT_TOTAL_STEPS),
            current_step: 0,
            last_dispatched: None,
            is_playing: false,
            linked_loop: None,
        };
        core.import(settings);
        core
    }

    /// Apply settings; while connected the transport keeps tempo, signature and loop
    fn import(&mut self, settings: &TranslatorSettings) {
        let linked = self.linked_loop.is_some();
        let time_signature = if linked {
            self.mapping.time_signature()
        } else {
            self.tempo = Tempo::new(settings.tempo);
            settings.time_signature.sanitized()
        };
        self.mapping = StepMapping::new(settings.subdivision, time_signature, settings.total_steps);
        self.swing = clamp_swing(settings.swing);

        let requested = StepLoop::clamped(
            settings.loop_start,
            settings.loop_end,
            self.mapping.total_steps(),
        );
        if linked {
            self.follow_transport_loop();
            if requested != self.loop_region || settings.looping != self.looping {
                log::debug!(
                    "Imported loop {}..={} ignored, the transport owns the loop",
                    requested.start,
                    requested.end
                );
            }
        } else {
            self.loop_region = requested;
            self.looping = settings.looping;
        }

        if self.current_step >= self.mapping.total_steps() {
            self.current_step = 0;
        }
    }

    fn export(&self) -> TranslatorSettings {
        TranslatorSettings {
            tempo: self.tempo.bpm(),
            time_signature: self.mapping.time_signature(),
            subdivision: self.mapping.subdivision(),
            total_steps: self.mapping.total_steps(),
            loop_start: self.loop_region.start,
            loop_end: self.loop_region.end,
            looping: self.looping,
            swing: self.swing,
        }
    }

    fn update_current_step(&mut self, step: u64) -> u64 {
        let total_steps = self.mapping.total_steps();
        self.current_step = if self.looping {
            self.loop_region.wrap(step, total_steps)
        } else {
            step % total_steps
        };
        self.current_step
    }

    fn handle_tick(&mut self, tick: &TickData) -> Dispatch {
        let step = self
            .mapping
            .bar_beat_tick_to_step(tick.bar, tick.beat, tick.tick);
        let current = self.update_current_step(step);

        let step_changed = self.last_dispatched != Some(current);
        if step_changed {
            self.last_dispatched = Some(current);
        }

        Dispatch::Tick {
            step: current,
            time: tick.time,
            step_changed,
        }
    }

    fn apply_event(&mut self, event: &TransportEvent) -> Dispatch {
        match *event {
            TransportEvent::Tick(ref tick) => self.handle_tick(tick),
            TransportEvent::Play { .. } => {
                self.is_playing = true;
                Dispatch::Play
            }
            TransportEvent::Pause { .. } => {
                self.is_playing = false;
                Dispatch::Pause
            }
            TransportEvent::Stop { .. } => {
                self.is_playing = false;
                self.current_step = 0;
                self.last_dispatched = None;
                Dispatch::Stop
            }
            TransportEvent::TempoChange { tempo, .. } => {
                self.tempo = Tempo::new(tempo);
                Dispatch::Nothing
            }
            TransportEvent::TimeSignatureChange {
                numerator,
                denominator,
            } => {
                self.mapping
                    .set_time_signature(TimeSignature::new(numerator, denominator));
                self.follow_transport_loop();
                Dispatch::Nothing
            }
            TransportEvent::LoopChange { enabled } => {
                if let Some((looping, _)) = self.linked_loop.as_mut() {
                    *looping = enabled;
                }
                self.follow_transport_loop();
                Dispatch::Nothing
            }
            TransportEvent::LoopRegionChange { start_bar, end_bar } => {
                if let Some((_, bar_loop)) = self.linked_loop.as_mut() {
                    *bar_loop = BarLoop { start_bar, end_bar };
                }
                self.follow_transport_loop();
                Dispatch::Nothing
            }
        }
    }

    /// Mirror the transport's tempo, signature and loop
    ///
    /// Refused, leaving the translator untouched, when the transport loops
    /// over bars that do not fit on the step grid.
    fn link_transport(&mut self, transport: &Transport) -> Result<(), LoopConsistencyError> {
        let mut mapping = self.mapping;
        mapping.set_time_signature(transport.time_signature());
        if transport.is_looping() {
            mapping.fits_bar_loop(&transport.loop_region())?;
        }

        self.tempo = transport.tempo();
        self.mapping = mapping;
        self.linked_loop = Some((transport.is_looping(), transport.loop_region()));
        self.follow_transport_loop();
        Ok(())
    }

    /// Re-derive the step loop from the transport's bar loop
    fn follow_transport_loop(&mut self) {
        if let Some((looping, bar_loop)) = self.linked_loop {
            self.looping = looping;
            self.loop_region = self.mapping.bar_loop_to_steps(&bar_loop);
            self.warn_if_diverged();
        }
    }

    fn reclamp(&mut self) {
        if self.linked_loop.is_some() {
            self.follow_transport_loop();
        } else {
            self.loop_region = StepLoop::clamped(
                self.loop_region.start,
                self.loop_region.end,
                self.mapping.total_steps(),
            );
        }
        if self.current_step >= self.mapping.total_steps() {
            self.current_step = 0;
        }
    }

    fn check_loop_consistency(&self) -> Result<(), LoopConsistencyError> {
        let Some((bar_looping, bar_loop)) = self.linked_loop else {
            return Ok(());
        };
        if bar_looping != self.looping {
            return Err(LoopConsistencyError::LoopingMismatch {
                step_looping: self.looping,
                bar_looping,
            });
        }
        if !self.looping {
            return Ok(());
        }
        self.mapping.check_consistency(&bar_loop, &self.loop_region)
    }

    fn warn_if_diverged(&self) {
        if let Err(err) = self.check_loop_consistency() {
            log::warn!("Step loop no longer matches the transport: {}", err);
        }
    }

    fn steps_per_second(&self) -> f64 {
        (self.tempo.bpm() / 60.0) * self.mapping.steps_per_beat() as f64
    }

    fn timing(&self) -> StepTiming {
        StepTiming {
            step_duration: 1.0 / self.steps_per_second(),
            swing: self.swing,
        }
    }
}

fn clamp_swing(swing: f64) -> f64 {
    if swing.is_nan() {
        0.0
    } else {
        swing.clamp(0.0, 100.0)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Listeners = Arc<Mutex<Vec<Box<dyn StepListener>>>>;

/// Apply a transport event, then notify listeners with the state lock released
fn dispatch_event(
    core: &Mutex<TranslatorCore>,
    listeners: &Mutex<Vec<Box<dyn StepListener>>>,
    event: &TransportEvent,
) {
    let dispatch = lock(core).apply_event(event);

    let mut listeners = lock(listeners);
    match dispatch {
        Dispatch::Tick {
            step,
            time,
            step_changed,
        } => {
            for listener in listeners.iter_mut() {
                if step_changed {
                    listener.on_step(step, time);
                }
                listener.on_visual_update(time, step);
            }
        }
        Dispatch::Play => listeners.iter_mut().for_each(|l| l.on_play()),
        Dispatch::Pause => listeners.iter_mut().for_each(|l| l.on_pause()),
        Dispatch::Stop => listeners.iter_mut().for_each(|l| l.on_stop()),
        Dispatch::Nothing => {}
    }
}

/// Subscription and command queue of the connected transport
struct Connection {
    registry: SubscriberRegistry,
    control: TransportControl,
}

/// Converts the transport's bar/beat/tick stream into step indices
///
/// While connected, the transport owns tempo, time signature and loop: the
/// matching setters queue a command for it and the translator follows the
/// resulting event.
pub struct StepTranslator {
    core: Arc<Mutex<TranslatorCore>>,
    listeners: Listeners,
    timer: Option<Connection>,
}

impl StepTranslator {
    /// 16th-note grid of 32 steps, looping over all of them
    pub fn new() -> Self {
        Self::with_settings(&TranslatorSettings::default())
    }

    pub fn with_settings(settings: &TranslatorSettings) -> Self {
        Self {
            core: Arc::new(Mutex::new(TranslatorCore::new(settings))),
            listeners: Arc::new(Mutex::new(Vec::new())),
            timer: None,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn StepListener>) {
        lock(&self.listeners).push(listener);
    }

    pub fn clear_listeners(&mut self) {
        lock(&self.listeners).clear();
    }

    // ---- Transport connection ----

    /// Subscribe to `timer` and mirror its tempo, signature and loop
    ///
    /// Replaces any previous connection. Fails, leaving the translator
    /// disconnected, when the transport's bar loop runs past the step grid.
    pub fn connect_to_timer(&mut self, timer: &Transport) -> Result<(), LoopConsistencyError> {
        self.disconnect();
        if let Err(err) = lock(&self.core).link_transport(timer) {
            log::warn!("Step translator not connected: {}", err);
            return Err(err);
        }

        let core = Arc::clone(&self.core);
        let listeners = Arc::clone(&self.listeners);
        let registry = timer.registry();
        registry.subscribe(
            TRANSLATOR_SUBSCRIBER_ID,
            Box::new(move |event| {
                dispatch_event(&core, &listeners, event);
                Ok(())
            }),
        );
        self.timer = Some(Connection {
            registry,
            control: timer.control(),
        });
        log::debug!("Step translator connected to transport");
        Ok(())
    }

    /// Drop the transport subscription. Does nothing if not connected.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.timer.take() {
            connection.registry.unsubscribe(TRANSLATOR_SUBSCRIBER_ID);
            lock(&self.core).linked_loop = None;
            log::debug!("Step translator disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.timer.is_some()
    }

    /// Queue `command` for the connected transport
    fn forward(&self, command: TransportCommand) -> bool {
        let Some(connection) = self.timer.as_ref() else {
            return false;
        };
        match connection.control.send(command) {
            Ok(()) => true,
            Err(rejected) => {
                log::warn!("Transport command queue full, dropping {:?}", rejected);
                false
            }
        }
    }

    // ---- Transport controls ----

    /// Ask the connected transport to play. Returns false when not connected.
    pub fn start(&self) -> bool {
        self.forward(TransportCommand::Play)
    }

    pub fn pause(&self) -> bool {
        self.forward(TransportCommand::Pause)
    }

    pub fn stop(&self) -> bool {
        self.forward(TransportCommand::Stop)
    }

    // ---- Event handling ----

    /// Apply a transport event as if it came from the subscription
    pub fn handle_event(&self, event: &TransportEvent) {
        dispatch_event(&self.core, &self.listeners, event);
    }

    /// Convert a tick to a step and notify listeners
    pub fn handle_timer_tick(&self, tick: &TickData) {
        self.handle_event(&TransportEvent::Tick(*tick));
    }

    /// Apply loop wrapping to `step` and store it as the current step
    pub fn update_current_step(&self, step: u64) -> u64 {
        lock(&self.core).update_current_step(step)
    }

    // ---- Conversions ----

    pub fn bar_beat_tick_to_step(&self, bar: u32, beat: u32, tick: u32) -> u64 {
        lock(&self.core).mapping.bar_beat_tick_to_step(bar, beat, tick)
    }

    /// Seconds from the start of the sequence to `step`
    pub fn step_to_time(&self, step: u64) -> f64 {
        step as f64 / lock(&self.core).steps_per_second()
    }

    /// Step reached after `time` seconds (floored)
    pub fn time_to_step(&self, time: f64) -> u64 {
        (time.max(0.0) * lock(&self.core).steps_per_second()).floor() as u64
    }

    /// Duration of one step in seconds
    pub fn step_duration(&self) -> f64 {
        self.step_to_time(1)
    }

    /// Swing delay applied to `step`
    pub fn swing_offset(&self, step: u64) -> f64 {
        self.timing().swing_offset(step)
    }

    pub fn timing(&self) -> StepTiming {
        lock(&self.core).timing()
    }

    /// Shared view of the live timing, for listeners such as the scheduler
    pub fn timing_handle(&self) -> TimingHandle {
        TimingHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// `step_to_time` with swing applied
    pub fn swung_step_time(&self, step: u64) -> f64 {
        self.step_to_time(step) + self.swing_offset(step)
    }

    pub fn step_info(&self, step: u64) -> StepInfo {
        let core = lock(&self.core);
        let steps_per_beat = core.mapping.steps_per_beat();
        let steps_per_bar = core.mapping.steps_per_bar();

        StepInfo {
            step,
            bar: step / steps_per_bar + 1,
            beat: (step % steps_per_bar) / steps_per_beat + 1,
            subdivision: step % steps_per_beat + 1,
            is_bar_start: step % steps_per_bar == 0,
            is_beat_start: step % steps_per_beat == 0,
            is_loop_start: step == core.loop_region.start,
            is_loop_end: step == core.loop_region.end,
        }
    }

    // ---- Configuration ----

    /// Set the sequence length (at least 1 step); the loop is re-clamped
    pub fn set_total_steps(&self, total_steps: u64) {
        let mut core = lock(&self.core);
        core.mapping.set_total_steps(total_steps);
        core.reclamp();
    }

    /// Set the inclusive step loop, clamped into `[0, total_steps - 1]`
    ///
    /// While connected the window must cover whole bars; it is sent to the
    /// transport as a bar loop. Other windows are refused.
    pub fn set_loop_region(&self, start: u64, end: u64) -> Result<(), LoopConsistencyError> {
        let bar_loop = {
            let mut core = lock(&self.core);
            let window = StepLoop::clamped(start, end, core.mapping.total_steps());
            if self.timer.is_none() {
                core.loop_region = window;
                return Ok(());
            }

            let Some(bar_loop) = core.mapping.aligned_bar_loop(&window) else {
                let covering = core.mapping.steps_to_bar_loop(&window);
                let expected = core.mapping.bar_loop_window(&covering);
                return Err(LoopConsistencyError::Diverged {
                    expected_start: expected.start,
                    expected_end: expected.end,
                    actual_start: window.start,
                    actual_end: window.end,
                });
            };
            bar_loop
        };

        self.forward(TransportCommand::SetLoopRegion(
            bar_loop.start_bar,
            bar_loop.end_bar,
        ));
        Ok(())
    }

    /// Enable or disable step looping; forwarded to the transport when connected
    pub fn set_looping(&self, enabled: bool) {
        if self.timer.is_some() {
            self.forward(TransportCommand::SetLooping(enabled));
        } else {
            lock(&self.core).looping = enabled;
        }
    }

    /// Resize the grid to cover every bar of `transport`
    pub fn size_to_transport(&self, transport: &Transport) {
        let mut core = lock(&self.core);
        let mut mapping = core.mapping;
        mapping.set_time_signature(transport.time_signature());
        core.mapping
            .set_total_steps(transport.total_bars() as u64 * mapping.steps_per_bar());
        core.reclamp();
    }

    /// Set the grid resolution (4, 8, 16 or 32; other values are snapped)
    pub fn set_subdivision(&self, subdivision: u32) {
        let mut core = lock(&self.core);
        core.mapping.set_subdivision(subdivision);
        core.reclamp();
    }

    /// Set swing in percent, clamped to [0, 100]
    pub fn set_swing(&self, swing: f64) {
        lock(&self.core).swing = clamp_swing(swing);
    }

    /// Set the tempo, clamped to [30, 300] BPM. Returns the clamped value.
    ///
    /// When connected the change goes to the transport and the cached tempo
    /// follows its `TempoChange` event.
    pub fn set_tempo(&self, bpm: f64) -> f64 {
        let tempo = Tempo::new(bpm);
        if self.timer.is_some() {
            self.forward(TransportCommand::SetTempo(tempo.bpm()));
        } else {
            lock(&self.core).tempo = tempo;
        }
        tempo.bpm()
    }

    /// Set the time signature; forwarded to the transport when connected
    pub fn set_time_signature(&self, numerator: u8, denominator: u8) {
        if self.timer.is_some() {
            self.forward(TransportCommand::SetTimeSignature(numerator, denominator));
            return;
        }
        let mut core = lock(&self.core);
        core.mapping
            .set_time_signature(TimeSignature::new(numerator, denominator));
        core.reclamp();
    }

    pub fn export_settings(&self) -> TranslatorSettings {
        lock(&self.core).export()
    }

    /// Apply exported settings
    ///
    /// While connected, tempo, signature and loop stay with the transport.
    pub fn import_settings(&self, settings: &TranslatorSettings) {
        lock(&self.core).import(settings);
    }

    /// Check the step loop against the connected transport's bar loop
    pub fn check_loop_consistency(&self) -> Result<(), LoopConsistencyError> {
        lock(&self.core).check_loop_consistency()
    }

    // ---- Queries ----

    pub fn current_step(&self) -> u64 {
        lock(&self.core).current_step
    }

    pub fn tempo(&self) -> f64 {
        lock(&self.core).tempo.bpm()
    }

    pub fn time_signature(&self) -> TimeSignature {
        lock(&self.core).mapping.time_signature()
    }

    pub fn mapping(&self) -> StepMapping {
        lock(&self.core).mapping
    }

    pub fn loop_region(&self) -> StepLoop {
        lock(&self.core).loop_region
    }

    pub fn is_looping(&self) -> bool {
        lock(&self.core).looping
    }

    pub fn swing(&self) -> f64 {
        lock(&self.core).swing
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.core).is_playing
    }
}

impl Default for StepTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StepTranslator {
    fn drop(&mut self) {
        self.disconnect();
    }
}
