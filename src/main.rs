use ringbuf::traits::Consumer;
use seqclock::project::validate_settings;
use seqclock::sequencer::frame::DEFAULT_FRAME_RATE;
use seqclock::sequencer::{NoteGrid, NoteName, NoteParseError, StepNote};
use seqclock::{
    AudioClock, DeviceClock, SequencerSettings, StepListener, StepScheduler, StepTranslator,
    SystemClock, Transport, TransportEngine, create_note_channel, load_settings,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const NOTE_RINGBUFFER_CAPACITY: usize = 256;
const STATUS_INTERVAL: Duration = Duration::from_millis(250);

/// Minimal stderr logger, level taken from SEQCLOCK_LOG
struct StderrLogger {
    level: log::LevelFilter,
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging() {
    let level = std::env::var("SEQCLOCK_LOG")
        .ok()
        .and_then(|value| value.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);

    let logger = Box::new(StderrLogger { level });
    if log::set_boxed_logger(logger).is_ok() {
        log::set_max_level(level);
    }
}

/// Prints a marker at every bar start
struct BarPrinter {
    steps_per_bar: u64,
}

impl StepListener for BarPrinter {
    fn on_step(&mut self, step: u64, time: f64) {
        if step % self.steps_per_bar == 0 {
            println!("  | bar {:>2}  (t = {:.3}s)", step / self.steps_per_bar + 1, time);
        }
    }

    fn on_play(&mut self) {
        println!("  > play");
    }

    fn on_pause(&mut self) {
        println!("  || pause");
    }

    fn on_stop(&mut self) {
        println!("  [] stop");
    }
}

/// Four-on-the-floor kick with an off-beat hat and a bass line on the one
fn demo_grid(total_steps: u64, steps_per_beat: u64) -> Result<NoteGrid, NoteParseError> {
    let grid = NoteGrid::new();
    let kick = NoteName::parse("C2")?;
    let hat = NoteName::parse("F#3")?;
    let bass = NoteName::parse("A1")?;

    for step in 0..total_steps {
        if step % steps_per_beat == 0 {
            grid.insert(step, StepNote::new(kick, 1.0, 1));
        }
        if steps_per_beat > 1 && step % steps_per_beat == steps_per_beat / 2 {
            grid.insert(step, StepNote::new(hat, 0.6, 1));
        }
        if step % (steps_per_beat * 4) == 0 {
            grid.insert(step, StepNote::new(bass, 0.9, 2));
        }
    }
    Ok(grid)
}

fn main() {
    init_logging();

    println!("=== seqclock ===");
    println!("Version {} - transport demo\n", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let bpm = match args.next().map(|arg| arg.parse::<f64>()) {
        None => None,
        Some(Ok(bpm)) => Some(bpm),
        Some(Err(e)) => {
            eprintln!("ERROR: invalid BPM: {}", e);
            return;
        }
    };
    let seconds = match args.next().map(|arg| arg.parse::<f64>()) {
        None => 4.0,
        Some(Ok(seconds)) if seconds.is_finite() && seconds > 0.0 => seconds,
        Some(_) => {
            eprintln!("ERROR: run time must be a positive number of seconds");
            return;
        }
    };

    let settings = match args.next().map(PathBuf::from) {
        None => SequencerSettings::default(),
        Some(path) => match load_settings(&path) {
            Ok(settings) => {
                println!("Settings loaded from {}", path.display());
                settings
            }
            Err(e) => {
                eprintln!("ERROR: {}", e);
                return;
            }
        },
    };
    if let Err(e) = validate_settings(&settings) {
        log::warn!("{}; out-of-range values will be clamped", e);
    }

    let clock: Arc<dyn AudioClock> = match DeviceClock::open_default() {
        Ok(clock) => {
            println!("Audio clock: {}", clock.device_name());
            Arc::new(clock)
        }
        Err(e) => {
            log::warn!("{}; falling back to the system clock", e);
            Arc::new(SystemClock::new())
        }
    };
    let mut transport = Transport::new(clock, settings.transport.clone());
    if let Some(bpm) = bpm {
        transport.set_tempo(bpm);
    }

    let mut translator = StepTranslator::with_settings(&settings.translator);
    if let Err(e) = translator.connect_to_timer(&transport) {
        log::warn!("{}; resizing the step grid to the transport", e);
        translator.size_to_transport(&transport);
        if let Err(e) = translator.connect_to_timer(&transport) {
            eprintln!("ERROR: {}", e);
            return;
        }
    }

    let mapping = translator.mapping();
    let grid = match demo_grid(mapping.total_steps(), mapping.steps_per_beat()) {
        Ok(grid) => grid,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };
    let (note_tx, mut note_rx) = create_note_channel(NOTE_RINGBUFFER_CAPACITY);
    let scheduler = StepScheduler::linked(Box::new(grid), translator.timing_handle())
        .with_output(note_tx);

    translator.add_listener(Box::new(BarPrinter {
        steps_per_bar: mapping.steps_per_bar(),
    }));
    translator.add_listener(Box::new(scheduler));

    println!(
        "Tempo {:.1} BPM, {} time, {} steps at 1/{}",
        transport.tempo().bpm(),
        transport.time_signature(),
        mapping.total_steps(),
        mapping.subdivision()
    );

    let mut engine = match TransportEngine::spawn(transport, DEFAULT_FRAME_RATE) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };

    println!("\n=== Transport started ! ===\n");
    if let Err(e) = engine.play() {
        eprintln!("ERROR: {}", e);
        return;
    }

    let run_until = Instant::now() + Duration::from_secs_f64(seconds);
    let mut notes_played = 0usize;
    while Instant::now() < run_until {
        thread::sleep(STATUS_INTERVAL);

        while let Some(note) = note_rx.try_pop() {
            log::debug!(
                "note {} ({:.1} Hz) {:.3}s -> {:.3}s",
                note.pitch,
                note.frequency,
                note.start,
                note.end
            );
            notes_played += 1;
        }

        let snapshot = engine.snapshot();
        log::info!(
            "{} step {:>2}  {:.2}s",
            snapshot.position(),
            translator.current_step(),
            snapshot.elapsed_time
        );
    }

    match engine.shutdown() {
        Ok(transport) => {
            println!(
                "\n{} notes scheduled, transport {:?} at {}",
                notes_played,
                transport.state(),
                transport.current_position().position()
            );
        }
        Err(e) => eprintln!("ERROR: {}", e),
    }
    translator.disconnect();
}
