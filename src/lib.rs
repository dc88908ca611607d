// seqclock - Library exports for tests and benchmarks

pub mod audio;
pub mod messaging;
pub mod project;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::device::{DeviceClock, DeviceError};
pub use audio::timing::{AudioClock, ClockError, ManualClock, SampleClock, SystemClock};
pub use messaging::channels::{create_command_channel, create_note_channel};
pub use messaging::command::TransportCommand;
pub use project::{SequencerSettings, SettingsError, load_settings, save_settings};
pub use sequencer::{
    MusicalTime, StepListener, StepScheduler, StepTranslator, Tempo, TickData, TimeSignature,
    Transport, TransportConfig, TransportEngine, TransportEvent, TransportState,
};
