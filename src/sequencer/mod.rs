// Sequencer module
// Musical clock, transport state machine, and step translation

pub mod engine;
pub mod events;
pub mod frame;
pub mod loop_region;
pub mod note;
pub mod scheduler;
pub mod step_translator;
pub mod subscribers;
pub mod timeline;
pub mod transport;

pub use engine::{EngineError, TransportEngine};
pub use events::{TickData, TransportEvent};
pub use frame::{FrameHandle, FramePacer, FrameTask};
pub use loop_region::{BarLoop, LoopConsistencyError, StepLoop, StepMapping};
pub use note::{NoteName, NoteParseError, NoteRange};
pub use scheduler::{NoteGrid, ScheduledNote, StepNote, StepNotes, StepScheduler};
pub use step_translator::{
    StepInfo, StepListener, StepTiming, StepTranslator, TimingHandle, TranslatorSettings,
};
pub use subscribers::{SubscriberCallback, SubscriberError, SubscriberRegistry};
pub use timeline::{MusicalTime, Tempo, TimeSignature};
pub use transport::{Transport, TransportConfig, TransportSnapshot, TransportState};
