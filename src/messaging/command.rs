// Transport commands - Control thread → engine thread

use crate::sequencer::subscribers::{SubscriberCallback, SubscriberId};
use std::fmt;

/// A request applied by the engine at the start of its next frame
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
    TogglePlay,
    SetTempo(f64),
    SetTimeSignature(u8, u8),
    SetLooping(bool),
    /// Inclusive bar range, 1-based
    SetLoopRegion(u32, u32),
    Subscribe {
        id: SubscriberId,
        callback: SubscriberCallback,
    },
    Unsubscribe(SubscriberId),
    Shutdown,
}

impl fmt::Debug for TransportCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => write!(f, "Play"),
            Self::Pause => write!(f, "Pause"),
            Self::Stop => write!(f, "Stop"),
            Self::TogglePlay => write!(f, "TogglePlay"),
            Self::SetTempo(bpm) => f.debug_tuple("SetTempo").field(bpm).finish(),
            Self::SetTimeSignature(n, d) => {
                f.debug_tuple("SetTimeSignature").field(n).field(d).finish()
            }
            Self::SetLooping(enabled) => f.debug_tuple("SetLooping").field(enabled).finish(),
            Self::SetLoopRegion(start, end) => {
                f.debug_tuple("SetLoopRegion").field(start).field(end).finish()
            }
            Self::Subscribe { id, .. } => f.debug_struct("Subscribe").field("id", id).finish(),
            Self::Unsubscribe(id) => f.debug_tuple("Unsubscribe").field(id).finish(),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}
