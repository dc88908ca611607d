// Transport events - Closed set of notifications published by the transport
// Each variant carries a fixed-shape payload

use serde::{Deserialize, Serialize};

/// Position published on every frame while playing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickData {
    /// Bar (1-based, already loop-wrapped)
    pub bar: u32,
    /// Beat within bar (1-based)
    pub beat: u32,
    /// Tick within beat (0-based)
    pub tick: u32,
    /// Ticks since playback start, not loop-wrapped
    pub total_ticks: u64,
    /// Clock time of this frame in seconds
    pub time: f64,
}

/// Event delivered to transport subscribers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransportEvent {
    Play {
        time: f64,
    },
    Pause {
        time: f64,
    },
    Stop {
        time: f64,
    },
    Tick(TickData),
    TempoChange {
        tempo: f64,
        old_tempo: f64,
    },
    TimeSignatureChange {
        numerator: u8,
        denominator: u8,
    },
    LoopChange {
        enabled: bool,
    },
    /// Bar-domain loop region, inclusive
    LoopRegionChange {
        start_bar: u32,
        end_bar: u32,
    },
}

impl TransportEvent {
    /// Event name as used in logs and in the JSON `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Play { .. } => "play",
            TransportEvent::Pause { .. } => "pause",
            TransportEvent::Stop { .. } => "stop",
            TransportEvent::Tick(_) => "tick",
            TransportEvent::TempoChange { .. } => "tempoChange",
            TransportEvent::TimeSignatureChange { .. } => "timeSignatureChange",
            TransportEvent::LoopChange { .. } => "loopChange",
            TransportEvent::LoopRegionChange { .. } => "loopRegionChange",
        }
    }
}
