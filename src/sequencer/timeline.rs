// Timeline - Musical time representation
// Handles conversion between seconds, ticks, and bar/beat/tick positions

use std::fmt;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    pub const MAX_NUMERATOR: u8 = 16;
    pub const MAX_DENOMINATOR: u8 = 32;

    /// Creates a new time signature, clamping out-of-range input
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator: numerator.clamp(1, Self::MAX_NUMERATOR),
            denominator: denominator.clamp(1, Self::MAX_DENOMINATOR),
        }
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// Number of beats per bar
    pub fn beats_per_bar(&self) -> u32 {
        self.numerator as u32
    }

    /// Ticks in one bar at the fixed tick resolution
    pub fn ticks_per_bar(&self) -> u64 {
        MusicalTime::TICKS_PER_BEAT as u64 * self.numerator as u64
    }

    /// Re-apply the clamping rules (used after deserialization)
    pub fn sanitized(self) -> Self {
        Self::new(self.numerator, self.denominator)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (Beats Per Minute)
///
/// Always inside `[MIN_BPM, MAX_BPM]`; out-of-range input is clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 30.0;
    pub const MAX_BPM: f64 = 300.0;

    /// Creates a new tempo, clamping to the supported range
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: Self::clamp_bpm(bpm),
        }
    }

    /// Clamp a raw BPM value. NaN falls back to the default tempo.
    pub fn clamp_bpm(bpm: f64) -> f64 {
        if bpm.is_nan() {
            return 120.0;
        }
        bpm.clamp(Self::MIN_BPM, Self::MAX_BPM)
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Ticks elapsed per second: (bpm / 60) * ticks per beat
    pub fn ticks_per_second(&self) -> f64 {
        (self.bpm / 60.0) * MusicalTime::TICKS_PER_BEAT as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Musical time representation
/// Represents a position in the timeline using bars, beats, and ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MusicalTime {
    pub bar: u32,  // Bar number (1-based)
    pub beat: u32, // Beat within bar (1-based)
    pub tick: u32, // Tick within beat (0-based)
}

impl MusicalTime {
    /// Ticks per beat, fixed MIDI-style resolution
    pub const TICKS_PER_BEAT: u32 = 96;

    /// Creates a new musical time position
    pub fn new(bar: u32, beat: u32, tick: u32) -> Self {
        Self { bar, beat, tick }
    }

    /// Zero position (bar 1, beat 1, tick 0)
    pub fn zero() -> Self {
        Self::new(1, 1, 0)
    }

    /// Convert to total ticks from start
    ///
    /// Bar and beat below 1 are treated as 1.
    pub fn to_total_ticks(&self, time_signature: &TimeSignature) -> u64 {
        let ticks_per_beat = Self::TICKS_PER_BEAT as u64;
        let beats_per_bar = time_signature.numerator as u64;

        // Convert to 0-based for calculation
        let bar_0 = self.bar.saturating_sub(1) as u64;
        let beat_0 = self.beat.saturating_sub(1) as u64;

        (bar_0 * beats_per_bar + beat_0) * ticks_per_beat + self.tick as u64
    }

    /// Create from total ticks
    pub fn from_total_ticks(total_ticks: u64, time_signature: &TimeSignature) -> Self {
        let ticks_per_beat = Self::TICKS_PER_BEAT as u64;
        let ticks_per_bar = time_signature.ticks_per_bar();

        let bar = (total_ticks / ticks_per_bar) + 1; // 1-based
        let remaining_after_bars = total_ticks % ticks_per_bar;
        let beat = (remaining_after_bars / ticks_per_beat) + 1; // 1-based
        let tick = remaining_after_bars % ticks_per_beat;

        Self::new(bar as u32, beat as u32, tick as u32)
    }

    /// Seconds from the start of the timeline to this position
    pub fn to_seconds(&self, tempo: &Tempo, time_signature: &TimeSignature) -> f64 {
        self.to_total_ticks(time_signature) as f64 / tempo.ticks_per_second()
    }

    /// Position reached after `seconds`, ticks floored
    pub fn from_seconds(seconds: f64, tempo: &Tempo, time_signature: &TimeSignature) -> Self {
        Self::from_total_ticks(
            seconds_to_total_ticks(seconds, tempo),
            time_signature,
        )
    }
}

/// Whole ticks elapsed after `seconds` at `tempo` (negative time counts as zero)
pub fn seconds_to_total_ticks(seconds: f64, tempo: &Tempo) -> u64 {
    (seconds.max(0.0) * tempo.ticks_per_second()).floor() as u64
}

impl Default for MusicalTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{}:{:03}", self.bar, self.beat, self.tick)
    }
}
