// Note names for grid rows
// "C#4" style names map to MIDI numbers and equal-tempered frequencies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Concert A
pub const A4_FREQUENCY: f64 = 440.0;
const A4_MIDI: i32 = 69;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoteParseError {
    #[error("Invalid note format: '{0}'")]
    InvalidFormat(String),

    #[error("Note range is inverted: {start} is above {end}")]
    InvertedRange { start: String, end: String },
}

/// A pitch class plus octave, e.g. C#4
///
/// Serialized as its name so only parseable notes can be deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NoteName {
    /// 0 = C ... 11 = B
    pitch_class: u8,
    /// Single digit, -9..=9
    octave: i8,
}

impl NoteName {
    /// Parse names matching `[A-G]#?` followed by a single (optionally
    /// negative) octave digit. E# and B# have no row and are rejected.
    pub fn parse(name: &str) -> Result<Self, NoteParseError> {
        let invalid = || NoteParseError::InvalidFormat(name.to_string());

        let mut chars = name.chars().peekable();
        let letter = chars.next().ok_or_else(invalid)?;
        let base: u8 = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let sharp = chars.next_if_eq(&'#').is_some();
        if sharp && (letter == 'E' || letter == 'B') {
            return Err(invalid());
        }
        let negative = chars.next_if_eq(&'-').is_some();
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(invalid)?;
        if chars.next().is_some() {
            return Err(invalid());
        }

        let pitch_class = base + sharp as u8;
        let octave = if negative { -(digit as i8) } else { digit as i8 };
        Ok(Self {
            pitch_class,
            octave,
        })
    }

    /// Nearest name for a MIDI note number (sharps only)
    pub fn from_midi(midi: u8) -> Self {
        Self {
            pitch_class: midi % 12,
            octave: (midi / 12) as i8 - 1,
        }
    }

    pub fn pitch_class(&self) -> u8 {
        self.pitch_class
    }

    pub fn octave(&self) -> i8 {
        self.octave
    }

    /// MIDI note number; C4 = 60. Negative for very low octaves.
    pub fn midi_number(&self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.pitch_class as i32
    }

    /// Equal-tempered frequency in Hz
    pub fn frequency(&self) -> f64 {
        midi_to_frequency(self.midi_number())
    }
}

/// Equal-tempered frequency for a MIDI note number
pub fn midi_to_frequency(midi: i32) -> f64 {
    A4_FREQUENCY * 2f64.powf((midi - A4_MIDI) as f64 / 12.0)
}

impl FromStr for NoteName {
    type Err = NoteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NoteName {
    type Error = NoteParseError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::parse(&name)
    }
}

impl From<NoteName> for String {
    fn from(note: NoteName) -> Self {
        note.to_string()
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            PITCH_CLASSES[self.pitch_class as usize], self.octave
        )
    }
}

/// Inclusive range of notes shown as grid rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRange {
    pub start: NoteName,
    pub end: NoteName,
}

impl NoteRange {
    pub fn parse(start: &str, end: &str) -> Result<Self, NoteParseError> {
        let start_note = NoteName::parse(start)?;
        let end_note = NoteName::parse(end)?;
        if start_note.midi_number() > end_note.midi_number() {
            return Err(NoteParseError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            start: start_note,
            end: end_note,
        })
    }

    /// Number of semitones covered, ends included
    pub fn note_count(&self) -> usize {
        (self.end.midi_number() - self.start.midi_number()) as usize + 1
    }

    pub fn contains(&self, midi: i32) -> bool {
        midi >= self.start.midi_number() && midi <= self.end.midi_number()
    }

    /// MIDI numbers from low to high
    pub fn midi_numbers(&self) -> impl Iterator<Item = i32> {
        self.start.midi_number()..=self.end.midi_number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_natural_and_sharp() {
        let c4 = NoteName::parse("C4").unwrap();
        assert_eq!(c4.pitch_class(), 0);
        assert_eq!(c4.octave(), 4);
        assert_eq!(c4.midi_number(), 60);

        let cs4: NoteName = "C#4".parse().unwrap();
        assert_eq!(cs4.midi_number(), 61);
        assert_eq!(cs4.to_string(), "C#4");
    }

    #[test]
    fn test_serde_uses_note_names() {
        let cs4 = NoteName::parse("C#4").unwrap();
        assert_eq!(serde_json::to_string(&cs4).unwrap(), "\"C#4\"");
        let restored: NoteName = serde_json::from_str("\"C#4\"").unwrap();
        assert_eq!(restored, cs4);

        // Raw fields would allow a pitch class with no name
        assert!(serde_json::from_str::<NoteName>(r#"{"pitch_class":200,"octave":4}"#).is_err());
        assert!(serde_json::from_str::<NoteName>("\"H4\"").is_err());

        let range = NoteRange::parse("C3", "B4").unwrap();
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, r#"{"start":"C3","end":"B4"}"#);
        assert_eq!(serde_json::from_str::<NoteRange>(&json).unwrap(), range);
    }

    #[test]
    fn test_negative_octave() {
        let note = NoteName::parse("C-1").unwrap();
        assert_eq!(note.midi_number(), 0);
        assert_eq!(note.to_string(), "C-1");
    }

    #[test]
    fn test_frequency() {
        let a4 = NoteName::parse("A4").unwrap();
        assert_eq!(a4.midi_number(), 69);
        assert_eq!(a4.frequency(), 440.0);

        let a5 = NoteName::parse("A5").unwrap();
        assert!((a5.frequency() - 880.0).abs() < 1e-9);

        let c4 = NoteName::parse("C4").unwrap();
        assert!((c4.frequency() - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_names() {
        let rejected = [
            "", "H4", "c4", "C", "Db4", "C44", "C#", "C4 ", "#4", "C--1", "E#4", "B#3",
        ];
        for bad in rejected {
            assert_eq!(
                NoteName::parse(bad),
                Err(NoteParseError::InvalidFormat(bad.to_string())),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_from_midi() {
        assert_eq!(NoteName::from_midi(60).to_string(), "C4");
        assert_eq!(NoteName::from_midi(70).to_string(), "A#4");
        assert_eq!(NoteName::from_midi(0).to_string(), "C-1");
    }

    #[test]
    fn test_note_range() {
        let range = NoteRange::parse("C4", "B4").unwrap();
        assert_eq!(range.note_count(), 12);
        assert!(range.contains(64));
        assert!(!range.contains(72));
        assert_eq!(range.midi_numbers().next(), Some(60));

        assert_eq!(
            NoteRange::parse("C5", "C4"),
            Err(NoteParseError::InvertedRange {
                start: "C5".to_string(),
                end: "C4".to_string(),
            })
        );
        assert!(matches!(
            NoteRange::parse("C4", "X9"),
            Err(NoteParseError::InvalidFormat(_))
        ));
    }
}
