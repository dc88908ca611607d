// Types for settings persistence

use crate::sequencer::step_translator::{StepTranslator, TranslatorSettings};
use crate::sequencer::transport::{Transport, TransportConfig};
use serde::{Deserialize, Serialize};

/// Settings file format version
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SettingsVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn current() -> Self {
        Self::new(1, 0, 0)
    }

    /// Files with the same major version can be read
    pub fn is_compatible(&self) -> bool {
        self.major == Self::current().major
    }
}

impl Default for SettingsVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl std::fmt::Display for SettingsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Everything needed to restore a clock setup
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerSettings {
    pub version: SettingsVersion,
    pub transport: TransportConfig,
    pub translator: TranslatorSettings,
}

impl SequencerSettings {
    /// Capture the current configuration of a transport and its translator
    pub fn capture(transport: &Transport, translator: &StepTranslator) -> Self {
        Self {
            version: SettingsVersion::current(),
            transport: transport.config(),
            translator: translator.export_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::timing::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_version_compatibility() {
        assert!(SettingsVersion::new(1, 4, 2).is_compatible());
        assert!(!SettingsVersion::new(2, 0, 0).is_compatible());
        assert_eq!(SettingsVersion::current().to_string(), "1.0.0");
    }

    #[test]
    fn test_capture() {
        let mut transport = Transport::with_defaults(Arc::new(ManualClock::new()));
        transport.set_tempo(100.0);
        transport.set_loop_region(2, 4);
        let translator = StepTranslator::new();
        translator.set_swing(25.0);

        let settings = SequencerSettings::capture(&transport, &translator);
        assert_eq!(settings.transport.tempo, 100.0);
        assert_eq!(
            (settings.transport.loop_start_bar, settings.transport.loop_end_bar),
            (2, 4)
        );
        assert_eq!(settings.translator.swing, 25.0);
    }
}
