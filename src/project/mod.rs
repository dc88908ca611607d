// Settings persistence
// RON or JSON files holding the transport and translator configuration

pub mod serialization;
pub mod types;

use crate::sequencer::loop_region::StepMapping;
pub use serialization::{SettingsFormat, load_settings, save_settings};
pub use types::{SequencerSettings, SettingsVersion};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported settings format: {0} (expected .ron or .json)")]
    UnsupportedFormat(String),

    #[error("Unsupported settings version {0}")]
    UnsupportedVersion(SettingsVersion),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Report values that will be clamped when the settings are applied
///
/// Loading never fails on these; callers decide whether to warn or refuse.
pub fn validate_settings(settings: &SequencerSettings) -> Result<(), SettingsError> {
    let transport = &settings.transport;
    let translator = &settings.translator;

    if !transport.tempo.is_finite() || !(30.0..=300.0).contains(&transport.tempo) {
        return Err(SettingsError::Invalid(format!(
            "Transport tempo {} is outside 30-300 BPM",
            transport.tempo
        )));
    }

    if transport.time_signature != transport.time_signature.sanitized() {
        return Err(SettingsError::Invalid(format!(
            "Time signature {} is out of range",
            transport.time_signature
        )));
    }

    if transport.total_bars == 0 {
        return Err(SettingsError::Invalid(
            "Total bars must be at least 1".to_string(),
        ));
    }

    if transport.loop_start_bar == 0
        || transport.loop_start_bar > transport.loop_end_bar
        || transport.loop_end_bar > transport.total_bars
    {
        return Err(SettingsError::Invalid(format!(
            "Loop bars {}..{} do not fit in {} bars",
            transport.loop_start_bar, transport.loop_end_bar, transport.total_bars
        )));
    }

    if StepMapping::snap_subdivision(translator.subdivision) != translator.subdivision {
        return Err(SettingsError::Invalid(format!(
            "Subdivision {} must be 4, 8, 16 or 32",
            translator.subdivision
        )));
    }

    if translator.total_steps == 0 {
        return Err(SettingsError::Invalid(
            "Total steps must be at least 1".to_string(),
        ));
    }

    if translator.loop_start > translator.loop_end || translator.loop_end >= translator.total_steps
    {
        return Err(SettingsError::Invalid(format!(
            "Loop steps {}..{} do not fit in {} steps",
            translator.loop_start, translator.loop_end, translator.total_steps
        )));
    }

    if !(0.0..=100.0).contains(&translator.swing) {
        return Err(SettingsError::Invalid(format!(
            "Swing {} is outside 0-100%",
            translator.swing
        )));
    }

    Ok(())
}
