// Serialization utilities for settings persistence

use crate::project::SettingsError;
use crate::project::types::SequencerSettings;
use ron::ser::PrettyConfig;
use std::fs;
use std::path::Path;

/// On-disk format, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Ron,
    Json,
}

impl SettingsFormat {
    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("ron") => Ok(Self::Ron),
            Some("json") => Ok(Self::Json),
            _ => Err(SettingsError::UnsupportedFormat(
                path.display().to_string(),
            )),
        }
    }
}

/// Serialize settings to pretty RON
pub fn to_ron(settings: &SequencerSettings) -> Result<String, SettingsError> {
    Ok(ron::ser::to_string_pretty(settings, PrettyConfig::default())?)
}

pub fn from_ron(data: &str) -> Result<SequencerSettings, SettingsError> {
    Ok(ron::from_str(data)?)
}

/// Serialize settings to pretty JSON
pub fn to_json(settings: &SequencerSettings) -> Result<String, SettingsError> {
    Ok(serde_json::to_string_pretty(settings)?)
}

pub fn from_json(data: &str) -> Result<SequencerSettings, SettingsError> {
    Ok(serde_json::from_str(data)?)
}

/// Write settings to `path` (`.ron` or `.json`)
pub fn save_settings(path: &Path, settings: &SequencerSettings) -> Result<(), SettingsError> {
    let data = match SettingsFormat::from_path(path)? {
        SettingsFormat::Ron => to_ron(settings)?,
        SettingsFormat::Json => to_json(settings)?,
    };
    fs::write(path, data)?;
    log::debug!("Saved settings to {}", path.display());
    Ok(())
}

/// Read settings from `path` (`.ron` or `.json`)
///
/// Files written by a newer major version are rejected.
pub fn load_settings(path: &Path) -> Result<SequencerSettings, SettingsError> {
    let format = SettingsFormat::from_path(path)?;
    let data = fs::read_to_string(path)?;
    let settings = match format {
        SettingsFormat::Ron => from_ron(&data)?,
        SettingsFormat::Json => from_json(&data)?,
    };

    if !settings.version.is_compatible() {
        return Err(SettingsError::UnsupportedVersion(settings.version));
    }
    log::debug!("Loaded settings v{} from {}", settings.version, path.display());
    Ok(settings)
}
