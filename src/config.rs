//! Ground-station configuration file

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::source::SerialSettings;
use crate::types::{CalibrationSettings, ConditionerSettings, FilterSettings, ReaderSettings};

/// Every tunable of the ground station, one TOML table per component
///
/// Missing tables and keys fall back to their defaults.
///
/// # Example
/// ```
/// use cansat_groundstation::{CalibrationMode, StationSettings};
///
/// let settings = StationSettings::from_toml_str(r#"
///     [serial]
///     port = "COM11"
///
///     [calibration]
///     mode = "six_orientation"
/// "#).unwrap();
///
/// assert_eq!(settings.serial.port, "COM11");
/// assert_eq!(settings.serial.baud_rate, 115_200);
/// assert_eq!(settings.calibration.mode, CalibrationMode::SixOrientation);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    pub serial: SerialSettings,
    pub reader: ReaderSettings,
    pub filter: FilterSettings,
    pub conditioner: ConditionerSettings,
    pub calibration: CalibrationSettings,
}

impl StationSettings {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load settings from `path`, or the defaults if the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let settings = Self::from_toml_str(&contents)?;
            info!(?path, "loaded settings");
            Ok(settings)
        } else {
            info!(?path, "no settings file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml_string()?)?;
        info!(?path, "saved settings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::CalibrationMode;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(StationSettings::from_toml_str("").unwrap(), StationSettings::default());
    }

    #[test]
    fn test_partial_tables() {
        let settings = StationSettings::from_toml_str(
            r#"
            [filter]
            alpha = 0.9

            [conditioner]
            window = 10

            [calibration]
            calibrate_on_start = true

            [calibration.burst]
            timeout = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(settings.filter.alpha, 0.9);
        assert_eq!(settings.conditioner.window, 10);
        assert_eq!(settings.conditioner.smoothing, 0.05);
        assert!(settings.calibration.calibrate_on_start);
        assert_eq!(settings.calibration.mode, CalibrationMode::Stationary);
        assert_eq!(settings.calibration.burst.timeout, 2.5);
        assert_eq!(settings.calibration.burst.max_samples, 30);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let result = StationSettings::from_toml_str("[filter]\nalpha = \"high\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_serialized_settings_load_back() {
        let mut settings = StationSettings::default();
        settings.serial.port = String::from("/dev/ttyACM1");
        settings.calibration.mode = CalibrationMode::SixOrientation;

        let text = settings.to_toml_string().unwrap();
        assert!(text.contains("mode = \"six_orientation\""));
        assert_eq!(StationSettings::from_toml_str(&text).unwrap(), settings);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("cansat-groundstation-missing.toml");
        assert_eq!(StationSettings::load(&path).unwrap(), StationSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("cansat-settings-{}.toml", std::process::id()));
        let mut settings = StationSettings::default();
        settings.reader.read_chunk = 256;

        settings.save(&path).unwrap();
        let loaded = StationSettings::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, settings);
    }
}
