//! Persisted download progress for clients that report it only in logs

use nodekeeper_core::Result;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

/// Contents of `progressMonitor.json`; all values are fractions in `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(default)]
    pub header_dl_progress: f64,
    #[serde(default)]
    pub chain_dl_progress: f64,
    #[serde(default)]
    pub state_dl_progress: f64,
}

impl Progress {
    /// Missing file loads as all zeros
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => Ok(serde_json::from_str::<Self>(&data)?.clamped()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// HEADERS, CHAIN, STATE
    pub fn stages(&self) -> Vec<f64> {
        vec![
            self.header_dl_progress,
            self.chain_dl_progress,
            self.state_dl_progress,
        ]
    }

    fn clamped(self) -> Self {
        Self {
            header_dl_progress: clamp_fraction(self.header_dl_progress),
            chain_dl_progress: clamp_fraction(self.chain_dl_progress),
            state_dl_progress: clamp_fraction(self.state_dl_progress),
        }
    }
}

/// Clamp to `[0, 1]`, mapping NaN to 0
pub fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::load(&dir.path().join("progressMonitor.json")).unwrap();
        assert_eq!(progress, Progress::default());
        assert_eq!(progress.stages(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_save_then_load_is_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ethereum_clients").join("progressMonitor.json");
        let progress = Progress {
            header_dl_progress: 1.0,
            chain_dl_progress: 0.4567,
            state_dl_progress: 0.125,
        };

        progress.save(&path).unwrap();
        assert_eq!(Progress::load(&path).unwrap(), progress);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"chainDlProgress\": 0.4567"));
    }

    #[test]
    fn test_load_clamps_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progressMonitor.json");
        std::fs::write(&path, r#"{"headerDlProgress": 1.7, "stateDlProgress": -0.2}"#).unwrap();

        let progress = Progress::load(&path).unwrap();
        assert_eq!(progress.stages(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_clamp_fraction() {
        assert_eq!(clamp_fraction(f64::NAN), 0.0);
        assert_eq!(clamp_fraction(0.5), 0.5);
        assert_eq!(clamp_fraction(3.0), 1.0);
    }
}
