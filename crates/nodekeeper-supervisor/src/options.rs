//! Session options shared with secondary instances
//!
//! The primary records which clients it runs so a dashboard-only instance
//! started later shows the same pair, even if its own flags differ.

use chrono::{DateTime, Utc};
use nodekeeper_core::{ClientKind, ClientPair, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    pub execution_client: ClientKind,
    pub consensus_client: ClientKind,
    pub install_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_type: Option<String>,
    pub owner_pid: u32,
    pub started_at: DateTime<Utc>,
}

impl SessionOptions {
    pub fn new(
        clients: ClientPair,
        install_dir: impl Into<PathBuf>,
        execution_type: Option<String>,
    ) -> Self {
        Self {
            execution_client: clients.execution,
            consensus_client: clients.consensus,
            install_dir: install_dir.into(),
            execution_type,
            owner_pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    pub fn clients(&self) -> Result<ClientPair> {
        ClientPair::new(self.execution_client, self.consensus_client)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        debug!(path = %path.display(), "Saved session options");
        Ok(())
    }

    /// `Ok(None)` when no primary has written options
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the options file; a missing file is not an error
    pub fn delete(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted session options");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ethereum_clients").join("options.json");

        assert_eq!(SessionOptions::load(&path).unwrap(), None);

        let pair = ClientPair::new(ClientKind::Reth, ClientKind::Prysm).unwrap();
        let options = SessionOptions::new(pair, dir.path(), Some("archive".into()));
        options.save(&path).unwrap();

        let loaded = SessionOptions::load(&path).unwrap().unwrap();
        assert_eq!(loaded, options);
        assert_eq!(loaded.clients().unwrap(), pair);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"executionClient\": \"reth\""));

        SessionOptions::delete(&path).unwrap();
        assert!(!path.exists());
        SessionOptions::delete(&path).unwrap();
    }

    #[test]
    fn test_corrupt_options_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(SessionOptions::load(&path).is_err());
    }
}
