//! Persisted session record.
//!
//! One JSON file under the data directory holding the provider id and the
//! signed certificate, so a session can be restored without prompting.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::certificate::Certificate;
use crate::error::GatewayError;
use crate::wallet::ProviderId;

/// File name of the session record inside the data directory.
pub const SESSION_FILE: &str = "vearn-session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub wallet_id: ProviderId,
    pub cert: Certificate,
}

/// File-backed storage for the session record.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    path: PathBuf,
}

impl SessionStorage {
    /// Storage at `<dir>/vearn-session.json`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record. `Ok(None)` when nothing is stored.
    pub fn load(&self) -> Result<Option<PersistedSession>, GatewayError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GatewayError::Storage(format!("{}: {e}", self.path.display()))),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| GatewayError::Storage(format!("{}: {e}", self.path.display())))
    }

    pub fn save(&self, session: &PersistedSession) -> Result<(), GatewayError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| GatewayError::Storage(format!("{}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| GatewayError::Storage(e.to_string()))?;
        fs::write(&self.path, json)
            .map_err(|e| GatewayError::Storage(format!("{}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    /// Remove the record. Missing files are not an error.
    pub fn clear(&self) -> Result<(), GatewayError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GatewayError::Storage(format!("{}: {e}", self.path.display()))),
        }
    }
}
