//! Persistent record of the last launched attempt in a diagnostics directory.

use super::constants::ATTEMPT_RECORD_FILE;
use super::error::{MountError, Result};
use super::launcher::ProcessHandle;
use super::request::HostPath;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// What was started for one mount attempt, so an operator can find the
/// processes and their logs later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub host_path: String,
    pub guest_path: String,
    pub server_pid: u32,
    pub client_pid: u32,
    pub server_stderr: PathBuf,
    pub client_stderr: PathBuf,
    /// Seconds since the Unix epoch.
    pub started_at: u64,
}

impl AttemptRecord {
    pub fn new(
        host_path: &HostPath,
        guest_path: &str,
        server: &ProcessHandle,
        client: &ProcessHandle,
    ) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            id: Uuid::new_v4(),
            host_path: host_path.as_str().to_string(),
            guest_path: guest_path.to_string(),
            server_pid: server.pid,
            client_pid: client.pid,
            server_stderr: server.stderr_path.clone(),
            client_stderr: client.stderr_path.clone(),
            started_at,
        }
    }

    fn file_in(dir: &Path) -> PathBuf {
        dir.join(ATTEMPT_RECORD_FILE)
    }

    /// Writes the record into `dir`, replacing any earlier one.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = Self::file_in(dir);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MountError::io(&path, e.into()))?;
        fs::write(&path, json).map_err(|e| MountError::io(&path, e))
    }

    /// Loads the record from `dir`, if an attempt was ever launched there.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = Self::file_in(dir);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| MountError::io(&path, e))?;
        let record = serde_json::from_str(&content).map_err(|e| MountError::io(&path, e.into()))?;
        Ok(Some(record))
    }
}
