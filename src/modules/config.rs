//! JSON configuration for a reverse mount and its command line overrides.

use super::command::ToolPaths;
use super::constants::{DEFAULT_DIAGNOSTICS_ROOT, DEFAULT_SSH_PORT};
use super::error::{MountError, Result};
use super::request::{HostPath, MountRequest, SshConnection};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Loosely-typed mount settings, as read from a file or the command line.
///
/// Every field is optional here; [`MountConfig::to_request`] decides what
/// is actually required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountConfig {
    pub guest_path: Option<String>,
    pub host_path: Option<String>,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_username: Option<String>,
    pub identity_files: Vec<PathBuf>,
    pub ssh_opts_append: Option<String>,
    pub sshfs_opts_append: Option<String>,
    pub diagnostics_dir: Option<PathBuf>,
    /// Expand `~` and variables in the guest path on the guest itself.
    pub expand_guest_path: Option<bool>,
    pub tools: ToolPaths,
}

impl MountConfig {
    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| MountError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            MountError::InvalidRequest(format!("{}: {}", path.display(), e))
        })
    }

    /// Layers `overrides` on top of `self`. Set values in `overrides` win;
    /// a non-empty identity file list replaces the whole list.
    pub fn merge(self, overrides: MountConfig) -> Self {
        Self {
            guest_path: overrides.guest_path.or(self.guest_path),
            host_path: overrides.host_path.or(self.host_path),
            ssh_host: overrides.ssh_host.or(self.ssh_host),
            ssh_port: overrides.ssh_port.or(self.ssh_port),
            ssh_username: overrides.ssh_username.or(self.ssh_username),
            identity_files: if overrides.identity_files.is_empty() {
                self.identity_files
            } else {
                overrides.identity_files
            },
            ssh_opts_append: overrides.ssh_opts_append.or(self.ssh_opts_append),
            sshfs_opts_append: overrides.sshfs_opts_append.or(self.sshfs_opts_append),
            diagnostics_dir: overrides.diagnostics_dir.or(self.diagnostics_dir),
            expand_guest_path: overrides.expand_guest_path.or(self.expand_guest_path),
            tools: if overrides.tools == ToolPaths::default() {
                self.tools
            } else {
                overrides.tools
            },
        }
    }

    /// Whether the guest path goes through the guest's shell. Off unless set.
    pub fn expands_guest_path(&self) -> bool {
        self.expand_guest_path.unwrap_or(false)
    }

    /// Builds the validated request.
    pub fn to_request(&self) -> Result<MountRequest> {
        let ssh = SshConnection {
            host: required(&self.ssh_host, "ssh_host")?,
            port: self.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
            username: required(&self.ssh_username, "ssh_username")?,
            identity_files: self.identity_files.clone(),
        };
        MountRequest::new(
            required(&self.guest_path, "guest_path")?,
            &required(&self.host_path, "host_path")?,
            ssh,
            self.ssh_opts_append.clone(),
            self.sshfs_opts_append.clone(),
        )
    }

    /// The configured diagnostics directory, or a stable per-mount-point
    /// directory under `/tmp/revmount`.
    pub fn diagnostics_dir_for(&self, host_path: &HostPath) -> PathBuf {
        self.diagnostics_dir
            .clone()
            .unwrap_or_else(|| default_diagnostics_dir(host_path))
    }
}

/// `/tmp/revmount/<uuid-v5 of the host path>`: the same mount point always
/// maps to the same directory.
pub fn default_diagnostics_dir(host_path: &HostPath) -> PathBuf {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, host_path.as_str().as_bytes());
    Path::new(DEFAULT_DIAGNOSTICS_ROOT).join(id.to_string())
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| MountError::InvalidRequest(format!("{} is required", name)))
}
