//! Error taxonomy for reverse mount attempts.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Captured error streams of both legs of a mount attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Everything the ssh/sftp-server leg wrote to stderr.
    pub server_stderr: String,
    /// Everything the sshfs leg wrote to stderr.
    pub client_stderr: String,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sftp-server stderr:")?;
        writeln!(f, "{}", self.server_stderr)?;
        writeln!(f, "sshfs stderr:")?;
        write!(f, "{}", self.client_stderr)
    }
}

/// Everything that can go wrong while establishing a reverse mount.
///
/// Only [`MountError::Timeout`] is the product of retrying; every other
/// variant is returned on first occurrence.
#[derive(Debug, Error)]
pub enum MountError {
    /// The host environment cannot support the mount (unreadable mount
    /// table, missing binary).
    #[error("environment failure: {context}: {source}")]
    Environment {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The OS refused to create one of the processes.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that could not be started.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The mount never showed up in the mount table.
    #[error("reverse mount of {host_path} not visible after {checks} checks\n{diagnostics}")]
    Timeout {
        /// Normalized host path that was being mounted.
        host_path: String,
        /// Number of mount table checks performed.
        checks: u32,
        /// Error output of both processes.
        diagnostics: Diagnostics,
    },

    /// The request cannot be turned into commands.
    #[error("invalid mount request: {0}")]
    InvalidRequest(String),

    /// The guest path could not be expanded on the guest.
    #[error("failed to expand guest path {path}: {reason}")]
    Expansion {
        /// Guest path as supplied.
        path: String,
        /// Why expansion failed.
        reason: String,
    },

    /// Reading or writing a file under the diagnostics directory failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl MountError {
    pub(crate) fn environment(context: impl Into<String>, source: io::Error) -> Self {
        Self::Environment {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Diagnostics carried by a timed-out attempt, if any.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::Timeout { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MountError>;
