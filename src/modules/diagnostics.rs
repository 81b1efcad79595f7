//! Per-attempt stderr capture files.

use super::error::{MountError, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// A file one child process writes its stderr into.
#[derive(Debug)]
pub struct DiagnosticFile {
    path: PathBuf,
    file: File,
}

impl DiagnosticFile {
    /// Creates the file, truncating output left over from an earlier attempt.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| MountError::io(&path, e))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A stderr slot for a child, sharing the underlying file.
    pub fn stdio(&self) -> Result<Stdio> {
        let clone = self.file.try_clone().map_err(|e| MountError::io(&self.path, e))?;
        Ok(Stdio::from(clone))
    }

    /// Reads everything written so far, from offset zero.
    ///
    /// Opens a fresh handle so the child's write offset is left untouched.
    pub fn read_all(&self) -> Result<String> {
        let bytes = fs::read(&self.path).map_err(|e| MountError::io(&self.path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
