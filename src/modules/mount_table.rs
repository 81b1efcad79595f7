//! Mount table queries used to verify that a reverse mount came up.

use super::constants::MOUNT_TABLE_PATH;
use super::error::{MountError, Result};
use super::request::HostPath;
use std::fs;
use std::path::PathBuf;

/// Answers "is this path mounted right now?".
pub trait MountTable {
    /// Reports whether `host_path` currently appears as a mount point.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Environment`] when the table cannot be read.
    fn is_mounted(&self, host_path: &HostPath) -> Result<bool>;
}

/// The kernel's live mount table in `/proc/mounts` format.
#[derive(Debug, Clone)]
pub struct ProcMounts {
    path: PathBuf,
}

impl ProcMounts {
    pub fn new() -> Self {
        Self::at(MOUNT_TABLE_PATH)
    }

    /// Reads a table in the same format from another file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcMounts {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable for ProcMounts {
    fn is_mounted(&self, host_path: &HostPath) -> Result<bool> {
        let table = fs::read_to_string(&self.path).map_err(|e| {
            MountError::environment(format!("failed to read {}", self.path.display()), e)
        })?;
        Ok(table_contains(&table, host_path))
    }
}

/// Scans mount table text for an entry whose mount point is `host_path`.
pub fn table_contains(table: &str, host_path: &HostPath) -> bool {
    table.lines().any(|line| {
        line.split_whitespace()
            .nth(1)
            .map_or(false, |field| unescape_field(field) == host_path.as_str())
    })
}

/// Decodes the octal escapes (`\040`, `\011`, `\012`, `\134`) the kernel
/// uses for whitespace and backslashes in mount table fields.
pub fn unescape_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_triplet(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_triplet(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|b| (b'0'..=b'7').contains(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TABLE: &str = "\
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
endpoint /mnt/share fuse.sshfs rw,nosuid,nodev,relatime,user_id=1000,group_id=1000 0 0
:/vagrant /home/me/my\\040share fuse.sshfs rw 0 0
";

    fn table_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_trailing_slash_host_path_matches() {
        let file = table_file(TABLE);
        let table = ProcMounts::at(file.path());
        let host = HostPath::normalize("/mnt/share/").unwrap();
        assert!(table.is_mounted(&host).unwrap());
    }

    #[test]
    fn test_prefix_is_not_a_match() {
        let host = HostPath::normalize("/mnt").unwrap();
        assert!(!table_contains(TABLE, &host));
        let host = HostPath::normalize("/mnt/share/sub").unwrap();
        assert!(!table_contains(TABLE, &host));
    }

    #[test]
    fn test_escaped_space_matches() {
        let host = HostPath::normalize("/home/me/my share").unwrap();
        assert!(table_contains(TABLE, &host));
    }

    #[test]
    fn test_root_matches() {
        let host = HostPath::normalize("/").unwrap();
        assert!(table_contains(TABLE, &host));
    }

    #[test]
    fn test_query_is_repeatable_and_follows_the_table() {
        let mut file = table_file("proc /proc proc rw 0 0\n");
        let table = ProcMounts::at(file.path());
        let host = HostPath::normalize("/mnt/share").unwrap();

        assert!(!table.is_mounted(&host).unwrap());
        assert!(!table.is_mounted(&host).unwrap());

        file.write_all(b"endpoint /mnt/share fuse.sshfs rw 0 0\n").unwrap();
        file.flush().unwrap();

        assert!(table.is_mounted(&host).unwrap());
        assert!(table.is_mounted(&host).unwrap());
    }

    #[test]
    fn test_unreadable_table_is_an_environment_failure() {
        let dir = tempfile::tempdir().unwrap();
        let table = ProcMounts::at(dir.path().join("missing"));
        let host = HostPath::normalize("/mnt/share").unwrap();
        assert!(matches!(
            table.is_mounted(&host),
            Err(MountError::Environment { .. })
        ));
    }

    #[test]
    fn test_unescape_field() {
        assert_eq!(unescape_field("/plain/path"), "/plain/path");
        assert_eq!(unescape_field(r"/a\040b"), "/a b");
        assert_eq!(unescape_field(r"/a\011b\012c"), "/a\tb\nc");
        assert_eq!(unescape_field(r"/back\134slash"), r"/back\slash");
        assert_eq!(unescape_field(r"/trailing\04"), r"/trailing\04");
        assert_eq!(unescape_field(r"/not\999octal"), r"/not\999octal");
    }
}
