//! Validated, immutable description of a single reverse mount.

use super::error::{MountError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// A host-side mount point in its single normalized form.
///
/// The same string is handed to sshfs and compared against the mount
/// table, so the two can never disagree about what "mounted" means.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPath(String);

impl HostPath {
    /// Normalizes a raw host path by stripping trailing slashes.
    ///
    /// The root directory stays `/`. Embedded quotes and spaces are kept
    /// as-is; escaping happens only when a command is rendered for a shell.
    pub fn normalize(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(MountError::InvalidRequest("host path is empty".to_string()));
        }
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self("/".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for HostPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How to reach the guest over ssh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConnection {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Identity files in preference order; only the first is passed to ssh.
    pub identity_files: Vec<PathBuf>,
}

/// Everything needed to attempt one reverse mount.
///
/// Built once through [`MountRequest::new`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    guest_path: String,
    host_path: HostPath,
    ssh: SshConnection,
    identity_file: PathBuf,
    ssh_opts_append: Vec<String>,
    sshfs_opts_append: Vec<String>,
}

impl MountRequest {
    /// Validates the inputs and normalizes the host path.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::InvalidRequest`] when a path, the ssh host, the
    /// username or the identity file list is empty, or when an option string
    /// has unbalanced quotes.
    pub fn new(
        guest_path: impl Into<String>,
        host_path: &str,
        ssh: SshConnection,
        ssh_opts_append: Option<String>,
        sshfs_opts_append: Option<String>,
    ) -> Result<Self> {
        let guest_path = guest_path.into();
        if guest_path.is_empty() {
            return Err(MountError::InvalidRequest("guest path is empty".to_string()));
        }
        if ssh.host.is_empty() {
            return Err(MountError::InvalidRequest("ssh host is empty".to_string()));
        }
        if ssh.username.is_empty() {
            return Err(MountError::InvalidRequest("ssh username is empty".to_string()));
        }
        let identity_file = ssh.identity_files.first().cloned().ok_or_else(|| {
            MountError::InvalidRequest("at least one identity file is required".to_string())
        })?;

        Ok(Self {
            guest_path,
            host_path: HostPath::normalize(host_path)?,
            ssh,
            identity_file,
            ssh_opts_append: split_options("ssh", ssh_opts_append)?,
            sshfs_opts_append: split_options("sshfs", sshfs_opts_append)?,
        })
    }

    /// Guest path before expansion.
    pub fn guest_path(&self) -> &str {
        &self.guest_path
    }

    pub fn host_path(&self) -> &HostPath {
        &self.host_path
    }

    pub fn ssh(&self) -> &SshConnection {
        &self.ssh
    }

    /// The identity file handed to ssh: the first of the configured ones.
    pub fn identity_file(&self) -> &Path {
        &self.identity_file
    }

    /// User-supplied ssh options, one entry per shell word.
    pub fn ssh_opts_append(&self) -> &[String] {
        &self.ssh_opts_append
    }

    /// User-supplied sshfs options, one entry per shell word.
    pub fn sshfs_opts_append(&self) -> &[String] {
        &self.sshfs_opts_append
    }
}

/// Splits an option string the way a POSIX shell would, so a quoted value
/// such as `-o "ProxyCommand=ssh -W %h:%p bastion"` stays one argument.
fn split_options(tool: &str, raw: Option<String>) -> Result<Vec<String>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    shell_words::split(&raw).map_err(|e| {
        MountError::InvalidRequest(format!("{} options {:?}: {}", tool, raw, e))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn connection() -> SshConnection {
        SshConnection {
            host: "192.168.121.10".to_string(),
            port: 2222,
            username: "vagrant".to_string(),
            identity_files: vec![
                PathBuf::from("/home/me/.vagrant.d/insecure_private_key"),
                PathBuf::from("/home/me/.ssh/id_rsa"),
            ],
        }
    }

    pub(crate) fn request(host_path: &str) -> MountRequest {
        MountRequest::new("/vagrant", host_path, connection(), None, None).unwrap()
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        assert_eq!(HostPath::normalize("/mnt/share/").unwrap().as_str(), "/mnt/share");
        assert_eq!(HostPath::normalize("/mnt/share//").unwrap().as_str(), "/mnt/share");
        assert_eq!(HostPath::normalize("/mnt/share").unwrap().as_str(), "/mnt/share");
    }

    #[test]
    fn test_root_stays_root() {
        assert_eq!(HostPath::normalize("/").unwrap().as_str(), "/");
        assert_eq!(HostPath::normalize("///").unwrap().as_str(), "/");
    }

    #[test]
    fn test_quotes_survive_normalization() {
        let path = HostPath::normalize("/home/me/it's here/").unwrap();
        assert_eq!(path.as_str(), "/home/me/it's here");
    }

    #[test]
    fn test_empty_host_path_rejected() {
        assert!(matches!(
            HostPath::normalize(""),
            Err(MountError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_missing_identity_file_rejected() {
        let mut ssh = connection();
        ssh.identity_files.clear();
        let err = MountRequest::new("/vagrant", "/mnt/share", ssh, None, None).unwrap_err();
        assert!(matches!(err, MountError::InvalidRequest(_)));
    }

    #[test]
    fn test_first_identity_file_is_used() {
        let req = request("/mnt/share");
        assert_eq!(
            req.identity_file(),
            Path::new("/home/me/.vagrant.d/insecure_private_key")
        );
    }

    #[test]
    fn test_blank_option_strings_are_dropped() {
        let req = MountRequest::new(
            "/vagrant",
            "/mnt/share",
            connection(),
            Some("   ".to_string()),
            Some("-o allow_other".to_string()),
        )
        .unwrap();
        assert!(req.ssh_opts_append().is_empty());
        assert_eq!(req.sshfs_opts_append(), ["-o", "allow_other"]);
    }

    #[test]
    fn test_quoted_option_stays_one_word() {
        let req = MountRequest::new(
            "/vagrant",
            "/mnt/share",
            connection(),
            Some(r#"-o "ProxyCommand=ssh -W %h:%p bastion" -v"#.to_string()),
            Some("-o 'volname=My Share'".to_string()),
        )
        .unwrap();
        assert_eq!(
            req.ssh_opts_append(),
            ["-o", "ProxyCommand=ssh -W %h:%p bastion", "-v"]
        );
        assert_eq!(req.sshfs_opts_append(), ["-o", "volname=My Share"]);
    }

    #[test]
    fn test_unbalanced_quote_rejected() {
        let err = MountRequest::new(
            "/vagrant",
            "/mnt/share",
            connection(),
            Some(r#"-o "ProxyCommand=ssh -W %h:%p"#.to_string()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MountError::InvalidRequest(_)));
    }
}
