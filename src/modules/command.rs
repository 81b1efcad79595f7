//! Command line construction for both legs of a reverse mount.
//!
//! Commands are kept as structured argument vectors and handed to the OS
//! without a shell. [`CommandSpec::to_shell_string`] renders the POSIX
//! single-quoted form used for logging and dry runs.

use super::constants::{
    NULL_DEVICE, SERVER_ALIVE_INTERVAL, SFTP_SERVER_PATH, SSHFS_PATH, SSH_PATH,
};
use super::request::MountRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Locations of the external binaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Local ssh client.
    pub ssh: PathBuf,
    /// sftp-server binary on the guest.
    pub sftp_server: PathBuf,
    /// Local sshfs binary.
    pub sshfs: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ssh: PathBuf::from(SSH_PATH),
            sftp_server: PathBuf::from(SFTP_SERVER_PATH),
            sshfs: PathBuf::from(SSHFS_PATH),
        }
    }
}

/// A program and its arguments, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    fn option(&mut self, value: impl Into<String>) -> &mut Self {
        self.arg("-o").arg(value)
    }

    /// Appends user options, already split into shell words.
    fn user_options(&mut self, words: &[String]) -> &mut Self {
        self.args.extend_from_slice(words);
        self
    }

    /// Renders the command the way a POSIX shell would need to see it.
    pub fn to_shell_string(&self) -> String {
        let mut out = shell_quote(&self.program.to_string_lossy());
        for arg in &self.args {
            out.push(' ');
            out.push_str(&shell_quote(arg));
        }
        out
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}

/// Quotes a word for a POSIX shell.
///
/// Words made only of characters that are never special are left bare;
/// everything else is wrapped in single quotes with `'` written as `'\''`.
pub fn shell_quote(word: &str) -> String {
    let is_plain = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./:=@,+%".contains(&b));
    if is_plain {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// ssh invocation shared by the mount leg and guest path expansion:
/// everything up to and including the destination host.
pub fn ssh_base_command(request: &MountRequest, tools: &ToolPaths) -> CommandSpec {
    let ssh = request.ssh();
    let mut cmd = CommandSpec::new(&tools.ssh);
    cmd.option("StrictHostKeyChecking=no")
        .option(format!("ServerAliveInterval={}", SERVER_ALIVE_INTERVAL))
        .option(format!("User={}", ssh.username))
        .option(format!("Port={}", ssh.port))
        .option(format!("IdentityFile={}", request.identity_file().display()))
        .option(format!("UserKnownHostsFile={}", NULL_DEVICE))
        .arg("-F")
        .arg(NULL_DEVICE)
        .user_options(request.ssh_opts_append())
        .arg(ssh.host.as_str());
    cmd
}

/// The server leg: ssh into the guest and start sftp-server there.
pub fn server_command(request: &MountRequest, tools: &ToolPaths) -> CommandSpec {
    let mut cmd = ssh_base_command(request, tools);
    cmd.arg(tools.sftp_server.to_string_lossy());
    cmd
}

/// The client leg: sshfs in slave mode, speaking sftp over its own stdio.
pub fn client_command(request: &MountRequest, expanded_guest_path: &str, tools: &ToolPaths) -> CommandSpec {
    let mut cmd = CommandSpec::new(&tools.sshfs);
    cmd.arg(format!(":{}", expanded_guest_path))
        .arg(request.host_path().as_str())
        .option("noauto_cache")
        .option("slave")
        .user_options(request.sshfs_opts_append());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::request::tests::{connection, request};

    #[test]
    fn test_server_command_layout() {
        let cmd = server_command(&request("/mnt/share"), &ToolPaths::default());
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/ssh"));
        assert_eq!(
            cmd.args,
            vec![
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "ServerAliveInterval=30",
                "-o",
                "User=vagrant",
                "-o",
                "Port=2222",
                "-o",
                "IdentityFile=/home/me/.vagrant.d/insecure_private_key",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-F",
                "/dev/null",
                "192.168.121.10",
                "/usr/libexec/openssh/sftp-server",
            ]
        );
    }

    #[test]
    fn test_client_command_layout() {
        let cmd = client_command(&request("/mnt/share/"), "/home/vagrant/data", &ToolPaths::default());
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/sshfs"));
        assert_eq!(
            cmd.args,
            vec![
                ":/home/vagrant/data",
                "/mnt/share",
                "-o",
                "noauto_cache",
                "-o",
                "slave",
            ]
        );
    }

    #[test]
    fn test_user_options_are_appended_in_order() {
        let req = MountRequest::new(
            "/vagrant",
            "/mnt/share",
            connection(),
            Some("-o Compression=yes -v".to_string()),
            Some("-o allow_other -o cache=yes".to_string()),
        )
        .unwrap();
        let tools = ToolPaths::default();

        let server = server_command(&req, &tools);
        let host_at = server.args.iter().position(|a| a == "192.168.121.10").unwrap();
        assert_eq!(
            &server.args[host_at - 3..host_at],
            &["-o", "Compression=yes", "-v"]
        );
        assert_eq!(server.args.last().unwrap(), "/usr/libexec/openssh/sftp-server");

        let client = client_command(&req, "/vagrant", &tools);
        assert_eq!(
            &client.args[6..],
            &["-o", "allow_other", "-o", "cache=yes"]
        );
    }

    #[test]
    fn test_quoted_ssh_option_is_one_argument() {
        let req = MountRequest::new(
            "/vagrant",
            "/mnt/share",
            connection(),
            Some(r#"-o "ProxyCommand=ssh -W %h:%p bastion""#.to_string()),
            None,
        )
        .unwrap();
        let server = server_command(&req, &ToolPaths::default());
        let host_at = server.args.iter().position(|a| a == "192.168.121.10").unwrap();
        assert_eq!(
            &server.args[host_at - 2..host_at],
            &["-o", "ProxyCommand=ssh -W %h:%p bastion"]
        );
        assert!(server
            .to_shell_string()
            .contains("-o 'ProxyCommand=ssh -W %h:%p bastion' 192.168.121.10"));
    }

    #[test]
    fn test_host_path_with_quote_is_one_argument() {
        let req = request("/mnt/it's shared/");
        let cmd = client_command(&req, "/vagrant", &ToolPaths::default());
        assert_eq!(cmd.args[1], "/mnt/it's shared");
        assert_eq!(cmd.args[1], req.host_path().as_str());
        assert!(cmd
            .to_shell_string()
            .contains(r"'/mnt/it'\''s shared'"));
    }

    #[test]
    fn test_construction_is_deterministic() {
        let tools = ToolPaths::default();
        let a = request("/mnt/share/");
        let b = request("/mnt/share/");
        assert_eq!(
            server_command(&a, &tools).to_shell_string(),
            server_command(&b, &tools).to_shell_string()
        );
        assert_eq!(
            client_command(&a, "/vagrant", &tools).to_shell_string(),
            client_command(&b, "/vagrant", &tools).to_shell_string()
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/usr/bin/ssh"), "/usr/bin/ssh");
        assert_eq!(shell_quote("User=vagrant"), "User=vagrant");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }
}
