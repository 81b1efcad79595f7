//! Guest path expansion (`~/share` → `/home/vagrant/share`).

use super::command::{shell_quote, ssh_base_command, ToolPaths};
use super::error::{MountError, Result};
use super::request::MountRequest;
use log::debug;
use std::process::{Command, Stdio};

/// Turns the guest path from a request into the absolute path sshfs uses as
/// its remote root.
pub trait GuestPathExpander {
    fn expand(&self, request: &MountRequest) -> Result<String>;
}

impl<E: GuestPathExpander + ?Sized> GuestPathExpander for Box<E> {
    fn expand(&self, request: &MountRequest) -> Result<String> {
        (**self).expand(request)
    }
}

/// Uses the guest path exactly as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl GuestPathExpander for Verbatim {
    fn expand(&self, request: &MountRequest) -> Result<String> {
        Ok(request.guest_path().to_string())
    }
}

/// Lets the guest's login shell expand `~` and variables by running
/// `printf` over the same ssh connection the mount will use.
#[derive(Debug, Clone, Default)]
pub struct RemoteShellExpander {
    tools: ToolPaths,
}

impl RemoteShellExpander {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    /// The remote command line. Only a leading `~`/`~user` and `$NAME`
    /// references stay open to the remote shell; everything else is quoted.
    fn remote_script(guest_path: &str) -> String {
        format!("printf '%s\\n' {}", remote_word(guest_path))
    }
}

impl GuestPathExpander for RemoteShellExpander {
    fn expand(&self, request: &MountRequest) -> Result<String> {
        let guest_path = request.guest_path();
        if !needs_expansion(guest_path) {
            return Ok(guest_path.to_string());
        }

        let ssh = ssh_base_command(request, &self.tools);
        let script = Self::remote_script(guest_path);
        debug!("Expanding guest path with: {} {}", ssh, shell_quote(&script));

        let output = Command::new(&ssh.program)
            .args(&ssh.args)
            .arg(&script)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| MountError::Spawn {
                program: ssh.program.display().to_string(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(MountError::Expansion {
                path: guest_path.to_string(),
                reason: format!(
                    "ssh exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        last_line(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| MountError::Expansion {
            path: guest_path.to_string(),
            reason: "remote shell printed nothing".to_string(),
        })
    }
}

fn needs_expansion(path: &str) -> bool {
    path.starts_with('~') || path.contains('$')
}

/// Renders `path` as a single shell word. The remote shell expands the
/// tilde prefix and `$NAME` references in it and nothing else.
fn remote_word(path: &str) -> String {
    let (mut word, mut rest) = tilde_prefix(path);
    let mut literal = String::new();

    while let Some(at) = rest.find('$') {
        literal.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        match variable_name(after) {
            Some((name, consumed)) => {
                flush_literal(&mut word, &mut literal);
                word.push_str(&format!("\"${{{}}}\"", name));
                rest = &after[consumed..];
            }
            None => {
                literal.push('$');
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    flush_literal(&mut word, &mut literal);

    if word.is_empty() {
        word.push_str("''");
    }
    word
}

/// Splits off `~/` or `~user/` (or a bare `~`/`~user`) to be left unquoted.
/// A prefix with an unusual user name is not split off and ends up quoted.
fn tilde_prefix(path: &str) -> (String, &str) {
    let Some(after) = path.strip_prefix('~') else {
        return (String::new(), path);
    };
    let user_end = after.find('/').unwrap_or(after.len());
    let user = &after[..user_end];
    if !user
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"._-".contains(&b))
    {
        return (String::new(), path);
    }
    // Keep the slash unquoted too: a quoted slash would stop tilde expansion.
    let split = (1 + user_end + 1).min(path.len());
    (path[..split].to_string(), &path[split..])
}

/// Parses `NAME` or `{NAME}` after a `$`, returning the name and the number
/// of bytes consumed.
fn variable_name(after: &str) -> Option<(&str, usize)> {
    let (name, consumed) = match after.strip_prefix('{') {
        Some(braced) => {
            let end = braced.find('}')?;
            (&braced[..end], end + 2)
        }
        None => {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        }
    };
    let is_identifier = name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_identifier.then_some((name, consumed))
}

fn flush_literal(word: &mut String, literal: &mut String) {
    if !literal.is_empty() {
        word.push_str(&shell_quote(literal));
        literal.clear();
    }
}

/// Login banners can precede the output, so only the last non-empty line
/// counts.
fn last_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::request::tests::{connection, request};
    use std::path::PathBuf;

    #[test]
    fn test_verbatim_returns_guest_path() {
        assert_eq!(Verbatim.expand(&request("/mnt/share")).unwrap(), "/vagrant");
    }

    #[test]
    fn test_absolute_path_skips_the_guest() {
        // An ssh binary that cannot exist proves no process is started.
        let expander = RemoteShellExpander::new(ToolPaths {
            ssh: PathBuf::from("/nonexistent/ssh"),
            ..ToolPaths::default()
        });
        assert_eq!(expander.expand(&request("/mnt/share")).unwrap(), "/vagrant");
    }

    #[test]
    fn test_tilde_path_is_sent_to_the_guest() {
        let req = MountRequest::new("~/share", "/mnt/share", connection(), None, None).unwrap();
        let expander = RemoteShellExpander::new(ToolPaths {
            ssh: PathBuf::from("/nonexistent/ssh"),
            ..ToolPaths::default()
        });
        assert!(matches!(
            expander.expand(&req),
            Err(MountError::Spawn { .. })
        ));
    }

    #[test]
    fn test_needs_expansion() {
        assert!(needs_expansion("~/vagrant"));
        assert!(needs_expansion("$HOME/vagrant"));
        assert!(!needs_expansion("/vagrant"));
    }

    #[test]
    fn test_last_line_skips_banner() {
        assert_eq!(
            last_line("Welcome to the guest\n\n/home/vagrant/share\n"),
            Some("/home/vagrant/share".to_string())
        );
        assert_eq!(last_line("\n\n"), None);
    }

    #[test]
    fn test_remote_script_quotes_after_tilde() {
        assert_eq!(
            RemoteShellExpander::remote_script("~/share"),
            "printf '%s\\n' ~/share"
        );
        assert_eq!(remote_word("~/my share"), "~/'my share'");
        assert_eq!(remote_word("~"), "~");
        assert_eq!(remote_word("~vagrant/data"), "~vagrant/data");
    }

    #[test]
    fn test_remote_word_keeps_variables_only() {
        assert_eq!(remote_word("$HOME/my share"), "\"${HOME}\"'/my share'");
        assert_eq!(remote_word("${DATA_DIR}/x"), "\"${DATA_DIR}\"/x");
        assert_eq!(remote_word("/srv/$(reboot)"), "'/srv/$(reboot)'");
        assert_eq!(remote_word("~/a;b`c`"), "~/'a;b`c`'");
    }

    #[test]
    fn test_odd_tilde_user_is_quoted() {
        assert_eq!(remote_word("~x;reboot/share"), "'~x;reboot/share'");
    }

    /// An ssh stand-in that runs its last argument with /bin/sh, as sshd
    /// would hand it to the guest's shell.
    #[cfg(unix)]
    fn fake_ssh(dir: &std::path::Path) -> std::io::Result<ToolPaths> {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ssh");
        std::fs::write(
            &path,
            "#!/bin/sh\nfor last; do :; done\nHOME=/home/vagrant exec /bin/sh -c \"$last\"\n",
        )?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(ToolPaths {
            ssh: path,
            ..ToolPaths::default()
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_guest_path_with_space_expands_whole() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let expander = RemoteShellExpander::new(fake_ssh(dir.path())?);

        let req = MountRequest::new("~/my share", "/mnt/share", connection(), None, None)?;
        assert_eq!(expander.expand(&req)?, "/home/vagrant/my share");

        let req = MountRequest::new("$HOME/a  b", "/mnt/share", connection(), None, None)?;
        assert_eq!(expander.expand(&req)?, "/home/vagrant/a  b");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_guest_path_metacharacters_do_not_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let marker = dir.path().join("ran");
        let expander = RemoteShellExpander::new(fake_ssh(dir.path())?);

        let guest = format!("~/x; touch {}", marker.display());
        let req = MountRequest::new(guest.clone(), "/mnt/share", connection(), None, None)?;
        assert_eq!(
            expander.expand(&req)?,
            format!("/home/vagrant/x; touch {}", marker.display())
        );
        assert!(!marker.exists());
        Ok(())
    }
}
