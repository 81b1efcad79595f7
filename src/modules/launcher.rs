//! Detached process creation.
//!
//! Both platform launchers give the same guarantees: the child keeps
//! running after [`Launcher::launch`] returns, its stdin/stdout stay bound
//! to the pipe ends it was given and its stderr lands in a diagnostic file.
//! Nothing here waits for the child.

use super::command::CommandSpec;
use super::diagnostics::DiagnosticFile;
use super::error::{MountError, Result};
use super::pipe::LegStdio;
use log::{debug, error};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::thread;

/// Which side of the reverse mount a process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    /// ssh running sftp-server on the guest.
    Server,
    /// Local sshfs in slave mode.
    Client,
}

impl Leg {
    /// Name of the pipe this leg reads from.
    pub fn stdin_pipe(self) -> &'static str {
        match self {
            Leg::Server => "client_to_server",
            Leg::Client => "server_to_client",
        }
    }

    /// Name of the pipe this leg writes to.
    pub fn stdout_pipe(self) -> &'static str {
        match self {
            Leg::Server => "server_to_client",
            Leg::Client => "client_to_server",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Server => f.write_str("sftp-server"),
            Leg::Client => f.write_str("sshfs"),
        }
    }
}

/// What is left of a launched process: identifiers only, no ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub leg: Leg,
    pub program: PathBuf,
    /// Pipe wired to the process's stdin.
    pub stdin: &'static str,
    /// Pipe wired to the process's stdout.
    pub stdout: &'static str,
    /// Where the process's stderr goes.
    pub stderr_path: PathBuf,
}

/// Spawns one leg of a reverse mount, detached from the caller.
pub trait Launcher {
    /// Confirms `command` can be started before anything is launched.
    fn check(&self, _command: &CommandSpec) -> Result<()> {
        Ok(())
    }

    /// Starts `command` with `stdio` as stdin/stdout and `stderr` capturing
    /// its error stream. Returns as soon as the process exists.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Spawn`] if the OS refuses to create the process.
    fn launch(
        &self,
        leg: Leg,
        command: &CommandSpec,
        stdio: LegStdio,
        stderr: &DiagnosticFile,
    ) -> Result<ProcessHandle>;
}

/// Launcher for POSIX systems: the child gets its own process group so a
/// signal sent to the controller's group (e.g. the terminal closing) does
/// not reach it.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixLauncher {
    isolate_process_group: bool,
}

#[cfg(unix)]
impl UnixLauncher {
    pub fn new() -> Self {
        Self {
            isolate_process_group: true,
        }
    }

    /// Keep children in the caller's process group.
    pub fn sharing_process_group() -> Self {
        Self {
            isolate_process_group: false,
        }
    }
}

#[cfg(unix)]
impl Default for UnixLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Launcher for UnixLauncher {
    fn check(&self, command: &CommandSpec) -> Result<()> {
        resolve_program(command)
    }

    fn launch(
        &self,
        leg: Leg,
        command: &CommandSpec,
        stdio: LegStdio,
        stderr: &DiagnosticFile,
    ) -> Result<ProcessHandle> {
        use std::os::unix::process::CommandExt;

        let isolate = self.isolate_process_group;
        spawn_detached(leg, command, stdio, stderr, |cmd| {
            if isolate {
                cmd.process_group(0);
            }
        })
    }
}

/// Launcher for Windows: the child is created detached with no console, in
/// a new process group, so closing the invoking shell does not take it down.
#[cfg(windows)]
#[derive(Debug, Clone, Default)]
pub struct WindowsLauncher;

#[cfg(windows)]
impl WindowsLauncher {
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
impl Launcher for WindowsLauncher {
    fn check(&self, command: &CommandSpec) -> Result<()> {
        resolve_program(command)
    }

    fn launch(
        &self,
        leg: Leg,
        command: &CommandSpec,
        stdio: LegStdio,
        stderr: &DiagnosticFile,
    ) -> Result<ProcessHandle> {
        use std::os::windows::process::CommandExt;

        spawn_detached(leg, command, stdio, stderr, |cmd| {
            cmd.creation_flags(Self::DETACHED_PROCESS | Self::CREATE_NEW_PROCESS_GROUP);
        })
    }
}

/// The launcher for the platform this crate was built for.
#[cfg(unix)]
pub type PlatformLauncher = UnixLauncher;

/// The launcher for the platform this crate was built for.
#[cfg(windows)]
pub type PlatformLauncher = WindowsLauncher;

/// Fails with [`MountError::Environment`] if the program is not an
/// executable on this machine.
fn resolve_program(command: &CommandSpec) -> Result<()> {
    which::which(&command.program)
        .map(|found| debug!("Found {}", found.display()))
        .map_err(|e| {
            MountError::environment(
                format!("required binary {} is not available", command.program.display()),
                io::Error::new(io::ErrorKind::NotFound, e),
            )
        })
}

fn spawn_detached(
    leg: Leg,
    command: &CommandSpec,
    stdio: LegStdio,
    stderr: &DiagnosticFile,
    platform: impl FnOnce(&mut Command),
) -> Result<ProcessHandle> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(stdio.stdin.into_stdio())
        .stdout(stdio.stdout.into_stdio())
        .stderr(stderr.stdio()?);
    platform(&mut cmd);

    let child = cmd.spawn().map_err(|e| MountError::Spawn {
        program: command.program.display().to_string(),
        source: e,
    })?;
    // `cmd` still holds the parent's copies of the pipe ends.
    drop(cmd);

    let pid = child.id();
    debug!("Launched {} (pid {}): {}", leg, pid, command);
    reap_in_background(leg, child);

    Ok(ProcessHandle {
        pid,
        leg,
        program: command.program.clone(),
        stdin: leg.stdin_pipe(),
        stdout: leg.stdout_pipe(),
        stderr_path: stderr.path().to_path_buf(),
    })
}

/// Collects the exit status whenever the child exits so it never lingers
/// as a zombie. The controller never joins this thread.
fn reap_in_background(leg: Leg, mut child: Child) {
    let pid = child.id();
    let spawned = thread::Builder::new()
        .name(format!("reap-{}", pid))
        .spawn(move || match child.wait() {
            Ok(status) => debug!("{} (pid {}) exited: {}", leg, pid, status),
            Err(e) => error!("Failed to wait for {} (pid {}): {}", leg, pid, e),
        });
    if let Err(e) = spawned {
        error!("Failed to start reaper for {} (pid {}): {}", leg, pid, e);
    }
}
