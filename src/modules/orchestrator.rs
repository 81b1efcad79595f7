//! Drives one reverse mount attempt from request to verified mount.
//!
//! `Idle → Preparing → Launching → Verifying → {Mounted | Failed}`
//!
//! The two launched processes are never joined or killed; if verification
//! gives up they keep running and the error carries their stderr.

use super::command::{client_command, server_command, ToolPaths};
use super::constants::{CLIENT_STDERR_FILE, MAX_MOUNT_CHECKS, MOUNT_CHECK_INTERVAL, SERVER_STDERR_FILE};
use super::diagnostics::DiagnosticFile;
use super::error::{Diagnostics, MountError, Result};
use super::expand::{GuestPathExpander, Verbatim};
use super::launcher::{Launcher, Leg, PlatformLauncher, ProcessHandle};
use super::mount_table::{MountTable, ProcMounts};
use super::pipe::PipeBridge;
use super::record::AttemptRecord;
use super::reporter::{LogReporter, Reporter};
use super::request::{HostPath, MountRequest};
use log::{debug, error};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Where an attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Idle,
    Preparing,
    Launching,
    Verifying,
    Mounted,
    Failed,
}

/// Blocks the control thread between mount table checks.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// A successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountReport {
    pub host_path: HostPath,
    pub guest_path: String,
    /// The host path was already mounted and nothing was launched.
    pub already_mounted: bool,
    /// Mount table checks performed before the mount showed up.
    pub checks: u32,
    /// The launched processes, absent when nothing was launched.
    pub processes: Option<(ProcessHandle, ProcessHandle)>,
}

/// Composes pipe allocation, process launch and mount table polling into
/// one reverse mount.
pub struct MountOrchestrator {
    launcher: Box<dyn Launcher>,
    mount_table: Box<dyn MountTable>,
    expander: Box<dyn GuestPathExpander>,
    reporter: Box<dyn Reporter>,
    sleeper: Box<dyn Sleeper>,
    tools: ToolPaths,
    diagnostics_dir: PathBuf,
    state: MountState,
}

impl MountOrchestrator {
    /// Creates an orchestrator using the platform launcher, the kernel mount
    /// table and `diagnostics_dir` for stderr capture.
    pub fn new(diagnostics_dir: impl Into<PathBuf>) -> Self {
        Self {
            launcher: Box::new(PlatformLauncher::default()),
            mount_table: Box::new(ProcMounts::new()),
            expander: Box::new(Verbatim),
            reporter: Box::new(LogReporter),
            sleeper: Box::new(ThreadSleeper),
            tools: ToolPaths::default(),
            diagnostics_dir: diagnostics_dir.into(),
            state: MountState::Idle,
        }
    }

    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    pub fn with_mount_table(mut self, mount_table: impl MountTable + 'static) -> Self {
        self.mount_table = Box::new(mount_table);
        self
    }

    pub fn with_expander(mut self, expander: impl GuestPathExpander + 'static) -> Self {
        self.expander = Box::new(expander);
        self
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    pub fn state(&self) -> MountState {
        self.state
    }

    pub fn diagnostics_dir(&self) -> &Path {
        &self.diagnostics_dir
    }

    fn transition(&mut self, next: MountState) {
        debug!("Mount state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs one complete attempt for `request`.
    ///
    /// # Errors
    ///
    /// [`MountError::Timeout`] when the mount never appears, carrying the
    /// stderr of both processes. Every other variant is returned as soon as
    /// it happens, without retrying.
    pub fn mount(&mut self, request: &MountRequest) -> Result<MountReport> {
        let result = self.attempt(request);
        match &result {
            Ok(_) => self.transition(MountState::Mounted),
            Err(_) => self.transition(MountState::Failed),
        }
        result
    }

    fn attempt(&mut self, request: &MountRequest) -> Result<MountReport> {
        self.transition(MountState::Preparing);
        let host_path = request.host_path();

        if self.mount_table.is_mounted(host_path)? {
            self.reporter.info(&format!("{} is already mounted", host_path));
            return Ok(MountReport {
                host_path: host_path.clone(),
                guest_path: request.guest_path().to_string(),
                already_mounted: true,
                checks: 0,
                processes: None,
            });
        }

        let guest_path = self.expander.expand(request)?;
        let server_cmd = server_command(request, &self.tools);
        let client_cmd = client_command(request, &guest_path, &self.tools);
        self.launcher.check(&server_cmd)?;
        self.launcher.check(&client_cmd)?;
        debug!("ssh cmd: {}", server_cmd);
        debug!("sshfs cmd: {}", client_cmd);
        self.reporter.info(&format!(
            "Mounting folder via reverse sshfs: {} => {}",
            host_path, guest_path
        ));

        self.transition(MountState::Launching);
        fs::create_dir_all(&self.diagnostics_dir)
            .map_err(|e| MountError::io(&self.diagnostics_dir, e))?;
        let server_log = DiagnosticFile::create(self.diagnostics_dir.join(SERVER_STDERR_FILE))?;
        let client_log = DiagnosticFile::create(self.diagnostics_dir.join(CLIENT_STDERR_FILE))?;
        let (server_io, client_io) = PipeBridge::new()?.into_ends();

        let server = self.launcher.launch(Leg::Server, &server_cmd, server_io, &server_log)?;
        let client = self.launcher.launch(Leg::Client, &client_cmd, client_io, &client_log)?;

        let record = AttemptRecord::new(host_path, &guest_path, &server, &client);
        if let Err(e) = record.save(&self.diagnostics_dir) {
            error!("Failed to save attempt record: {}", e);
        }

        self.transition(MountState::Verifying);
        match self.verify(host_path)? {
            Some(checks) => {
                self.reporter.info(&format!(
                    "Folder successfully mounted: {} => {}",
                    host_path, guest_path
                ));
                Ok(MountReport {
                    host_path: host_path.clone(),
                    guest_path,
                    already_mounted: false,
                    checks,
                    processes: Some((server, client)),
                })
            }
            None => Err(MountError::Timeout {
                host_path: host_path.to_string(),
                checks: MAX_MOUNT_CHECKS,
                diagnostics: Diagnostics {
                    server_stderr: server_log.read_all()?,
                    client_stderr: client_log.read_all()?,
                },
            }),
        }
    }

    /// Polls the mount table, returning the number of checks it took for
    /// the mount to appear, or `None` once the budget is spent.
    fn verify(&self, host_path: &HostPath) -> Result<Option<u32>> {
        for check in 1..=MAX_MOUNT_CHECKS {
            self.reporter.info("Checking mount...");
            if self.mount_table.is_mounted(host_path)? {
                return Ok(Some(check));
            }
            if check < MAX_MOUNT_CHECKS {
                self.sleeper.sleep(MOUNT_CHECK_INTERVAL);
            }
        }
        Ok(None)
    }
}
