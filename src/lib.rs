#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! revmount: reverse sshfs mounts without a listening ssh server on the host
//!
//! A conventional sshfs mount has the local `sshfs` open its own ssh
//! connection. A reverse mount instead runs `sftp-server` on the guest
//! through `ssh` and pipes its stdin/stdout straight into a local `sshfs`
//! running in slave mode, so the guest's filesystem appears on the host.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use revmount::{MountOrchestrator, MountRequest, SshConnection};
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let request = MountRequest::new(
//!     "/vagrant",
//!     "/mnt/guest-share/",
//!     SshConnection {
//!         host: "192.168.121.10".to_string(),
//!         port: 22,
//!         username: "vagrant".to_string(),
//!         identity_files: vec![PathBuf::from("/home/me/.vagrant.d/insecure_private_key")],
//!     },
//!     None,
//!     None,
//! )?;
//!
//! let mut orchestrator = MountOrchestrator::new("/tmp/revmount/default");
//! let report = orchestrator.mount(&request)?;
//! println!("mounted after {} checks", report.checks);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure diagnostics
//!
//! Both processes write stderr to files in the diagnostics directory. When
//! the mount never shows up in the mount table, [`MountError::Timeout`]
//! carries the full contents of both files.

pub mod modules;

pub use modules::command::{CommandSpec, ToolPaths};
pub use modules::config::MountConfig;
pub use modules::error::{Diagnostics, MountError};
pub use modules::expand::{GuestPathExpander, RemoteShellExpander, Verbatim};
pub use modules::launcher::{Launcher, PlatformLauncher, ProcessHandle};
pub use modules::mount_table::{MountTable, ProcMounts};
pub use modules::orchestrator::{MountOrchestrator, MountReport, MountState};
pub use modules::request::{HostPath, MountRequest, SshConnection};
