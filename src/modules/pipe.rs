//! Full-duplex channel between two processes built from two pipes.
//!
//! ```text
//!          stdout => write      server_to_client      read => stdin
//!         />------------->=========================>----------->\
//!   ssh + sftp-server                                          sshfs -o slave
//!         \<-------------<=========================<-----------</
//!          stdin <= read        client_to_server      write <= stdout
//! ```

use super::error::{MountError, Result};
use std::fs::File;
use std::io;
#[cfg(unix)]
use std::os::unix::io::RawFd;
use std::process::Stdio;

/// One end of a pipe. Consumed when handed to a child as stdio.
#[derive(Debug)]
pub struct PipeEnd(File);

impl PipeEnd {
    /// Converts this end into a child stdio slot. The parent's copy is
    /// closed once the child has been spawned.
    pub fn into_stdio(self) -> Stdio {
        Stdio::from(self.0)
    }

    /// Gives back the underlying file, for reading or writing the pipe
    /// directly.
    pub fn into_file(self) -> File {
        self.0
    }
}

/// A single half-duplex pipe.
#[derive(Debug)]
pub struct PipePair {
    pub read: PipeEnd,
    pub write: PipeEnd,
}

impl PipePair {
    /// Allocates a new pipe. Both ends are close-on-exec, so a child only
    /// ever holds the ends explicitly wired into its stdio.
    pub fn new() -> Result<Self> {
        let (read, write) = os_pipe().map_err(|e| MountError::environment("failed to allocate pipe", e))?;
        Ok(Self {
            read: PipeEnd(read),
            write: PipeEnd(write),
        })
    }
}

/// The two pipes that together connect the server and client legs.
#[derive(Debug)]
pub struct PipeBridge {
    /// Carries sftp responses from the ssh leg to sshfs.
    pub server_to_client: PipePair,
    /// Carries sftp requests from sshfs to the ssh leg.
    pub client_to_server: PipePair,
}

impl PipeBridge {
    pub fn new() -> Result<Self> {
        Ok(Self {
            server_to_client: PipePair::new()?,
            client_to_server: PipePair::new()?,
        })
    }

    /// Splits the bridge into the stdio each leg receives.
    pub fn into_ends(self) -> (LegStdio, LegStdio) {
        let server = LegStdio {
            stdin: self.client_to_server.read,
            stdout: self.server_to_client.write,
        };
        let client = LegStdio {
            stdin: self.server_to_client.read,
            stdout: self.client_to_server.write,
        };
        (server, client)
    }
}

/// The pipe ends owned by one leg: never both ends of the same pipe.
#[derive(Debug)]
pub struct LegStdio {
    pub stdin: PipeEnd,
    pub stdout: PipeEnd,
}

#[cfg(unix)]
fn os_pipe() -> io::Result<(File, File)> {
    use std::os::unix::io::FromRawFd;

    let (read_fd, write_fd) = cloexec_pipe()?;
    // SAFETY: both descriptors were just returned by pipe(2) and are owned
    // by nothing else.
    Ok(unsafe { (File::from_raw_fd(read_fd), File::from_raw_fd(write_fd)) })
}

/// pipe2(2) sets the flag atomically, so a fork on another thread never
/// inherits the descriptors.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn cloexec_pipe() -> nix::Result<(RawFd, RawFd)> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn cloexec_pipe() -> nix::Result<(RawFd, RawFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let (read_fd, write_fd) = nix::unistd::pipe()?;
    for fd in [read_fd, write_fd] {
        if let Err(e) = fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) {
            let _ = nix::unistd::close(read_fd);
            let _ = nix::unistd::close(write_fd);
            return Err(e);
        }
    }
    Ok((read_fd, write_fd))
}

#[cfg(windows)]
fn os_pipe() -> io::Result<(File, File)> {
    use std::os::windows::io::OwnedHandle;

    // Anonymous pipe handles are created non-inheritable.
    let (read, write) = io::pipe()?;
    Ok((
        File::from(OwnedHandle::from(read)),
        File::from(OwnedHandle::from(write)),
    ))
}
