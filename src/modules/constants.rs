use std::time::Duration;

// External binaries
pub const SSH_PATH: &str = "/usr/bin/ssh";
pub const SFTP_SERVER_PATH: &str = "/usr/libexec/openssh/sftp-server";
pub const SSHFS_PATH: &str = "/usr/bin/sshfs";

// Mount verification
pub const MAX_MOUNT_CHECKS: u32 = 7;
pub const MOUNT_CHECK_INTERVAL: Duration = Duration::from_secs(2);
pub const MOUNT_TABLE_PATH: &str = "/proc/mounts";

// SSH leg
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const SERVER_ALIVE_INTERVAL: u32 = 30;
pub const NULL_DEVICE: &str = "/dev/null";

// Diagnostics
pub const DEFAULT_DIAGNOSTICS_ROOT: &str = "/tmp/revmount";
pub const SERVER_STDERR_FILE: &str = "revmount_sftp_server_stderr.txt";
pub const CLIENT_STDERR_FILE: &str = "revmount_sshfs_stderr.txt";
pub const ATTEMPT_RECORD_FILE: &str = "revmount_attempt.json";
