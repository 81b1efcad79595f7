use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, LevelFilter};
use revmount::modules::command::{client_command, server_command};
use revmount::modules::record::AttemptRecord;
use revmount::{
    GuestPathExpander, HostPath, MountConfig, MountError, MountOrchestrator, MountTable,
    ProcMounts, RemoteShellExpander, Verbatim,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a guest directory on the host over a reverse sshfs channel
    Mount(MountArgs),
    /// Print the ssh and sshfs command lines without running them
    Command(MountArgs),
    /// Report whether a host path is mounted
    Status {
        /// Host mount point
        host_path: String,
        /// Directory holding the diagnostics of the last attempt
        #[arg(long)]
        diagnostics_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct MountArgs {
    /// JSON file with mount settings; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory on the guest to mount
    #[arg(long)]
    guest_path: Option<String>,
    /// Mount point on the host
    #[arg(long)]
    host_path: Option<String>,
    /// Guest ssh host
    #[arg(long)]
    ssh_host: Option<String>,
    /// Guest ssh port (defaults to 22)
    #[arg(long)]
    ssh_port: Option<u16>,
    /// Guest ssh user
    #[arg(long)]
    ssh_user: Option<String>,
    /// Private key; may be repeated, the first one is used
    #[arg(short, long = "identity-file")]
    identity_files: Vec<PathBuf>,
    /// Extra ssh options, appended verbatim
    #[arg(long, allow_hyphen_values = true)]
    ssh_opts: Option<String>,
    /// Extra sshfs options, appended verbatim
    #[arg(long, allow_hyphen_values = true)]
    sshfs_opts: Option<String>,
    /// Where stderr captures and the attempt record are written
    #[arg(long)]
    diagnostics_dir: Option<PathBuf>,
    /// Let the guest shell expand `~` and variables in the guest path
    #[arg(long, overrides_with = "no_expand_guest_path")]
    expand_guest_path: bool,
    /// Use the guest path as given, even if the config enables expansion
    #[arg(long)]
    no_expand_guest_path: bool,
}

impl MountArgs {
    fn into_config(self) -> Result<MountConfig> {
        let base = match &self.config {
            Some(path) => MountConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => MountConfig::default(),
        };
        let overrides = MountConfig {
            guest_path: self.guest_path,
            host_path: self.host_path,
            ssh_host: self.ssh_host,
            ssh_port: self.ssh_port,
            ssh_username: self.ssh_user,
            identity_files: self.identity_files,
            ssh_opts_append: self.ssh_opts,
            sshfs_opts_append: self.sshfs_opts,
            diagnostics_dir: self.diagnostics_dir,
            expand_guest_path: match (self.expand_guest_path, self.no_expand_guest_path) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
            ..MountConfig::default()
        };
        Ok(base.merge(overrides))
    }
}

fn expander(config: &MountConfig) -> Box<dyn GuestPathExpander> {
    if config.expands_guest_path() {
        Box::new(RemoteShellExpander::new(config.tools.clone()))
    } else {
        Box::new(Verbatim)
    }
}

fn run_mount(args: MountArgs) -> Result<()> {
    let config = args.into_config()?;
    let request = config.to_request()?;
    let diagnostics_dir = config.diagnostics_dir_for(request.host_path());
    info!("Diagnostics for this attempt go to {}", diagnostics_dir.display());

    let mut orchestrator = MountOrchestrator::new(diagnostics_dir)
        .with_tools(config.tools.clone())
        .with_expander(expander(&config));

    match orchestrator.mount(&request) {
        Ok(report) if report.already_mounted => {
            println!("{} is already mounted", report.host_path);
            Ok(())
        }
        Ok(report) => {
            println!("Mounted {} => {}", report.guest_path, report.host_path);
            Ok(())
        }
        Err(MountError::Timeout { host_path, diagnostics, .. }) => {
            error!("Reverse mount of {} failed", host_path);
            eprintln!("{}", diagnostics);
            anyhow::bail!("reverse mount of {} did not come up", host_path)
        }
        Err(e) => Err(e.into()),
    }
}

fn run_command(args: MountArgs) -> Result<()> {
    let config = args.into_config()?;
    let request = config.to_request()?;
    let guest_path = expander(&config).expand(&request)?;
    println!("{}", server_command(&request, &config.tools));
    println!("{}", client_command(&request, &guest_path, &config.tools));
    Ok(())
}

fn run_status(host_path: &str, diagnostics_dir: Option<PathBuf>) -> Result<bool> {
    let host_path = HostPath::normalize(host_path)?;
    let mounted = ProcMounts::new().is_mounted(&host_path)?;
    println!(
        "{}: {}",
        host_path,
        if mounted { "mounted" } else { "not mounted" }
    );

    let config = MountConfig {
        diagnostics_dir,
        ..MountConfig::default()
    };
    let dir = config.diagnostics_dir_for(&host_path);
    if let Some(record) = AttemptRecord::load(&dir)? {
        println!("Last attempt: {}", record.id);
        println!("  Guest path: {}", record.guest_path);
        println!("  sftp-server PID: {}", record.server_pid);
        println!("  sshfs PID: {}", record.client_pid);
        println!("  sftp-server stderr: {}", record.server_stderr.display());
        println!("  sshfs stderr: {}", record.client_stderr.display());
    }
    Ok(mounted)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logger based on verbose flag
    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new().filter_level(log_level).init();

    match cli.command {
        Commands::Mount(args) => run_mount(args)?,
        Commands::Command(args) => run_command(args)?,
        Commands::Status {
            host_path,
            diagnostics_dir,
        } => {
            if !run_status(&host_path, diagnostics_dir)? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
