//! Logpipe CLI - runs a command with its output captured as log records

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::process::Command;
use tracing::{info, warn};

use logpipe_core::domain::StreamKind;
use logpipe_infra_system::{init_logger, LogFormat, LoggerConfig};

/// Exit code when the command cannot be started (same as a shell)
const EXIT_SPAWN_FAILED: i32 = 127;
/// Added to the signal number when the command was killed by a signal
const EXIT_SIGNAL_BASE: i32 = 128;

#[derive(Parser)]
#[command(name = "logpipe")]
#[command(about = "Run a command and turn its stdout/stderr into structured logs", long_about = None)]
#[command(version)]
struct Cli {
    /// Log format: pretty, compact or json (overrides LOGPIPE_LOG_FORMAT)
    #[arg(long)]
    format: Option<LogFormat>,

    /// Time listeners get to drain after the command exits
    #[arg(long, env = "LOGPIPE_DRAIN_TIMEOUT_MS")]
    drain_timeout_ms: Option<u64>,

    /// Leave the `log` crate facility alone
    #[arg(long)]
    no_legacy_log: bool,

    /// Command to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Cli {
    fn logger_config(&self) -> Result<LoggerConfig> {
        let mut config = LoggerConfig::from_env().context("Invalid logger environment")?;
        if let Some(format) = self.format {
            config.format = format;
            config.ansi = config.ansi && format != LogFormat::Json;
        }
        if let Some(ms) = self.drain_timeout_ms {
            config.drain_timeout = Duration::from_millis(ms);
        }
        if self.no_legacy_log {
            config.capture_legacy_log = false;
        }
        config.set_global_default = true;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.logger_config()?;

    let handle = init_logger(&config).context("Failed to redirect process output")?;
    handle.debug(format_args!("logpipe v{} started", logpipe_core::VERSION));

    let (program, args) = cli
        .command
        .split_first()
        .context("No command given")?;

    let code = match Command::new(program).args(args).spawn() {
        Ok(mut child) => {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = tokio::signal::ctrl_c() => {
                    handle.warn("Interrupted, stopping command");
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            match status {
                Ok(status) => exit_code(status),
                Err(e) => {
                    handle.error(&e, format_args!("Failed to wait for {}", program));
                    1
                }
            }
        }
        Err(e) => {
            handle.error(&e, format_args!("Failed to start {}", program));
            EXIT_SPAWN_FAILED
        }
    };

    let report = handle.shutdown().await.context("Failed to restore process output")?;
    for stream in StreamKind::ALL {
        if let Some(summary) = report.summary(stream) {
            info!(
                stream = %stream,
                lines = summary.lines_forwarded,
                end = ?summary.end,
                "Stream closed"
            );
        }
    }
    if code != 0 {
        warn!(exit_code = code, "Command failed");
    }

    std::process::exit(code)
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| EXIT_SIGNAL_BASE + sig))
        .unwrap_or(1)
}
