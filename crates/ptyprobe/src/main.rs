//! # ptyprobe
//!
//! Spawns the configured program (default `gemini`) on a PTY, sends `/stats`
//! once its welcome banner shows, and after the session ceiling dumps the raw
//! transcript between `=== DUMP START ===` and `=== DUMP END ===` markers.
//!
//! stdout carries only the start line and the dump; logs go to stderr.

use anyhow::Context;
use clap::Parser;
use ptyprobe::{run_probe, Cli};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config().context("invalid configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.output.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "ptyprobe v{} starting: program='{}', ceiling={:?}",
        env!("CARGO_PKG_VERSION"),
        config.target.program,
        config.timing.session_timeout()
    );

    let report = run_probe(&config).map_err(|e| {
        tracing::error!("Probe failed: {}", e);
        e
    })?;

    if !report.command_sent {
        tracing::warn!("No prompt recognized; command was never sent");
    }

    Ok(())
}
