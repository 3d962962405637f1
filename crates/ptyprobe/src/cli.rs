//! Command-line arguments and their overlay on the config file.

use std::path::PathBuf;

use clap::Parser;

use ptyprobe_core::{ProbeConfig, Result};

/// Drive an interactive terminal program through a PTY and dump its output
#[derive(Parser, Debug)]
#[command(name = "ptyprobe")]
#[command(about = "Launch a terminal program, send it a command once it is ready, dump everything it printed")]
#[command(version)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Recognition pattern (repeatable; replaces the configured list)
    #[arg(short, long = "pattern", value_name = "PATTERN")]
    pub patterns: Vec<String>,

    /// Command to send once a pattern is seen (a carriage return is appended)
    #[arg(long, value_name = "CMD")]
    pub command: Option<String>,

    /// Session ceiling in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Delay between seeing the prompt and sending the command
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// TERM value for the child
    #[arg(long, value_name = "TERM")]
    pub term: Option<String>,

    /// Save an asciinema v2 recording here
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,

    /// Write the dump to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Program and arguments to launch
    #[arg(last = true, value_name = "PROGRAM")]
    pub program: Vec<String>,
}

impl Cli {
    /// Build the effective configuration: flags over the config file over
    /// defaults. The result is validated.
    pub fn into_config(self) -> Result<ProbeConfig> {
        let mut config = match &self.config {
            Some(path) => ProbeConfig::from_file(path)?,
            None => ProbeConfig::default(),
        };

        if let Some((program, args)) = self.program.split_first() {
            config.target.program = program.clone();
            config.target.args = args.to_vec();
        }
        if let Some(term) = self.term {
            config.target.term = term;
        }

        if !self.patterns.is_empty() {
            config.trigger.patterns = self.patterns;
        }
        if let Some(command) = self.command {
            config.trigger.command = command;
        }

        if let Some(secs) = self.timeout_secs {
            config.timing.session_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(ms) = self.settle_ms {
            config.timing.settle_delay_ms = ms;
        }

        if let Some(path) = self.output {
            config.output.dump_path = Some(path);
        }
        if let Some(path) = self.record {
            config.output.record_path = Some(path);
        }
        if let Some(level) = self.log_level {
            config.output.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }
}
