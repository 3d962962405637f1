//! Configuration types for ptyprobe.
//!
//! Every value has a default matching the stock probe: launch `gemini`, wait
//! for its welcome banner, send `/stats`, capture for fifteen seconds. A YAML
//! file may override any subset of it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Carriage return appended to the injected command.
pub const SUBMIT_BYTE: u8 = b'\r';

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Probe configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// Program to launch
    pub target: TargetSettings,
    /// Prompt recognition and the command to inject
    pub trigger: TriggerSettings,
    /// Polling and timeout constants
    pub timing: TimingSettings,
    /// Where the transcript and logs go
    pub output: OutputSettings,
}

impl ProbeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProbeConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.target.validate()?;
        self.trigger.validate()?;
        self.timing.validate()?;

        if !LOG_LEVELS.contains(&self.output.log_level.as_str()) {
            return Err(Error::Config(format!(
                "output.log_level must be one of {LOG_LEVELS:?}, got '{}'",
                self.output.log_level
            )));
        }

        Ok(())
    }
}

/// The program launched on the PTY.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetSettings {
    /// Executable name or path (resolved through PATH)
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// TERM environment variable value
    pub term: String,
    /// Terminal rows
    pub rows: u16,
    /// Terminal columns
    pub cols: u16,
    /// Working directory (inherits the current one when unset)
    pub working_directory: Option<PathBuf>,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            program: "gemini".to_string(),
            args: Vec::new(),
            term: "xterm-256color".to_string(),
            rows: 24,
            cols: 80,
            working_directory: None,
        }
    }
}

impl TargetSettings {
    fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(Error::Config("target.program cannot be empty".to_string()));
        }
        if self.term.trim().is_empty() {
            return Err(Error::Config("target.term cannot be empty".to_string()));
        }
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::Config(format!(
                "terminal dimensions must be > 0, got {}x{}",
                self.rows, self.cols
            )));
        }
        Ok(())
    }
}

/// Prompt recognition patterns and the command sent once one is seen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TriggerSettings {
    /// Substrings that signal the program is ready for input.
    /// Matched case-sensitively anywhere in the accumulated output.
    pub patterns: Vec<String>,
    /// Command typed into the program, without the trailing carriage return
    pub command: String,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            patterns: vec!["Tips for getting started".to_string(), "/help".to_string()],
            command: "/stats".to_string(),
        }
    }
}

impl TriggerSettings {
    /// Bytes written to the PTY: the command followed by a single `\r`.
    pub fn command_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.command.len() + 1);
        bytes.extend_from_slice(self.command.as_bytes());
        bytes.push(SUBMIT_BYTE);
        bytes
    }

    /// Patterns as raw byte sequences.
    pub fn pattern_bytes(&self) -> Vec<Vec<u8>> {
        self.patterns.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(Error::Config(
                "trigger.patterns must contain at least one pattern".to_string(),
            ));
        }
        if self.patterns.iter().any(|p| p.is_empty()) {
            return Err(Error::Config(
                "trigger.patterns cannot contain an empty pattern".to_string(),
            ));
        }
        if self.command.is_empty() {
            return Err(Error::Config("trigger.command cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Timing constants for the polling loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingSettings {
    /// Bound on each readiness wait, in milliseconds
    pub poll_timeout_ms: u64,
    /// Maximum bytes per read call
    pub read_chunk_size: usize,
    /// Pause between seeing the prompt and writing the command, in milliseconds
    pub settle_delay_ms: u64,
    /// Sleep between loop iterations, in milliseconds
    pub loop_sleep_ms: u64,
    /// Total session length, in milliseconds
    pub session_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            read_chunk_size: 10 * 1024,
            settle_delay_ms: 1000,
            loop_sleep_ms: 100,
            session_timeout_ms: 15_000,
        }
    }
}

impl TimingSettings {
    /// Readiness wait bound.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Delay before the command is written.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Sleep between iterations.
    pub fn loop_sleep(&self) -> Duration {
        Duration::from_millis(self.loop_sleep_ms)
    }

    /// Session ceiling.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            return Err(Error::Config("timing.read_chunk_size must be > 0".to_string()));
        }
        if self.session_timeout_ms == 0 {
            return Err(Error::Config(
                "timing.session_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Output destinations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSettings {
    /// Write the dump here instead of stdout
    pub dump_path: Option<PathBuf>,
    /// Save an asciinema v2 recording of the session here
    pub record_path: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dump_path: None,
            record_path: None,
            log_level: "info".to_string(),
        }
    }
}
