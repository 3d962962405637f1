//! Session recording in asciinema v2 format.
//!
//! A recording keeps the timing of every chunk the probe read and of the
//! command it injected, so a run can be replayed with `asciinema play`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use ptyprobe_core::{Result, TargetSettings};

/// Asciinema v2 format header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsciinemaHeader {
    /// Format version (always 2)
    pub version: u8,
    /// Terminal width
    pub width: u16,
    /// Terminal height
    pub height: u16,
    /// Unix timestamp of recording start
    pub timestamp: Option<i64>,
    /// Command line that was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Environment variables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

/// Direction of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Bytes read from the PTY
    Output,
    /// Bytes written to the PTY
    Input,
}

impl EventKind {
    fn code(self) -> &'static str {
        match self {
            EventKind::Output => "o",
            EventKind::Input => "i",
        }
    }
}

/// A single recording event.
#[derive(Debug, Clone)]
pub struct RecordEvent {
    /// Seconds since the recording started
    pub time: f64,
    /// Output or input
    pub kind: EventKind,
    /// Event data, lossily decoded (asciinema stores text)
    pub data: String,
}

/// Records a probe session in asciinema v2 format.
///
/// # Example
///
/// ```
/// use ptyprobe_core::TargetSettings;
/// use ptyprobe_session::SessionRecorder;
///
/// let mut recorder = SessionRecorder::new(&TargetSettings::default());
/// recorder.record_output(b"Tips for getting started\r\n");
/// recorder.record_input(b"/stats\r");
/// assert_eq!(recorder.event_count(), 2);
/// ```
#[derive(Debug)]
pub struct SessionRecorder {
    events: Vec<RecordEvent>,
    start_time: Instant,
    started_at: SystemTime,
    width: u16,
    height: u16,
    command: String,
    env: HashMap<String, String>,
}

impl SessionRecorder {
    /// Create a recorder for a session launched with `target`.
    pub fn new(target: &TargetSettings) -> Self {
        let mut command = target.program.clone();
        for arg in &target.args {
            command.push(' ');
            command.push_str(arg);
        }

        let mut env = HashMap::new();
        env.insert("TERM".to_string(), target.term.clone());
        if let Ok(shell) = std::env::var("SHELL") {
            env.insert("SHELL".to_string(), shell);
        }

        Self {
            events: Vec::new(),
            start_time: Instant::now(),
            started_at: SystemTime::now(),
            width: target.cols,
            height: target.rows,
            command,
            env,
        }
    }

    /// Record bytes read from the PTY.
    pub fn record_output(&mut self, data: &[u8]) {
        self.push(EventKind::Output, data);
    }

    /// Record bytes written to the PTY.
    pub fn record_input(&mut self, data: &[u8]) {
        self.push(EventKind::Input, data);
    }

    fn push(&mut self, kind: EventKind, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.events.push(RecordEvent {
            time: self.start_time.elapsed().as_secs_f64(),
            kind,
            data: String::from_utf8_lossy(data).into_owned(),
        });
    }

    /// Recorded events, oldest first.
    pub fn events(&self) -> &[RecordEvent] {
        &self.events
    }

    /// Get the number of recorded events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Time of the last event in seconds.
    pub fn duration(&self) -> f64 {
        self.events.last().map(|e| e.time).unwrap_or(0.0)
    }

    fn header(&self) -> AsciinemaHeader {
        AsciinemaHeader {
            version: 2,
            width: self.width,
            height: self.height,
            timestamp: self
                .started_at
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs() as i64),
            command: Some(self.command.clone()),
            env: Some(self.env.clone()),
        }
    }

    /// Save the recording to a file in asciinema v2 format.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        self.save_to_writer(&mut file)
    }

    /// Save the recording to a writer in asciinema v2 format.
    ///
    /// - Line 1: JSON header
    /// - Line 2+: JSON event arrays `[time, code, data]`
    pub fn save_to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        serde_json::to_writer(&mut *writer, &self.header())?;
        writeln!(writer)?;

        for event in &self.events {
            let event_array = serde_json::json!([event.time, event.kind.code(), event.data]);
            serde_json::to_writer(&mut *writer, &event_array)?;
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }
}
