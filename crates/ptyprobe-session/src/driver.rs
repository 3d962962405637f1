//! The session driver: poll, accumulate, trigger once, dump.

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use ptyprobe_core::{ProbeConfig, SessionState, TimingSettings};

use crate::dump::write_dump;
use crate::output::TranscriptBuffer;
use crate::recording::SessionRecorder;
use crate::terminal::{Drained, Terminal};
use crate::trigger::PromptTrigger;

/// Summary of a finished session.
///
/// Informational only; nothing in it changes what is dumped or the exit
/// status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Child process ID, if the program started
    pub pid: Option<u32>,
    /// Bytes captured
    pub bytes_captured: usize,
    /// Non-empty chunks captured
    pub chunks: usize,
    /// Whether the command was sent
    pub command_sent: bool,
    /// Pattern that triggered the command
    pub matched_pattern: Option<String>,
    /// Time from loop start to the prompt being seen
    pub prompt_after: Option<Duration>,
    /// Time from loop start to finalize
    pub elapsed: Duration,
    /// Whether the child closed its end before the timeout
    pub stream_ended: bool,
}

impl std::fmt::Display for SessionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "captured {} bytes in {} chunks over {:.1}s",
            self.bytes_captured,
            self.chunks,
            self.elapsed.as_secs_f64()
        )?;
        match (&self.matched_pattern, self.prompt_after) {
            (Some(pattern), Some(after)) => write!(
                f,
                ", prompt {:?} seen after {:.1}s",
                pattern,
                after.as_secs_f64()
            )?,
            _ => write!(f, ", prompt never seen")?,
        }
        if self.stream_ended {
            write!(f, ", child output ended early")?;
        }
        Ok(())
    }
}

/// Drives one interactive session to completion.
///
/// ```no_run
/// use ptyprobe_core::ProbeConfig;
/// use ptyprobe_session::{PtyHandle, SessionDriver};
///
/// # fn example() -> ptyprobe_core::Result<()> {
/// let config = ProbeConfig::default();
/// let pty = PtyHandle::spawn(&config.target, &config.timing)?;
/// let mut driver = SessionDriver::new(pty, &config);
/// driver.run();
/// let report = driver.finalize(&mut std::io::stdout().lock());
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionDriver<T: Terminal> {
    terminal: T,
    timing: TimingSettings,
    trigger: PromptTrigger,
    transcript: TranscriptBuffer,
    state: SessionState,
    recorder: Option<SessionRecorder>,
    started: Option<Instant>,
    prompt_after: Option<Duration>,
    matched_pattern: Option<String>,
    stream_ended: bool,
}

impl<T: Terminal> SessionDriver<T> {
    /// Create a driver for an already-spawned terminal.
    pub fn new(terminal: T, config: &ProbeConfig) -> Self {
        Self::with_trigger(
            terminal,
            config.timing.clone(),
            PromptTrigger::from_settings(&config.trigger),
        )
    }

    /// Create a driver with an explicit trigger.
    pub fn with_trigger(terminal: T, timing: TimingSettings, trigger: PromptTrigger) -> Self {
        let mut state = SessionState::Launching;
        state.advance(SessionState::AwaitingPrompt);

        Self {
            terminal,
            timing,
            trigger,
            transcript: TranscriptBuffer::new(),
            state,
            recorder: None,
            started: None,
            prompt_after: None,
            matched_pattern: None,
            stream_ended: false,
        }
    }

    /// Record the session while it runs.
    pub fn with_recorder(mut self, recorder: SessionRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Child process ID.
    pub fn pid(&self) -> Option<u32> {
        self.terminal.pid()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Output captured so far.
    pub fn transcript(&self) -> &TranscriptBuffer {
        &self.transcript
    }

    /// Whether the command has been sent.
    pub fn command_sent(&self) -> bool {
        self.trigger.has_fired()
    }

    /// The driven terminal.
    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    /// Take the recorder out, if one was attached.
    pub fn take_recorder(&mut self) -> Option<SessionRecorder> {
        self.recorder.take()
    }

    /// Run the polling loop until the session timeout elapses.
    ///
    /// The timeout is the only way out; the child exiting or the prompt
    /// being seen does not end the loop early.
    pub fn run(&mut self) {
        let start = Instant::now();
        self.started = Some(start);
        let ceiling = self.timing.session_timeout();
        let deadline = start + ceiling;
        let sleep = self.timing.loop_sleep();

        info!("Session loop started: pid={:?}, ceiling={:?}", self.pid(), ceiling);

        while start.elapsed() < ceiling {
            self.poll_once(deadline);
            thread::sleep(sleep);
        }

        self.state.advance(SessionState::Finalizing);
        info!(
            "Session timeout reached after {:?}: {} bytes captured",
            start.elapsed(),
            self.transcript.len()
        );
    }

    /// One loop iteration without the trailing sleep: drain, append, and
    /// inject the command if the prompt is now visible.
    pub fn poll_once(&mut self, deadline: Instant) {
        self.started.get_or_insert_with(Instant::now);

        let drained = self.terminal.drain_available(deadline);
        let ended = drained.is_ended();
        self.absorb(drained);

        if ended && !self.stream_ended {
            self.stream_ended = true;
            info!(
                "Child output stream ended after {} bytes",
                self.transcript.len()
            );
        }

        if let Some(index) = self.trigger.check(&self.transcript) {
            self.inject(index, deadline);
        }
    }

    fn absorb(&mut self, drained: Drained) {
        let bytes = drained.into_bytes();
        if bytes.is_empty() {
            return;
        }
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record_output(&bytes);
        }
        self.transcript.append(&bytes);
    }

    fn inject(&mut self, index: usize, deadline: Instant) {
        let pattern = self
            .trigger
            .pattern(index)
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default();
        let command = self.trigger.command().to_vec();

        info!(
            "Detected prompt {:?}, sending {:?}",
            pattern,
            String::from_utf8_lossy(&command)
        );
        self.state.advance(SessionState::PromptSeen);
        self.prompt_after = self.started.map(|s| s.elapsed());
        self.matched_pattern = Some(pattern);

        // Never settle past the session deadline.
        let settle = self
            .timing
            .settle_delay()
            .min(deadline.saturating_duration_since(Instant::now()));
        thread::sleep(settle);

        match self.terminal.write(&command) {
            Ok(n) => debug!("Sent {} command bytes", n),
            Err(e) => warn!("Failed to send command: {}", e),
        }
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record_input(&command);
        }
        self.trigger.mark_fired();
    }

    /// Dump the transcript to `out`, then kill the child.
    ///
    /// Dump failures are logged, never returned; the child is killed either
    /// way.
    pub fn finalize<W: Write>(&mut self, out: &mut W) -> SessionReport {
        if !self.state.is_terminal() {
            self.state.advance(SessionState::Finalizing);
        }

        match write_dump(out, self.transcript.as_bytes()) {
            Ok(mode) => debug!("Transcript dumped ({:?}, {} bytes)", mode, self.transcript.len()),
            Err(e) => error!("Failed to write transcript dump: {}", e),
        }

        let report = self.report();
        self.terminal.kill();
        report
    }

    /// Snapshot of the session so far.
    pub fn report(&self) -> SessionReport {
        SessionReport {
            pid: self.terminal.pid(),
            bytes_captured: self.transcript.len(),
            chunks: self.transcript.chunk_count(),
            command_sent: self.trigger.has_fired(),
            matched_pattern: self.matched_pattern.clone(),
            prompt_after: self.prompt_after,
            elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
            stream_ended: self.stream_ended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use ptyprobe_core::{Error, TargetSettings, TriggerSettings};

    /// Replays scripted drain outcomes, then reports `Idle` (or `Ended` once
    /// an `Ended` has been played).
    #[derive(Debug, Default)]
    struct ScriptedTerminal {
        script: VecDeque<Drained>,
        drains: usize,
        ended: bool,
        writes: Vec<(Vec<u8>, usize, Instant)>,
        fail_writes: bool,
        kills: usize,
        pattern_delivered_at: Option<Instant>,
    }

    impl ScriptedTerminal {
        fn new(script: Vec<Drained>) -> Self {
            Self {
                script: script.into(),
                ..Self::default()
            }
        }
    }

    impl Terminal for ScriptedTerminal {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }

        fn drain_available(&mut self, _deadline: Instant) -> Drained {
            self.drains += 1;
            let next = match self.script.pop_front() {
                Some(next) => next,
                None if self.ended => Drained::Ended(Vec::new()),
                None => Drained::Idle,
            };
            if next.is_ended() {
                self.ended = true;
            }
            if self.pattern_delivered_at.is_none() && !next.bytes().is_empty() {
                self.pattern_delivered_at = Some(Instant::now());
            }
            next
        }

        fn write(&mut self, data: &[u8]) -> ptyprobe_core::Result<usize> {
            self.writes.push((data.to_vec(), self.drains, Instant::now()));
            if self.fail_writes {
                return Err(Error::Io(std::io::Error::other("slave gone")));
            }
            Ok(data.len())
        }

        fn kill(&mut self) {
            self.kills += 1;
        }
    }

    fn fast_timing() -> TimingSettings {
        TimingSettings {
            poll_timeout_ms: 1,
            read_chunk_size: 1024,
            settle_delay_ms: 20,
            loop_sleep_ms: 5,
            session_timeout_ms: 300,
        }
    }

    fn driver(script: Vec<Drained>) -> SessionDriver<ScriptedTerminal> {
        SessionDriver::with_trigger(
            ScriptedTerminal::new(script),
            fast_timing(),
            PromptTrigger::from_settings(&TriggerSettings::default()),
        )
    }

    fn out(bytes: &[u8]) -> Drained {
        Drained::Output(bytes.to_vec())
    }

    #[test]
    fn test_initial_state() {
        let driver = driver(vec![]);
        assert_eq!(driver.state(), SessionState::AwaitingPrompt);
        assert!(!driver.command_sent());
        assert!(driver.transcript().is_empty());
    }

    #[test]
    fn test_injects_once() {
        let mut driver = driver(vec![
            out(b"Welcome! Tips for getting started:\r\n"),
            Drained::Idle,
            out(b"Tips for getting started /help\r\n"),
        ]);
        driver.run();

        let writes = &driver.terminal().writes;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, b"/stats\r");
        assert!(driver.command_sent());
        assert_eq!(driver.state(), SessionState::Finalizing);

        let report = driver.report();
        assert!(report.command_sent);
        assert_eq!(
            report.matched_pattern.as_deref(),
            Some("Tips for getting started")
        );
        assert!(report.prompt_after.is_some());
    }

    #[test]
    fn test_no_injection_without_prompt() {
        let mut driver = driver(vec![out(b"Loading..."), out(b" still loading")]);
        driver.run();

        assert!(driver.terminal().writes.is_empty());
        assert!(!driver.command_sent());
        assert_eq!(driver.state(), SessionState::Finalizing);
        assert_eq!(driver.transcript().as_bytes(), b"Loading... still loading");
    }

    #[test]
    fn test_prompt_split_across_chunks() {
        let mut driver = driver(vec![out(b"Tips for get"), out(b"ting started")]);
        driver.run();

        let writes = &driver.terminal().writes;
        assert_eq!(writes.len(), 1);
        // Written during the second drain, not the first.
        assert_eq!(writes[0].1, 2);
    }

    #[test]
    fn test_settle_delay_before_write() {
        let mut driver = driver(vec![out(b"/help")]);
        driver.run();

        let terminal = driver.terminal();
        let seen = terminal.pattern_delivered_at.unwrap();
        let written = terminal.writes[0].2;
        assert!(written.duration_since(seen) >= Duration::from_millis(20));
    }

    #[test]
    fn test_settle_capped_by_deadline() {
        let timing = TimingSettings {
            settle_delay_ms: 5_000,
            session_timeout_ms: 100,
            ..fast_timing()
        };
        let mut driver = SessionDriver::with_trigger(
            ScriptedTerminal::new(vec![out(b"/help")]),
            timing,
            PromptTrigger::from_settings(&TriggerSettings::default()),
        );

        let started = Instant::now();
        driver.run();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(driver.terminal().writes.len(), 1);
    }

    #[test]
    fn test_transcript_is_concatenation_in_order() {
        let chunks: Vec<&[u8]> = vec![b"a", b"\x1b[1m", b"\xff\xfe", b"z"];
        let mut script: Vec<Drained> = Vec::new();
        for chunk in &chunks {
            script.push(out(chunk));
            script.push(Drained::Idle);
        }
        let mut driver = driver(script);
        driver.run();

        assert_eq!(driver.transcript().as_bytes(), chunks.concat());
        assert_eq!(driver.transcript().chunk_count(), 4);
    }

    #[test]
    fn test_silent_child_dumps_empty() {
        let mut driver = driver(vec![]);
        driver.run();

        let mut dump = Vec::new();
        let report = driver.finalize(&mut dump);

        assert_eq!(dump, b"=== DUMP START ===\n=== DUMP END ===\n");
        assert_eq!(report.bytes_captured, 0);
        assert!(!report.command_sent);
        assert_eq!(driver.terminal().kills, 1);
    }

    #[test]
    fn test_ended_stream_still_runs_to_timeout() {
        let mut driver = driver(vec![Drained::Ended(b"bye".to_vec())]);

        let started = Instant::now();
        driver.run();
        assert!(started.elapsed() >= Duration::from_millis(300));

        // Polling continued after the end of stream.
        assert!(driver.terminal().drains > 1);

        let mut dump = Vec::new();
        let report = driver.finalize(&mut dump);
        assert!(report.stream_ended);
        assert_eq!(dump, b"=== DUMP START ===\nbye=== DUMP END ===\n");
    }

    #[test]
    fn test_loop_terminates_near_ceiling() {
        let mut driver = driver(vec![out(b"noise"); 5]);

        let started = Instant::now();
        driver.run();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(300 + 200), "took {elapsed:?}");
    }

    #[test]
    fn test_failed_write_still_counts_as_sent() {
        let mut terminal = ScriptedTerminal::new(vec![out(b"/help"), out(b"/help")]);
        terminal.fail_writes = true;
        let mut driver = SessionDriver::with_trigger(
            terminal,
            fast_timing(),
            PromptTrigger::from_settings(&TriggerSettings::default()),
        );
        driver.run();

        assert_eq!(driver.terminal().writes.len(), 1);
        assert!(driver.command_sent());
    }

    #[test]
    fn test_finalize_kills_and_reports() {
        let mut driver = driver(vec![out(b"Tips for getting started")]);
        driver.run();

        let mut dump = Vec::new();
        let report = driver.finalize(&mut dump);

        assert_eq!(report.pid, Some(4242));
        assert_eq!(report.bytes_captured, 24);
        assert_eq!(report.chunks, 1);
        assert!(report.command_sent);
        assert!(!report.stream_ended);
        assert_eq!(driver.terminal().kills, 1);
        assert!(report.to_string().contains("prompt \"Tips for getting started\""));
    }

    #[test]
    fn test_finalize_without_run() {
        let mut driver = driver(vec![]);
        let mut dump = Vec::new();
        let report = driver.finalize(&mut dump);

        assert_eq!(driver.state(), SessionState::Finalizing);
        assert_eq!(report.elapsed, Duration::ZERO);
        assert_eq!(driver.terminal().kills, 1);
    }

    #[test]
    fn test_recorder_sees_output_and_input() {
        let mut driver =
            driver(vec![out(b"Tips for getting started"), out(b"stats")])
                .with_recorder(SessionRecorder::new(&TargetSettings::default()));
        driver.run();

        let recorder = driver.take_recorder().unwrap();
        let kinds: Vec<_> = recorder
            .events()
            .iter()
            .map(|e| (e.kind, e.data.clone()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (crate::recording::EventKind::Output, "Tips for getting started".to_string()),
                (crate::recording::EventKind::Input, "/stats\r".to_string()),
                (crate::recording::EventKind::Output, "stats".to_string()),
            ]
        );
    }
}
