//! One probe run, from spawn to dump.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use ptyprobe_core::{ProbeConfig, Result};
use ptyprobe_session::{
    write_started_line, PtyHandle, SessionDriver, SessionRecorder, SessionReport, Terminal,
};

/// Run one session with `config`.
///
/// Only PTY creation can fail. Everything after that, including a program
/// that never starts, ends in a dump.
///
/// The `Started <program> pid <pid>` line needs a pid. portable-pty resolves
/// the program before forking, so a program that cannot be found or executed
/// yields no child and no Started line on stdout; stdout then holds only the
/// (empty) dump, and the cause is logged at `error` on stderr.
pub fn run_probe(config: &ProbeConfig) -> Result<SessionReport> {
    let pty = PtyHandle::spawn(&config.target, &config.timing)?;

    if let Some(pid) = pty.pid() {
        if let Err(e) = write_started_line(&mut io::stdout().lock(), pty.program(), pid) {
            warn!("Failed to print start line: {}", e);
        }
    }

    let mut driver = SessionDriver::new(pty, config);
    if config.output.record_path.is_some() {
        driver = driver.with_recorder(SessionRecorder::new(&config.target));
    }

    driver.run();

    let mut out = dump_destination(config.output.dump_path.as_deref());
    let report = driver.finalize(&mut out);
    drop(out);

    if let (Some(path), Some(recorder)) = (&config.output.record_path, driver.take_recorder()) {
        match recorder.save_to_file(path) {
            Ok(()) => info!(
                "Recording saved to {} ({} events)",
                path.display(),
                recorder.event_count()
            ),
            Err(e) => warn!("Failed to save recording to {}: {}", path.display(), e),
        }
    }

    info!("Session finished: {}", report);
    Ok(report)
}

fn dump_destination(path: Option<&Path>) -> Box<dyn Write> {
    if let Some(path) = path {
        match File::create(path) {
            Ok(file) => {
                info!("Dumping transcript to {}", path.display());
                return Box::new(BufWriter::new(file));
            }
            Err(e) => warn!(
                "Cannot create dump file {}: {}; dumping to stdout",
                path.display(),
                e
            ),
        }
    }
    Box::new(io::stdout().lock())
}
