//! Operator-facing output: the start line and the transcript dump.

use std::io::{self, Write};

use tracing::warn;

/// Line printed before the transcript.
pub const DUMP_START: &str = "=== DUMP START ===";
/// Line printed after the transcript.
pub const DUMP_END: &str = "=== DUMP END ===";

/// How the transcript made it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    /// Written byte-for-byte
    Raw,
    /// Raw write failed; written as lossy UTF-8 text
    Lossy,
}

/// Write `Started <program> pid <pid>`.
pub fn write_started_line<W: Write>(out: &mut W, program: &str, pid: u32) -> io::Result<()> {
    writeln!(out, "Started {program} pid {pid}")?;
    out.flush()
}

/// Write the start marker, the transcript, and the end marker.
///
/// The transcript goes out verbatim; no newline is added before the end
/// marker. If the raw write fails the transcript is written again as lossy
/// text. Marker failures are returned.
pub fn write_dump<W: Write>(out: &mut W, transcript: &[u8]) -> io::Result<DumpMode> {
    writeln!(out, "{DUMP_START}")?;

    let mode = match out.write_all(transcript) {
        Ok(()) => DumpMode::Raw,
        Err(e) => {
            warn!("Raw transcript write failed ({}); falling back to text", e);
            writeln!(out, "{}", String::from_utf8_lossy(transcript))?;
            DumpMode::Lossy
        }
    };

    writeln!(out, "{DUMP_END}")?;
    out.flush()?;
    Ok(mode)
}
