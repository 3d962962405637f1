//! The seam between the session driver and the process it drives.

use std::time::Instant;

use ptyprobe_core::Result;

/// Outcome of one drain step.
///
/// Read failures after the child goes away are folded into [`Drained::Ended`]
/// so the driver never sees them as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drained {
    /// Nothing became readable within the poll window
    Idle,
    /// Bytes were read and the stream is still open
    Output(Vec<u8>),
    /// The child closed its end; carries any bytes read before the close
    Ended(Vec<u8>),
}

impl Drained {
    /// Bytes carried by this outcome.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Drained::Idle => &[],
            Drained::Output(bytes) | Drained::Ended(bytes) => bytes,
        }
    }

    /// Take the bytes carried by this outcome.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Drained::Idle => Vec::new(),
            Drained::Output(bytes) | Drained::Ended(bytes) => bytes,
        }
    }

    /// Whether the stream has ended.
    pub fn is_ended(&self) -> bool {
        matches!(self, Drained::Ended(_))
    }
}

/// A child process attached to a terminal.
///
/// [`crate::PtyHandle`] is the real implementation; tests script their own.
pub trait Terminal {
    /// Process ID of the child, if it started.
    fn pid(&self) -> Option<u32>;

    /// Read whatever output is available.
    ///
    /// Waits at most one poll window for the first byte. Once data is
    /// flowing, keeps reading until the stream goes quiet, ends, or
    /// `deadline` passes. Never returns an error.
    fn drain_available(&mut self, deadline: Instant) -> Drained;

    /// Write bytes to the child's input.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Force-terminate the child. Errors (child already gone) are ignored.
    fn kill(&mut self);
}
