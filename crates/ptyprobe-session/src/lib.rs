//! # ptyprobe-session
//!
//! The interactive session driver for ptyprobe.
//!
//! This crate provides:
//! - PTY spawning and bounded, non-blocking output draining
//! - An append-only transcript buffer
//! - The one-shot prompt trigger
//! - The polling loop and the final dump
//! - Optional asciinema recording of the session
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on ptyprobe-core for
//! configuration, errors and the session state machine.

#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(not(unix))]
compile_error!("ptyprobe-session drives a POSIX pseudoterminal and only builds on unix targets");

pub mod driver;
pub mod dump;
pub mod output;
pub mod pty;
pub mod recording;
pub mod terminal;
pub mod trigger;

// Re-export commonly used types
pub use driver::{SessionDriver, SessionReport};
pub use dump::{write_dump, write_started_line, DumpMode, DUMP_END, DUMP_START};
pub use output::TranscriptBuffer;
pub use pty::PtyHandle;
pub use recording::SessionRecorder;
pub use terminal::{Drained, Terminal};
pub use trigger::PromptTrigger;
