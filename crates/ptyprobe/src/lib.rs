//! # ptyprobe
//!
//! Launch an interactive terminal program on a pseudoterminal, wait for its
//! prompt, send one command, and dump every byte it printed.
//!
//! ## Architecture
//!
//! This is Layer 2 - the binary that ties together:
//! - ptyprobe-core: configuration, errors, session state
//! - ptyprobe-session: PTY, trigger, driver loop, dump

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod run;

pub use cli::Cli;
pub use run::run_probe;
