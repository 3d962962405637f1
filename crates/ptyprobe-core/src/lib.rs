//! # ptyprobe-core
//!
//! Core types for ptyprobe.
//!
//! This crate contains the fundamental types with **no internal dependencies**
//! on other ptyprobe crates. It provides:
//!
//! - Probe configuration (target program, trigger, timing, output)
//! - The session state machine
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - the session driver and the CLI
//! depend on this crate, but it depends on neither of them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod session;

// Re-export commonly used types
pub use config::{OutputSettings, ProbeConfig, TargetSettings, TimingSettings, TriggerSettings};
pub use error::{Error, Result};
pub use session::SessionState;
