//! # HSU Process
//!
//! Low-level process operations for the watchdog.
//!
//! This crate provides cross-platform primitives for:
//! - Counting running processes by image name
//! - Launching a detached target executable
//! - Validating a target path before launch
//! - Reaping exited children (Unix)
//!
//! The supervision loop talks to the OS only through the [`ProcessProbe`]
//! and [`ProcessLauncher`] traits, so tests can substitute scripted fakes.

pub mod launch;
pub mod probe;
pub mod validation;

#[cfg(unix)]
pub mod reap;

// Re-export main types
pub use launch::*;
pub use probe::*;
pub use validation::*;

#[cfg(unix)]
pub use reap::*;
