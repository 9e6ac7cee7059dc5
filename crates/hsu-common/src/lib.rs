//! # HSU Common
//!
//! Error taxonomy and domain types shared by the watchdog crates.
//!
//! Nothing in here touches the OS; the process primitives live in
//! `hsu-process` and the supervision logic in `hsu-supervisor`.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{
    ConfigParseError, ControlError, Error, InvocationError, LaunchError, ProbeError, Result,
    SettingsError,
};
pub use types::{ControlSignal, SupervisionConfig, TargetName, DEFAULT_CHECK_INTERVAL_MS};
