//! # HSU Supervisor
//!
//! Watches one named process and restarts it when it disappears.
//!
//! This crate provides:
//! - [`SupervisorLoop`]: the probe → launch → sleep state machine
//! - [`LifecycleManager`]: startup/shutdown ordering around the loop's thread
//! - [`ControlChannel`]: command-line interpretation (run vs. `STOP`)
//! - [`ControlListener`] / [`send_stop`]: the named endpoint that carries `STOP`
//!   from one invocation to the running instance
//! - Settings loading and the headless presentation collaborators

pub mod config;
pub mod control;
pub mod lifecycle;
pub mod presentation;
pub mod supervisor;

// Re-export main types
pub use config::WatchdogSettings;
pub use control::{
    parse_check_interval, send_stop, usage, ControlChannel, ControlEndpoint, ControlListener,
    Invocation, StopDelivery, STOP_TOKEN,
};
pub use lifecycle::{
    forward_shutdown_signals, stop_channel, LifecycleManager, LifecycleOptions, ShutdownOutcome,
    StopHandle, StopReason,
};
pub use presentation::{
    ConsoleDialog, ConsolePresenter, Dialog, DialogKind, MonitoringInfo, Presenter,
};
pub use supervisor::{SupervisorLoop, SupervisorReport, SupervisorState, ENUMERATION_BACKOFF};
