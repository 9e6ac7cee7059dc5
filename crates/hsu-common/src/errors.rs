//! Error types for the HSU watchdog.
//!
//! Each failure class of the supervisor has its own enum so the state machine
//! can match on it exhaustively instead of unwinding:
//!
//! - [`ProbeError`]: the OS process query failed. Recovered by a fixed backoff.
//! - [`LaunchError`]: the target could not be started. Logged, loop continues.
//! - [`ConfigParseError`]: malformed interval. Replaced by the default.
//! - [`InvocationError`]: unusable command line. Surfaced to the user.
//! - [`ControlError`]: the inter-process control endpoint failed.
//! - [`SettingsError`]: the optional settings file could not be used.
//!
//! ```rust
//! use hsu_common::{Error, LaunchError, Result};
//!
//! fn start() -> Result<()> {
//!     Err(LaunchError::not_found("/opt/app/App").into())
//! }
//!
//! assert!(matches!(start(), Err(Error::Launch(LaunchError::NotFound { .. }))));
//! ```

use thiserror::Error;

/// Result type alias for watchdog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Umbrella error for callers that do not care which stage failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Internal error (shouldn't happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

// ==============================================================================
// Supervision cycle errors
// ==============================================================================

/// The OS process table could not be queried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Process enumeration failed while looking for '{name}': {reason}")]
    Enumeration { name: String, reason: String },
}

impl ProbeError {
    pub fn enumeration(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Enumeration {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// The target executable could not be started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// Nothing to start at the given path. Expected during first deployment.
    #[error("Target executable not found: {path}")]
    NotFound { path: String },

    /// The OS refused to start the executable (permissions, bad format, ...).
    #[error("OS refused to start {path}: {reason}")]
    OsRefused { path: String, reason: String },
}

impl LaunchError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn os_refused(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OsRefused {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// ==============================================================================
// Invocation and configuration errors
// ==============================================================================

/// A check interval argument that could not be used as given.
///
/// Never fatal: the caller substitutes the default and logs this as a warning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid check interval '{value}': {reason}")]
pub struct ConfigParseError {
    pub value: String,
    pub reason: String,
}

impl ConfigParseError {
    pub fn new(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// The command line does not describe a usable invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Missing arguments: expected <name> <path> [intervalMs], got {count} argument(s)")]
    MissingArguments { count: usize },

    #[error("Unrecognized command: '{command}'")]
    UnrecognizedCommand { command: String },

    #[error("Argument <{argument}> cannot be empty")]
    EmptyArgument { argument: &'static str },
}

impl InvocationError {
    pub fn missing_arguments(count: usize) -> Self {
        Self::MissingArguments { count }
    }

    pub fn unrecognized_command(command: impl Into<String>) -> Self {
        Self::UnrecognizedCommand {
            command: command.into(),
        }
    }

    pub fn empty_argument(argument: &'static str) -> Self {
        Self::EmptyArgument { argument }
    }
}

/// The settings file could not be read, parsed or validated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse settings: {reason}")]
    Parse { reason: String },

    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl SettingsError {
    pub fn read(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ==============================================================================
// Inter-process control errors
// ==============================================================================

/// Failures of the named control endpoint used to deliver STOP.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Another live instance already listens on this endpoint.
    #[error("Control endpoint {endpoint} is already held by a running instance")]
    AlreadyListening { endpoint: String },

    #[error("Control endpoint {endpoint} I/O error: {reason}")]
    Io { endpoint: String, reason: String },

    #[error("Control endpoint {endpoint} protocol error: {reason}")]
    Protocol { endpoint: String, reason: String },
}

impl ControlError {
    pub fn already_listening(endpoint: impl Into<String>) -> Self {
        Self::AlreadyListening {
            endpoint: endpoint.into(),
        }
    }

    pub fn io(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Io {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn protocol(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Protocol {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}
