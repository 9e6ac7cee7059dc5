//! Core domain types shared by the watchdog crates.
//!
//! Everything here is immutable once built: the supervision loop receives a
//! [`SupervisionConfig`] by value at construction and never writes to it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Check interval used when none is given or the given one is unusable.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 5000;

/// Image name of the process being supervised.
///
/// Identity is tracked by name, never by PID: a target replaced externally
/// (for example by an updater) is still recognised on the next probe.
///
/// # Example
/// ```
/// use hsu_common::TargetName;
///
/// let name = TargetName::from("kiosk");
/// assert_eq!(name.as_str(), "kiosk");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetName(String);

impl TargetName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TargetName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a single invocation of the binary was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Start supervising a target.
    Run,
    /// Ask an already running instance to shut down.
    Stop,
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlSignal::Run => write!(f, "run"),
            ControlSignal::Stop => write!(f, "stop"),
        }
    }
}

/// Immutable supervision parameters, built once from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionConfig {
    target_name: TargetName,
    target_path: PathBuf,
    check_interval_ms: u64,
}

impl SupervisionConfig {
    /// Builds a config. A zero interval is replaced by
    /// [`DEFAULT_CHECK_INTERVAL_MS`], so the stored interval is always positive.
    pub fn new(
        target_name: impl Into<TargetName>,
        target_path: impl Into<PathBuf>,
        check_interval_ms: u64,
    ) -> Self {
        let check_interval_ms = if check_interval_ms == 0 {
            DEFAULT_CHECK_INTERVAL_MS
        } else {
            check_interval_ms
        };

        Self {
            target_name: target_name.into(),
            target_path: target_path.into(),
            check_interval_ms,
        }
    }

    /// Same as [`SupervisionConfig::new`] with the default interval.
    pub fn with_default_interval(
        target_name: impl Into<TargetName>,
        target_path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(target_name, target_path, DEFAULT_CHECK_INTERVAL_MS)
    }

    pub fn target_name(&self) -> &TargetName {
        &self.target_name
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn check_interval_ms(&self) -> u64 {
        self.check_interval_ms
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl fmt::Display for SupervisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "target={} path={} interval={}ms",
            self.target_name,
            self.target_path.display(),
            self.check_interval_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_is_coerced_to_default() {
        let config = SupervisionConfig::new("App", "/opt/app/App", 0);
        assert_eq!(config.check_interval_ms(), DEFAULT_CHECK_INTERVAL_MS);
    }

    #[test]
    fn test_positive_interval_is_kept() {
        let config = SupervisionConfig::new("App", "/opt/app/App", 250);
        assert_eq!(config.check_interval(), Duration::from_millis(250));
        assert_eq!(config.target_name().as_str(), "App");
        assert_eq!(config.target_path(), Path::new("/opt/app/App"));
    }

    #[test]
    fn test_display_lists_all_parameters() {
        let config = SupervisionConfig::with_default_interval("App", "/opt/app/App");
        let text = config.to_string();
        assert!(text.contains("target=App"));
        assert!(text.contains("interval=5000ms"));
    }
}
