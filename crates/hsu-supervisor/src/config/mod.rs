use hsu_common::SettingsError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

/// Ambient watchdog settings, loaded from an optional YAML file.
///
/// The supervision target itself never comes from here; it is always given on
/// the command line. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogSettings {
    /// Identity used to derive the control endpoint name.
    #[serde(default = "default_instance")]
    pub instance: String,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
    #[serde(default)]
    pub supervision: SupervisionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log directory; `None` means `logs/` next to the executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_true")]
    pub file_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownSettings {
    /// Upper bound on waiting for the supervision thread during shutdown.
    #[serde(default = "default_join_timeout", with = "duration_serde")]
    pub join_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisionSettings {
    /// How often a sleeping supervision loop checks for a stop request.
    #[serde(default = "default_stop_poll_interval", with = "duration_serde")]
    pub stop_poll_interval: Duration,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            logging: LoggingSettings::default(),
            shutdown: ShutdownSettings::default(),
            supervision: SupervisionSettings::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            file_prefix: default_file_prefix(),
            file_enabled: true,
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            join_timeout: default_join_timeout(),
        }
    }
}

impl Default for SupervisionSettings {
    fn default() -> Self {
        Self {
            stop_poll_interval: default_stop_poll_interval(),
        }
    }
}

impl WatchdogSettings {
    /// Load settings from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| SettingsError::read(path.as_ref().display().to_string(), e.to_string()))?;

        Self::load_from_string(&content)
    }

    /// Load settings from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self, SettingsError> {
        // An empty or comment-only document means "all defaults".
        let blank = content
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#'));

        let settings: WatchdogSettings = if blank {
            WatchdogSettings::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| SettingsError::parse(e.to_string()))?
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        validation::validate_settings(self)
    }
}

// Default value functions
fn default_instance() -> String {
    "default".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_prefix() -> String {
    "hsu-watchdog".to_string()
}

fn default_true() -> bool {
    true
}

fn default_join_timeout() -> Duration {
    Duration::from_millis(2000)
}

fn default_stop_poll_interval() -> Duration {
    Duration::from_millis(100)
}

// Custom serialization for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("Invalid duration: {}", s);

        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            let millis: u64 = num.trim().parse().map_err(|_| invalid())?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num) = s.strip_suffix('s') {
            let secs: u64 = num.trim().parse().map_err(|_| invalid())?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num) = s.strip_suffix('m') {
            let mins: u64 = num.trim().parse().map_err(|_| invalid())?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(invalid)
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}
