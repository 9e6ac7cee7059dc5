use super::*;
use std::time::Duration;

/// Longest allowed stop poll slice; above this shutdown latency gets noticeable.
const MAX_STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

const MAX_INSTANCE_LEN: usize = 64;

/// Validate the complete settings
pub fn validate_settings(settings: &WatchdogSettings) -> Result<(), SettingsError> {
    validate_instance(&settings.instance)?;
    validate_logging(&settings.logging)?;

    if settings.shutdown.join_timeout.is_zero() {
        return Err(SettingsError::invalid(
            "shutdown.join_timeout",
            "must be greater than 0",
        ));
    }

    let poll = settings.supervision.stop_poll_interval;
    if poll.is_zero() {
        return Err(SettingsError::invalid(
            "supervision.stop_poll_interval",
            "must be greater than 0",
        ));
    }
    if poll > MAX_STOP_POLL_INTERVAL {
        return Err(SettingsError::invalid(
            "supervision.stop_poll_interval",
            format!("must not exceed {:?}, got {:?}", MAX_STOP_POLL_INTERVAL, poll),
        ));
    }

    Ok(())
}

/// Validate an instance name; it ends up in a socket or pipe name.
pub fn validate_instance(instance: &str) -> Result<(), SettingsError> {
    if instance.is_empty() {
        return Err(SettingsError::invalid("instance", "cannot be empty"));
    }

    if instance.len() > MAX_INSTANCE_LEN {
        return Err(SettingsError::invalid(
            "instance",
            format!("too long (max {} characters): {}", MAX_INSTANCE_LEN, instance),
        ));
    }

    if !instance
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SettingsError::invalid(
            "instance",
            format!(
                "can only contain alphanumeric characters, hyphens, and underscores: {}",
                instance
            ),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingSettings) -> Result<(), SettingsError> {
    match logging.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => {
            return Err(SettingsError::invalid(
                "logging.level",
                format!(
                    "{}, must be one of: trace, debug, info, warn, error",
                    logging.level
                ),
            ))
        }
    }

    if logging.file_enabled && logging.file_prefix.trim().is_empty() {
        return Err(SettingsError::invalid(
            "logging.file_prefix",
            "cannot be empty while file logging is enabled",
        ));
    }

    Ok(())
}
