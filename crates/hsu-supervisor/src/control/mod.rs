//! Command-line interpretation: run as supervisor, or tell one to stop.
//!
//! ```
//! use hsu_supervisor::control::{ControlChannel, Invocation};
//!
//! let args = vec!["kiosk".to_string(), "/opt/kiosk/kiosk".to_string(), "abc".to_string()];
//! match ControlChannel::parse(&args).unwrap() {
//!     Invocation::Run { config, interval_warning } => {
//!         assert_eq!(config.check_interval_ms(), 5000);
//!         assert!(interval_warning.is_some());
//!     }
//!     Invocation::Stop => unreachable!(),
//! }
//! ```

use hsu_common::{
    ConfigParseError, ControlSignal, InvocationError, SupervisionConfig, DEFAULT_CHECK_INTERVAL_MS,
};

pub mod endpoint;

pub use endpoint::{send_stop, ControlEndpoint, ControlListener, StopDelivery};

/// The literal argument that turns an invocation into a stop request.
pub const STOP_TOKEN: &str = "STOP";

/// A parsed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Deliver a stop request to a running instance and exit.
    Stop,
    /// Supervise a target. `interval_warning` is set when the interval
    /// argument was present but unusable and the default was substituted.
    Run {
        config: SupervisionConfig,
        interval_warning: Option<ConfigParseError>,
    },
}

impl Invocation {
    pub fn signal(&self) -> ControlSignal {
        match self {
            Invocation::Stop => ControlSignal::Stop,
            Invocation::Run { .. } => ControlSignal::Run,
        }
    }
}

pub struct ControlChannel;

impl ControlChannel {
    /// Interpret the positional arguments (program name excluded).
    pub fn parse(args: &[String]) -> Result<Invocation, InvocationError> {
        match args {
            [only] if only == STOP_TOKEN => Ok(Invocation::Stop),
            [only] => Err(InvocationError::unrecognized_command(only.as_str())),
            [] => Err(InvocationError::missing_arguments(0)),
            [name, path, rest @ ..] => {
                // A blank name would match nothing and relaunch forever. A
                // blank path is left to the launcher, which reports it as
                // not found on every cycle.
                if name.trim().is_empty() {
                    return Err(InvocationError::empty_argument("name"));
                }

                let (interval, interval_warning) =
                    parse_check_interval(rest.first().map(String::as_str));

                Ok(Invocation::Run {
                    config: SupervisionConfig::new(name.as_str(), path.as_str(), interval),
                    interval_warning,
                })
            }
        }
    }
}

/// Parse the optional interval argument.
///
/// Missing → default with no warning. Non-numeric, zero, negative or too
/// large → default plus a [`ConfigParseError`] for the caller to log.
pub fn parse_check_interval(raw: Option<&str>) -> (u64, Option<ConfigParseError>) {
    let Some(raw) = raw else {
        return (DEFAULT_CHECK_INTERVAL_MS, None);
    };

    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(ms) if ms > 0 => (ms as u64, None),
        Ok(_) => (
            DEFAULT_CHECK_INTERVAL_MS,
            Some(ConfigParseError::new(raw, "must be a positive number of milliseconds")),
        ),
        Err(e) => (
            DEFAULT_CHECK_INTERVAL_MS,
            Some(ConfigParseError::new(raw, e.to_string())),
        ),
    }
}

/// Usage text for an invalid invocation.
pub fn usage(program: &str) -> String {
    format!(
        "Usage:\n  {program} [OPTIONS] <name> <path> [intervalMs]\n  {program} [OPTIONS] {stop}\n\n\
         <name>        process image name to watch for\n\
         <path>        executable to start when no such process is running\n\
         [intervalMs]  check interval in milliseconds (default {default})\n\
         {stop}          ask the running instance to shut down",
        program = program,
        stop = STOP_TOKEN,
        default = DEFAULT_CHECK_INTERVAL_MS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn run_config(values: &[&str]) -> (SupervisionConfig, Option<ConfigParseError>) {
        match ControlChannel::parse(&args(values)).unwrap() {
            Invocation::Run {
                config,
                interval_warning,
            } => (config, interval_warning),
            Invocation::Stop => panic!("expected a run invocation"),
        }
    }

    #[test]
    fn test_stop_token() {
        let invocation = ControlChannel::parse(&args(&["STOP"])).unwrap();
        assert_eq!(invocation, Invocation::Stop);
        assert_eq!(invocation.signal(), ControlSignal::Stop);
    }

    #[test]
    fn test_stop_token_is_case_sensitive() {
        let err = ControlChannel::parse(&args(&["stop"])).unwrap_err();
        assert_eq!(err, InvocationError::unrecognized_command("stop"));
    }

    #[test]
    fn test_too_few_arguments() {
        assert_eq!(
            ControlChannel::parse(&[]).unwrap_err(),
            InvocationError::missing_arguments(0)
        );
        assert!(matches!(
            ControlChannel::parse(&args(&["App"])).unwrap_err(),
            InvocationError::UnrecognizedCommand { .. }
        ));
    }

    #[test]
    fn test_two_arguments_use_default_interval() {
        let (config, warning) = run_config(&["App", "/opt/app/App"]);
        assert_eq!(config.target_name().as_str(), "App");
        assert_eq!(config.target_path(), Path::new("/opt/app/App"));
        assert_eq!(config.check_interval_ms(), DEFAULT_CHECK_INTERVAL_MS);
        assert!(warning.is_none());
    }

    #[test]
    fn test_explicit_interval() {
        let (config, warning) = run_config(&["App", "/opt/app/App", "250"]);
        assert_eq!(config.check_interval_ms(), 250);
        assert!(warning.is_none());
    }

    #[test]
    fn test_malformed_interval_falls_back_with_warning() {
        for bad in ["abc", "0", "-100", "1.5", "", "99999999999999999999999"] {
            let (config, warning) = run_config(&["App", "/opt/app/App", bad]);
            assert_eq!(config.check_interval_ms(), 5000, "input {:?}", bad);
            let warning = warning.unwrap_or_else(|| panic!("no warning for {:?}", bad));
            assert_eq!(warning.value, bad);
        }
    }

    #[test]
    fn test_stop_token_with_more_arguments_is_a_target_name() {
        let (config, _) = run_config(&["STOP", "/opt/app/STOP"]);
        assert_eq!(config.target_name().as_str(), "STOP");
    }

    #[test]
    fn test_extra_arguments_are_ignored() {
        let (config, warning) = run_config(&["App", "/opt/app/App", "100", "--verbose", "x"]);
        assert_eq!(config.check_interval_ms(), 100);
        assert!(warning.is_none());
    }

    #[test]
    fn test_empty_name_is_invalid() {
        assert_eq!(
            ControlChannel::parse(&args(&["", "/opt/app/App"])).unwrap_err(),
            InvocationError::empty_argument("name")
        );
        assert_eq!(
            ControlChannel::parse(&args(&["  ", "/opt/app/App"])).unwrap_err(),
            InvocationError::empty_argument("name")
        );
    }

    #[test]
    fn test_empty_path_still_supervises() {
        let (config, warning) = run_config(&["App", ""]);
        assert_eq!(config.target_name().as_str(), "App");
        assert!(config.target_path().as_os_str().is_empty());
        assert!(warning.is_none());
    }

    #[test]
    fn test_parse_check_interval_missing() {
        assert_eq!(parse_check_interval(None), (DEFAULT_CHECK_INTERVAL_MS, None));
        assert_eq!(parse_check_interval(Some(" 750 ")).0, 750);
    }

    #[test]
    fn test_usage_mentions_both_forms() {
        let text = usage("hsu-watchdog");
        assert!(text.starts_with("Usage:"));
        assert!(text.contains("hsu-watchdog [OPTIONS] <name> <path> [intervalMs]"));
        assert!(text.contains("hsu-watchdog [OPTIONS] STOP"));
    }
}
