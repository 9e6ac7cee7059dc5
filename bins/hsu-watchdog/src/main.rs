use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use hsu_common::{ConfigParseError, ControlError, SupervisionConfig, DEFAULT_CHECK_INTERVAL_MS};
use hsu_process::{SystemProcessLauncher, SystemProcessProbe};
use hsu_supervisor::{
    forward_shutdown_signals, send_stop, usage, ConsoleDialog, ConsolePresenter, ControlChannel,
    ControlEndpoint, ControlListener, Dialog, DialogKind, Invocation, LifecycleManager,
    LifecycleOptions, ShutdownOutcome, StopDelivery, WatchdogSettings, STOP_TOKEN,
};

const PROGRAM: &str = "hsu-watchdog";
const DIALOG_CAPTION: &str = "HSU Watchdog";

const EXIT_OK: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_INVALID_INVOCATION: u8 = 2;

/// HSU Watchdog - keeps one named process running
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Instance identity; selects which running watchdog STOP talks to
    #[arg(long, value_name = "NAME")]
    instance: Option<String>,

    /// Directory for log files (overrides settings)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// <name> <path> [intervalMs], or STOP
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    positional: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version land here too, with exit code 0.
            let _ = e.print();
            return ExitCode::from(e.exit_code().clamp(0, u8::MAX as i32) as u8);
        }
    };

    let (settings, settings_error) = match load_settings(&args) {
        Ok(settings) => (settings, None),
        Err(e) => (WatchdogSettings::default(), Some(e)),
    };

    // Initialize logging
    let _log_guard = initialize_logging(args.debug, &settings);

    let invocation = match ControlChannel::parse(&args.positional) {
        Ok(invocation) => invocation,
        Err(e) => {
            warn!("Invalid invocation: {}", e);
            ConsoleDialog::new().show(
                DIALOG_CAPTION,
                &format!("{}\n\n{}", e, usage(PROGRAM)),
                DialogKind::Information,
            );
            return ExitCode::from(EXIT_INVALID_INVOCATION);
        }
    };

    // STOP always exits 0, even when the settings are unusable.
    match (invocation, settings_error) {
        (Invocation::Stop, None) => {
            stop_running_instance(&ControlEndpoint::for_instance(&settings.instance)).await;
            ExitCode::from(EXIT_OK)
        }
        (Invocation::Stop, Some(e)) => {
            error!("{:#}", e);
            warn!("{} not sent: the target instance is unknown", STOP_TOKEN);
            ExitCode::from(EXIT_OK)
        }
        (Invocation::Run { .. }, Some(e)) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
        (
            Invocation::Run {
                config,
                interval_warning,
            },
            None,
        ) => {
            let endpoint = ControlEndpoint::for_instance(&settings.instance);
            match supervise(config, interval_warning, &settings, endpoint).await {
                Ok(()) => ExitCode::from(EXIT_OK),
                Err(e) => {
                    error!("{:#}", e);
                    ExitCode::from(EXIT_FAILURE)
                }
            }
        }
    }
}

/// Settings file (if any) with command-line overrides applied.
fn load_settings(args: &Args) -> Result<WatchdogSettings> {
    let mut settings = match &args.config {
        Some(path) => WatchdogSettings::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => WatchdogSettings::default(),
    };

    if let Some(instance) = &args.instance {
        settings.instance = instance.clone();
    }
    if let Some(dir) = &args.log_dir {
        settings.logging.directory = Some(dir.clone());
    }
    if args.debug {
        settings.logging.level = "debug".to_string();
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

/// Console plus daily-rolling file output. The returned guard flushes the
/// file writer on drop and must live until the process exits.
fn initialize_logging(debug: bool, settings: &WatchdogSettings) -> Option<WorkerGuard> {
    let level = if debug {
        "debug"
    } else {
        settings.logging.level.as_str()
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = fmt::layer().with_target(false).with_thread_ids(true);

    let mut file_warning = None;
    let mut guard = None;
    let file_layer = if settings.logging.file_enabled {
        let directory = settings
            .logging
            .directory
            .clone()
            .unwrap_or_else(default_log_directory);

        match open_log_file(&directory, &settings.logging.file_prefix) {
            Ok(appender) => {
                // Writes go through a background worker; a slow or failing
                // disk never stalls the supervision loop.
                let (writer, worker_guard) = tracing_appender::non_blocking(appender);
                guard = Some(worker_guard);
                Some(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false)
                        .with_thread_ids(true),
                )
            }
            Err(e) => {
                file_warning = Some(format!(
                    "File logging disabled, cannot use {}: {:#}",
                    directory.display(),
                    e
                ));
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(warning) = file_warning {
        warn!("{}", warning);
    }

    guard
}

fn open_log_file(directory: &Path, prefix: &str) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(directory)
        .map_err(|e| anyhow!("Failed to open log file: {}", e))
}

/// `logs/` next to the executable.
fn default_log_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Best effort: whatever happens, the STOP invocation itself succeeds.
async fn stop_running_instance(endpoint: &ControlEndpoint) {
    info!("Sending {} to {}", STOP_TOKEN, endpoint);

    match send_stop(endpoint).await {
        Ok(StopDelivery::Delivered) => info!("Stop request delivered"),
        Ok(StopDelivery::Unacknowledged) => {
            info!("Stop request sent; the instance was already shutting down")
        }
        Ok(StopDelivery::NoInstance) => {
            info!("No running watchdog found on {}, nothing to stop", endpoint)
        }
        Err(e) => warn!("Failed to deliver stop request: {}", e),
    }
}

async fn supervise(
    config: SupervisionConfig,
    interval_warning: Option<ConfigParseError>,
    settings: &WatchdogSettings,
    endpoint: ControlEndpoint,
) -> Result<()> {
    info!("Starting HSU Watchdog {}", env!("CARGO_PKG_VERSION"));
    info!("Monitored program: {}", config.target_name());
    info!("Program path: {}", config.target_path().display());
    info!("Check interval: {}ms", config.check_interval_ms());

    if let Some(warning) = interval_warning {
        warn!("{}; using default of {}ms", warning, DEFAULT_CHECK_INTERVAL_MS);
    }

    let listener = match ControlListener::bind(endpoint).await {
        Ok(listener) => Some(listener),
        Err(e @ ControlError::AlreadyListening { .. }) => {
            return Err(e).context(format!(
                "Another watchdog instance '{}' is already running",
                settings.instance
            ));
        }
        Err(e) => {
            warn!("{}; continuing without a control endpoint", e);
            None
        }
    };

    let manager = LifecycleManager::new(
        LifecycleOptions::from(settings),
        Box::new(ConsolePresenter::new()),
    );
    let stop = manager.stop_handle();

    let signal_task = tokio::spawn(forward_shutdown_signals(stop.clone()));
    let control_task = listener.map(|listener| {
        info!("Listening for {} on {}", STOP_TOKEN, listener.endpoint());
        tokio::spawn(listener.serve(stop.clone()))
    });

    let outcome = manager
        .run(config, SystemProcessProbe::new(), SystemProcessLauncher::new())
        .await?;

    signal_task.abort();
    if let Some(task) = control_task {
        task.abort();
        // Dropping the listener removes the socket file.
        let _ = task.await;
    }

    log_outcome(&outcome);
    info!("HSU Watchdog stopped");
    Ok(())
}

fn log_outcome(outcome: &ShutdownOutcome) {
    match &outcome.reason {
        Some(reason) => info!("Shutdown reason: {}", reason),
        None => warn!("Supervision ended without a stop request"),
    }

    match &outcome.report {
        Some(report) => info!(
            "Supervision summary: {} cycle(s), {} launch(es) ({} ok, {} failed), {} probe error(s)",
            report.cycles,
            report.launch_attempts,
            report.launches_succeeded,
            report.launches_failed,
            report.enumeration_failures
        ),
        None if !outcome.joined => warn!("Supervision thread was still busy at exit"),
        None => {}
    }
}
