//! Startup and shutdown ordering around the supervision thread.
//!
//! The controlling context (a tokio task) waits for the first stop request,
//! whichever source it comes from, then clears the running flag, waits a
//! bounded time for the supervision thread and releases the presenter.

use crate::config::WatchdogSettings;
use crate::presentation::{MonitoringInfo, Presenter};
use crate::supervisor::{
    SupervisorLoop, SupervisorReport, SupervisorState, DEFAULT_STOP_POLL_INTERVAL,
};
use hsu_common::{Error, Result, SupervisionConfig};
use hsu_process::{ProcessLauncher, ProcessProbe};
use std::fmt;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Name of the OS thread running the supervision loop.
pub const SUPERVISOR_THREAD_NAME: &str = "hsu-watchdog-supervisor";

/// Default bound on the shutdown join.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Where a stop request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// OS termination signal or console event.
    Signal(&'static str),
    /// `STOP` received on the control endpoint.
    ControlRequest,
    /// Exit chosen in the presentation layer.
    UserRequest,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Signal(name) => write!(f, "signal {}", name),
            StopReason::ControlRequest => write!(f, "control request"),
            StopReason::UserRequest => write!(f, "user request"),
        }
    }
}

/// Sender side of the merged stop channel. Cheap to clone; every stop source
/// gets its own copy.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::UnboundedSender<StopReason>,
}

impl StopHandle {
    /// Post a stop request. Returns `false` once nobody is listening anymore.
    pub fn request(&self, reason: StopReason) -> bool {
        self.tx.send(reason).is_ok()
    }
}

/// Create a stop channel.
pub fn stop_channel() -> (StopHandle, mpsc::UnboundedReceiver<StopReason>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StopHandle { tx }, rx)
}

/// Timing knobs of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleOptions {
    pub join_timeout: Duration,
    pub stop_poll_interval: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            stop_poll_interval: DEFAULT_STOP_POLL_INTERVAL,
        }
    }
}

impl From<&WatchdogSettings> for LifecycleOptions {
    fn from(settings: &WatchdogSettings) -> Self {
        Self {
            join_timeout: settings.shutdown.join_timeout,
            stop_poll_interval: settings.supervision.stop_poll_interval,
        }
    }
}

/// How a lifecycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownOutcome {
    /// `None` when the supervision thread ended on its own (it panicked).
    pub reason: Option<StopReason>,
    /// Counters from the loop, if it finished in time.
    pub report: Option<SupervisorReport>,
    /// Whether the supervision thread finished within the join timeout.
    pub joined: bool,
}

enum Wake {
    Stop(StopReason),
    LoopEnded(Option<SupervisorReport>),
}

pub struct LifecycleManager {
    options: LifecycleOptions,
    presenter: Box<dyn Presenter>,
    state: SupervisorState,
    stop_tx: StopHandle,
    stop_rx: mpsc::UnboundedReceiver<StopReason>,
}

impl LifecycleManager {
    pub fn new(options: LifecycleOptions, presenter: Box<dyn Presenter>) -> Self {
        let (stop_tx, stop_rx) = stop_channel();
        Self {
            options,
            presenter,
            state: SupervisorState::new(),
            stop_tx,
            stop_rx,
        }
    }

    /// Handle for stop sources (signals, control endpoint, UI).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop_tx.clone()
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    /// Run supervision of `config` until the first stop request.
    ///
    /// Only fails if the supervision thread cannot be started at all.
    pub async fn run<P, L>(
        mut self,
        config: SupervisionConfig,
        probe: P,
        launcher: L,
    ) -> Result<ShutdownOutcome>
    where
        P: ProcessProbe + Send + 'static,
        L: ProcessLauncher + Send + 'static,
    {
        let target = config.target_name().clone();

        let exit = self.stop_handle();
        self.presenter.attach_exit(exit);
        self.presenter.show_monitoring(&MonitoringInfo::from(&config));

        let supervisor = SupervisorLoop::new(config, self.state.clone(), probe, launcher)
            .with_stop_poll_interval(self.options.stop_poll_interval);

        let (done_tx, mut done_rx) = oneshot::channel();
        thread::Builder::new()
            .name(SUPERVISOR_THREAD_NAME.to_string())
            .spawn(move || {
                let report = supervisor.run();
                // The receiver is gone if shutdown already gave up waiting.
                let _ = done_tx.send(report);
            })
            .map_err(|e| {
                self.presenter.release();
                Error::Internal(format!("Failed to start supervision thread: {}", e))
            })?;

        debug!("Supervision thread started for {}", target);

        let wake = tokio::select! {
            Some(reason) = self.stop_rx.recv() => Wake::Stop(reason),
            ended = &mut done_rx => Wake::LoopEnded(ended.ok()),
        };

        let outcome = match wake {
            Wake::Stop(reason) => {
                info!("Stop requested ({}), shutting down supervision of {}", reason, target);
                self.state.request_stop();

                let joined_report = tokio::time::timeout(self.options.join_timeout, done_rx).await;
                let (report, joined) = match joined_report {
                    Ok(Ok(report)) => (Some(report), true),
                    Ok(Err(_)) => {
                        error!("Supervision thread ended without a report");
                        (None, true)
                    }
                    Err(_) => {
                        warn!(
                            "Supervision thread did not finish within {:?}, leaving it behind",
                            self.options.join_timeout
                        );
                        (None, false)
                    }
                };

                ShutdownOutcome {
                    reason: Some(reason),
                    report,
                    joined,
                }
            }
            Wake::LoopEnded(report) => {
                error!("Supervision thread for {} terminated unexpectedly", target);
                self.state.request_stop();
                ShutdownOutcome {
                    reason: None,
                    report,
                    joined: true,
                }
            }
        };

        while let Ok(extra) = self.stop_rx.try_recv() {
            debug!("Ignoring additional stop request ({})", extra);
        }

        self.presenter.release();
        Ok(outcome)
    }
}

/// Forward OS termination signals to `stop` until the first one arrives.
///
/// Unix: SIGINT, SIGTERM and SIGHUP. Windows: Ctrl-C, Ctrl-Break, console
/// close, logoff and shutdown.
pub async fn forward_shutdown_signals(stop: StopHandle) {
    match wait_for_shutdown_signal().await {
        Ok(name) => {
            info!("Received {} signal", name);
            stop.request(StopReason::Signal(name));
        }
        Err(e) => {
            // Still stoppable through the control endpoint and the UI.
            error!("Failed to install signal handlers: {}", e);
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
        _ = sighup.recv() => "SIGHUP",
    };
    Ok(name)
}

#[cfg(windows)]
async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::windows;

    let mut ctrl_c = windows::ctrl_c()?;
    let mut ctrl_break = windows::ctrl_break()?;
    let mut ctrl_close = windows::ctrl_close()?;
    let mut ctrl_logoff = windows::ctrl_logoff()?;
    let mut ctrl_shutdown = windows::ctrl_shutdown()?;

    let name = tokio::select! {
        _ = ctrl_c.recv() => "CTRL_C",
        _ = ctrl_break.recv() => "CTRL_BREAK",
        _ = ctrl_close.recv() => "CTRL_CLOSE",
        _ = ctrl_logoff.recv() => "CTRL_LOGOFF",
        _ = ctrl_shutdown.recv() => "CTRL_SHUTDOWN",
    };
    Ok(name)
}
