//! Narrow presentation interfaces.
//!
//! The supervision core never talks to a UI toolkit. A front end implements
//! [`Presenter`] (status surface plus an exit action) and [`Dialog`] (blocking
//! messages); the headless implementations here log and write to stderr.

use crate::lifecycle::StopHandle;
use hsu_common::SupervisionConfig;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// What a presenter shows while supervision is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringInfo {
    pub target_name: String,
    pub target_path: PathBuf,
    pub check_interval_ms: u64,
}

impl MonitoringInfo {
    pub fn status_text(&self) -> String {
        format!(
            "Watchdog running\nTarget: {}\nCheck interval: {}ms",
            self.target_name, self.check_interval_ms
        )
    }
}

impl From<&SupervisionConfig> for MonitoringInfo {
    fn from(config: &SupervisionConfig) -> Self {
        Self {
            target_name: config.target_name().to_string(),
            target_path: config.target_path().to_path_buf(),
            check_interval_ms: config.check_interval_ms(),
        }
    }
}

/// Status surface of a running watchdog (tray icon, console, ...).
pub trait Presenter: Send {
    /// Hand over the handle the presenter uses to report "user requested exit".
    fn attach_exit(&mut self, exit: StopHandle);

    fn show_monitoring(&mut self, info: &MonitoringInfo);

    /// Current status, on demand.
    fn status_text(&self) -> String;

    /// Free everything the presenter holds. Called once, after the
    /// supervision thread has been joined or abandoned.
    fn release(&mut self);
}

/// Headless [`Presenter`] that reports through the log.
///
/// A console has no exit action of its own; Ctrl+C arrives as a signal.
#[derive(Debug, Default)]
pub struct ConsolePresenter {
    info: Option<MonitoringInfo>,
    released: bool,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Presenter for ConsolePresenter {
    fn attach_exit(&mut self, _exit: StopHandle) {
        debug!("Console presenter has no exit action; relying on signals");
    }

    fn show_monitoring(&mut self, info: &MonitoringInfo) {
        info!(
            "Monitoring {} (path: {}, interval: {}ms)",
            info.target_name,
            info.target_path.display(),
            info.check_interval_ms
        );
        self.info = Some(info.clone());
    }

    fn status_text(&self) -> String {
        match &self.info {
            Some(info) => info.status_text(),
            None => "Watchdog starting".to_string(),
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        debug!("Console presenter released");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Information,
    Warning,
    Error,
}

impl fmt::Display for DialogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogKind::Information => write!(f, "information"),
            DialogKind::Warning => write!(f, "warning"),
            DialogKind::Error => write!(f, "error"),
        }
    }
}

/// Blocking user-facing message.
pub trait Dialog {
    fn show(&self, caption: &str, text: &str, kind: DialogKind);
}

/// [`Dialog`] that prints to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDialog;

impl ConsoleDialog {
    pub fn new() -> Self {
        Self
    }

    pub fn render(caption: &str, text: &str, kind: DialogKind) -> String {
        match kind {
            DialogKind::Information => format!("{}\n\n{}\n", caption, text),
            DialogKind::Warning | DialogKind::Error => {
                format!("{} ({})\n\n{}\n", caption, kind, text)
            }
        }
    }
}

impl Dialog for ConsoleDialog {
    fn show(&self, caption: &str, text: &str, kind: DialogKind) {
        // Nowhere left to report a failing stderr.
        let _ = std::io::stderr()
            .lock()
            .write_all(Self::render(caption, text, kind).as_bytes());
    }
}
