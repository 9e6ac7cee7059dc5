//! Detached process launching.
//!
//! The launcher hands the target over to the OS and forgets about it: the
//! `Child` handle is dropped as soon as the spawn succeeds.

use crate::validation::validate_executable;
use hsu_common::LaunchError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Starts the target executable.
pub trait ProcessLauncher {
    /// Start a new, independent process from `path`.
    ///
    /// Returns [`LaunchError::NotFound`] without attempting anything when the
    /// file does not exist.
    fn launch(&mut self, path: &Path) -> Result<(), LaunchError>;
}

/// [`ProcessLauncher`] that spawns real OS processes.
#[derive(Debug, Default, Clone)]
pub struct SystemProcessLauncher;

impl SystemProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for SystemProcessLauncher {
    fn launch(&mut self, path: &Path) -> Result<(), LaunchError> {
        validate_executable(path)?;

        let program = absolute_program_path(path);
        let child = detached_command(&program)
            .spawn()
            .map_err(|e| LaunchError::os_refused(path.display().to_string(), e.to_string()))?;

        debug!("Spawned {} with PID {}", program.display(), child.id());
        Ok(())
    }
}

/// Resolve a relative path against our own working directory, so that it
/// does not get reinterpreted once the child's working directory changes.
fn absolute_program_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Build a command whose process does not share stdio or the console process
/// group with the watchdog, and which runs from its own directory.
fn detached_command(program: &Path) -> Command {
    let mut command = Command::new(program);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    if let Some(dir) = program.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        command.current_dir(dir);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Ctrl+C on the watchdog's terminal must not take the target down too.
        command.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    command
}
