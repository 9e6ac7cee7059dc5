//! Process discovery by image name.
//!
//! The watchdog never keeps a handle to the process it launched. Every cycle
//! it asks the OS again how many processes carry the target's name, which is
//! what lets it notice a target that was replaced behind its back.

use hsu_common::ProbeError;
use std::path::Path;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, System, UpdateKind};
use tracing::debug;

/// Counts running processes matching an image name.
pub trait ProcessProbe {
    /// Returns how many live processes match `name`.
    ///
    /// Zero is a normal answer, not an error. `Err` is reserved for the case
    /// where the OS query itself could not be performed.
    fn count_running(&mut self, name: &str) -> Result<usize, ProbeError>;
}

/// [`ProcessProbe`] backed by the OS process table (via `sysinfo`).
pub struct SystemProcessProbe {
    system: System,
}

impl SystemProcessProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProcessProbe {
    fn count_running(&mut self, name: &str) -> Result<usize, ProbeError> {
        // Launched targets are our children; collect the exited ones first so
        // they neither linger as zombies nor get mistaken for live targets.
        #[cfg(unix)]
        crate::reap::reap_exited_children();

        // The plain refresh leaves the command line and executable empty, and
        // matching needs both when the kernel truncated the name.
        self.system.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_exe(UpdateKind::OnlyIfNotSet),
        );

        // A table that does not even contain us is not a real answer.
        let own_pid = Pid::from_u32(std::process::id());
        if self.system.process(own_pid).is_none() {
            return Err(ProbeError::enumeration(
                name,
                "process table does not list the supervisor itself (access restricted?)",
            ));
        }

        let wanted = normalize_name(name);
        let count = self
            .system
            .processes()
            .values()
            .filter(|process| process.thread_kind().is_none())
            .filter(|process| !matches!(process.status(), ProcessStatus::Zombie))
            .filter(|process| process_matches(&wanted, process))
            .count();

        debug!(
            "Probe for '{}' scanned {} processes, {} matching",
            name,
            self.system.processes().len(),
            count
        );

        Ok(count)
    }
}

/// Normalizes an image name for comparison.
///
/// Windows image names are case-insensitive and usually carry `.exe`; both
/// `App` and `App.exe` refer to the same target there. Elsewhere names are
/// compared exactly.
pub fn normalize_name(name: &str) -> String {
    #[cfg(windows)]
    {
        let lower = name.trim().to_lowercase();
        match lower.strip_suffix(".exe") {
            Some(stem) => stem.to_string(),
            None => lower,
        }
    }

    #[cfg(not(windows))]
    {
        name.trim().to_string()
    }
}

/// Returns `true` when `candidate` names the same image as the already
/// normalized `wanted`.
pub fn names_match(wanted: &str, candidate: &str) -> bool {
    !wanted.is_empty() && normalize_name(candidate) == wanted
}

fn process_matches(wanted: &str, process: &Process) -> bool {
    let name = process.name();
    if names_match(wanted, name) {
        return true;
    }

    // Linux keeps only the first 15 bytes of the name. When what we see is a
    // prefix of the wanted name, fall back to the executable and the first
    // two command words (the second one is the script for `#!` programs).
    let shown = normalize_name(name);
    if shown.is_empty() || !wanted.starts_with(&shown) {
        return false;
    }

    let exe_matches = process
        .exe()
        .and_then(Path::file_name)
        .map(|file_name| names_match(wanted, &file_name.to_string_lossy()))
        .unwrap_or(false);

    exe_matches
        || process
            .cmd()
            .iter()
            .take(2)
            .filter_map(|word| Path::new(word).file_name())
            .any(|file_name| names_match(wanted, &file_name.to_string_lossy()))
}
