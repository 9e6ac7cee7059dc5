//! Reaping of exited child processes (Unix).
//!
//! Launched targets are children of the watchdog. Nobody waits on them, so
//! once they exit they would stay in the process table as zombies until the
//! watchdog itself exits.

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::debug;

/// Collect every child that has already exited, without blocking.
///
/// Returns the number of children reaped.
pub fn reap_exited_children() -> usize {
    let mut reaped = 0;

    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                debug!("Reaped exited child: {:?}", status);
                reaped += 1;
            }
            Err(Errno::EINTR) => continue,
            // No children at all.
            Err(Errno::ECHILD) => break,
            Err(e) => {
                debug!("waitpid failed while reaping children: {}", e);
                break;
            }
        }
    }

    reaped
}
