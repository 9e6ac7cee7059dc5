//! Watchdog wrapper for E2E testing

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Result of a short-lived invocation (STOP, invalid arguments).
pub struct Completed {
    pub status: ExitStatus,
    pub output: String,
}

/// Wrapper for driving the watchdog binary during tests.
///
/// Every wrapper gets its own runtime directory (control sockets) and log
/// directory below `test_dir`, so tests never see each other's instances.
pub struct WatchdogWrapper {
    process: Option<Child>,
    pub test_dir: PathBuf,
    instance: String,
    log_file_path: PathBuf,
    log_output: Vec<String>,
}

impl WatchdogWrapper {
    pub fn new(test_dir: &Path, instance: &str) -> Self {
        Self {
            process: None,
            test_dir: test_dir.to_path_buf(),
            instance: instance.to_string(),
            log_file_path: test_dir.join("watchdog.out"),
            log_output: Vec::new(),
        }
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.test_dir.join("run")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir()
            .join("hsu-watchdog")
            .join(format!("hsu-watchdog-{}.sock", self.instance))
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_hsu-watchdog"));
        cmd.arg("--instance")
            .arg(&self.instance)
            .arg("--log-dir")
            .arg(self.test_dir.join("logs"))
            .args(args)
            .current_dir(&self.test_dir)
            .env("XDG_RUNTIME_DIR", self.runtime_dir())
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .stdin(Stdio::null());
        cmd
    }

    /// Start a long-running watchdog with the given positional arguments.
    pub fn start(&mut self, args: &[&str]) -> Result<(), String> {
        if self.process.is_some() {
            return Err("Watchdog is already running".to_string());
        }

        fs::create_dir_all(self.runtime_dir())
            .map_err(|e| format!("Failed to create runtime dir: {}", e))?;

        let log_file = fs::File::create(&self.log_file_path)
            .map_err(|e| format!("Failed to create log file: {}", e))?;
        let log_file_clone = log_file
            .try_clone()
            .map_err(|e| format!("Failed to clone log file: {}", e))?;

        let child = self
            .command(args)
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_file_clone))
            .spawn()
            .map_err(|e| format!("Failed to spawn watchdog: {}", e))?;

        println!("Watchdog started with PID {}", child.id());
        self.process = Some(child);
        Ok(())
    }

    /// Run a second, short-lived invocation against the same instance and
    /// wait for it to finish.
    pub fn invoke(
        &self,
        name: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Completed, String> {
        fs::create_dir_all(self.runtime_dir())
            .map_err(|e| format!("Failed to create runtime dir: {}", e))?;

        let output_path = self.test_dir.join(format!("{}.out", name));
        let output_file = fs::File::create(&output_path)
            .map_err(|e| format!("Failed to create output file: {}", e))?;
        let output_clone = output_file
            .try_clone()
            .map_err(|e| format!("Failed to clone output file: {}", e))?;

        let mut child = self
            .command(args)
            .stdout(Stdio::from(output_file))
            .stderr(Stdio::from(output_clone))
            .spawn()
            .map_err(|e| format!("Failed to spawn invocation: {}", e))?;

        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                child.kill().ok();
                child.wait().ok();
                return Err(format!("Invocation '{}' did not finish within {:?}", name, timeout));
            }
            Err(e) => return Err(format!("Error waiting for invocation: {}", e)),
        };

        let output = fs::read_to_string(&output_path).unwrap_or_default();
        println!("[{}] exit {} output:\n{}", name, status, output);
        Ok(Completed { status, output })
    }

    /// Wait until a log line containing `pattern` shows up.
    pub fn wait_for_log(&mut self, pattern: &str, timeout: Duration) -> Result<(), String> {
        self.wait_for_log_count(pattern, 1, timeout)
    }

    /// Wait until at least `count` log lines contain `pattern`.
    pub fn wait_for_log_count(
        &mut self,
        pattern: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<(), String> {
        let start = Instant::now();

        while start.elapsed() < timeout {
            self.collect_logs();
            if self.count_log_matching(pattern) >= count {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(50));
        }

        Err(format!(
            "Expected {} log line(s) matching '{}' within {:?}, found {}",
            count,
            pattern,
            timeout,
            self.count_log_matching(pattern)
        ))
    }

    pub fn wait_until_ready(&mut self) -> Result<(), String> {
        self.wait_for_log("Listening for STOP", Duration::from_secs(10))
    }

    /// Wait for the watchdog to exit on its own.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Result<ExitStatus, String> {
        let mut child = self
            .process
            .take()
            .ok_or_else(|| "Watchdog is not running".to_string())?;

        match child.wait_timeout(timeout) {
            Ok(Some(status)) => {
                self.collect_logs();
                println!("Watchdog exited with status: {}", status);
                Ok(status)
            }
            Ok(None) => {
                child.kill().ok();
                child.wait().ok();
                self.collect_logs();
                Err(format!("Watchdog did not exit within {:?}", timeout))
            }
            Err(e) => Err(format!("Error waiting for watchdog: {}", e)),
        }
    }

    /// Send SIGTERM to the watchdog and wait for it to exit.
    pub fn shutdown(&mut self) -> Result<ExitStatus, String> {
        let pid = self
            .process
            .as_ref()
            .map(|child| child.id())
            .ok_or_else(|| "Watchdog is not running".to_string())?;

        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        )
        .map_err(|e| format!("Failed to send SIGTERM: {}", e))?;

        self.wait_for_exit(Duration::from_secs(10))
    }

    pub fn is_running(&mut self) -> bool {
        match self.process.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn collect_logs(&mut self) {
        if let Ok(content) = fs::read_to_string(&self.log_file_path) {
            let lines: Vec<String> = content.lines().map(|s| s.to_string()).collect();
            for line in lines.iter().skip(self.log_output.len()) {
                println!("[WATCHDOG] {}", line);
            }
            self.log_output = lines;
        }
    }

    pub fn count_log_matching(&self, pattern: &str) -> usize {
        self.log_output
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }

    pub fn has_log_matching(&self, pattern: &str) -> bool {
        self.count_log_matching(pattern) > 0
    }

    pub fn get_logs(&self) -> &[String] {
        &self.log_output
    }
}

impl Drop for WatchdogWrapper {
    fn drop(&mut self) {
        if let Some(mut child) = self.process.take() {
            child.kill().ok();
            child.wait().ok();
        }
    }
}

/// Write an executable shell script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Lines in a file, or zero if it does not exist yet.
pub fn count_lines(path: &Path) -> usize {
    fs::read_to_string(path)
        .map(|content| content.lines().count())
        .unwrap_or(0)
}
