//! Supervision loop: probe → (launch) → sleep, until asked to stop.
//!
//! The loop runs on its own thread and shares exactly one value with the
//! controlling context: the `running` flag inside [`SupervisorState`].
//! Everything else (config, probe, launcher, counters) is owned by the loop.

use hsu_common::{LaunchError, SupervisionConfig};
use hsu_process::{ProcessLauncher, ProcessProbe};
use hsu_process_state::{InvalidTransition, PhaseMachine, SupervisorPhase};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Pause after a failed process enumeration, regardless of the configured
/// interval.
pub const ENUMERATION_BACKOFF: Duration = Duration::from_millis(5000);

/// Granularity at which a sleeping loop re-checks the stop flag.
pub const DEFAULT_STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The shared `running` flag.
///
/// Flips from `true` to `false` exactly once. The loop reads it at the top of
/// every cycle and between sleep slices.
#[derive(Debug, Clone)]
pub struct SupervisorState {
    running: Arc<AtomicBool>,
}

impl SupervisorState {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the loop to stop. Returns `true` for the call that actually
    /// flipped the flag; later calls are no-ops.
    pub fn request_stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters collected by one loop run, handed back when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub cycles: u64,
    pub probes: u64,
    pub enumeration_failures: u64,
    pub launch_attempts: u64,
    pub launches_succeeded: u64,
    pub launches_failed: u64,
    pub final_phase: SupervisorPhase,
}

impl SupervisorReport {
    fn new() -> Self {
        Self {
            cycles: 0,
            probes: 0,
            enumeration_failures: 0,
            launch_attempts: 0,
            launches_succeeded: 0,
            launches_failed: 0,
            final_phase: SupervisorPhase::Idle,
        }
    }
}

/// The supervision state machine.
pub struct SupervisorLoop<P, L> {
    config: SupervisionConfig,
    state: SupervisorState,
    probe: P,
    launcher: L,
    phases: PhaseMachine,
    stop_poll_interval: Duration,
    enumeration_backoff: Duration,
    report: SupervisorReport,
}

impl<P, L> SupervisorLoop<P, L>
where
    P: ProcessProbe,
    L: ProcessLauncher,
{
    pub fn new(config: SupervisionConfig, state: SupervisorState, probe: P, launcher: L) -> Self {
        let phases = PhaseMachine::new(config.target_name().as_str());
        Self {
            config,
            state,
            probe,
            launcher,
            phases,
            stop_poll_interval: DEFAULT_STOP_POLL_INTERVAL,
            enumeration_backoff: ENUMERATION_BACKOFF,
            report: SupervisorReport::new(),
        }
    }

    /// Set how often a sleeping loop checks for a stop request.
    pub fn with_stop_poll_interval(mut self, interval: Duration) -> Self {
        self.stop_poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    #[cfg(test)]
    pub(crate) fn with_enumeration_backoff(mut self, backoff: Duration) -> Self {
        self.enumeration_backoff = backoff;
        self
    }

    /// Run cycles until the stop flag is observed at the top of a cycle.
    pub fn run(mut self) -> SupervisorReport {
        info!("Supervision started: {}", self.config);

        loop {
            if !self.state.is_running() {
                self.transition(|phases| phases.stop());
                break;
            }

            self.transition(|phases| phases.begin_probe());
            let pause = self.run_cycle();
            self.sleep(pause);
        }

        self.report.cycles = self.phases.cycles();
        self.report.final_phase = self.phases.current();
        info!(
            "Supervision of {} stopped: {} cycle(s), {} launch(es), {} enumeration failure(s)",
            self.config.target_name(),
            self.report.cycles,
            self.report.launch_attempts,
            self.report.enumeration_failures
        );
        self.report
    }

    /// Probe and, if needed, launch. Returns how long to sleep afterwards.
    fn run_cycle(&mut self) -> Duration {
        let name = self.config.target_name().clone();
        self.report.probes += 1;

        match self.probe.count_running(name.as_str()) {
            Err(e) => {
                self.report.enumeration_failures += 1;
                error!(
                    "Error while monitoring {}: {}; retrying in {:?}",
                    name, e, self.enumeration_backoff
                );
                self.transition(|phases| phases.begin_sleep("enumeration failed"));
                self.enumeration_backoff
            }
            Ok(0) => {
                info!(
                    "{} is not running, starting {}",
                    name,
                    self.config.target_path().display()
                );
                self.transition(|phases| phases.begin_launch());
                self.launch(&name);
                self.transition(|phases| phases.begin_sleep("launch attempted"));
                self.config.check_interval()
            }
            Ok(count) => {
                info!("{} is running ({} instance(s))", name, count);
                self.transition(|phases| phases.begin_sleep("target running"));
                self.config.check_interval()
            }
        }
    }

    fn launch(&mut self, name: &hsu_common::TargetName) {
        self.report.launch_attempts += 1;

        match self.launcher.launch(self.config.target_path()) {
            Ok(()) => {
                self.report.launches_succeeded += 1;
                info!("{} started successfully", name);
            }
            Err(e @ LaunchError::NotFound { .. }) => {
                self.report.launches_failed += 1;
                warn!("Cannot start {}: {}", name, e);
            }
            Err(e) => {
                self.report.launches_failed += 1;
                error!("Failed to start {}: {}", name, e);
            }
        }
    }

    /// Sleep for `total`, waking early once a stop has been requested.
    fn sleep(&self, total: Duration) {
        // An interval too large for the clock just means "until stopped".
        let deadline = Instant::now().checked_add(total);

        loop {
            if !self.state.is_running() {
                debug!("Stop requested during sleep for {}", self.config.target_name());
                return;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return;
                    }
                    (deadline - now).min(self.stop_poll_interval)
                }
                None => self.stop_poll_interval,
            };
            thread::sleep(slice);
        }
    }

    fn transition(
        &mut self,
        step: impl FnOnce(&mut PhaseMachine) -> Result<(), InvalidTransition>,
    ) {
        // A bad transition is a bug in this loop, but never a reason to stop
        // supervising.
        if let Err(e) = step(&mut self.phases) {
            error!("{}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hsu_common::ProbeError;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Event {
        Probe,
        Launch(PathBuf),
    }

    pub(crate) type Trace = Arc<Mutex<Vec<(Event, Instant)>>>;

    /// Replays scripted probe results; once the script runs out it requests a
    /// stop and reports the target as running.
    pub(crate) struct ScriptedProbe {
        script: VecDeque<Result<usize, ProbeError>>,
        state: SupervisorState,
        trace: Trace,
    }

    impl ScriptedProbe {
        pub(crate) fn new(
            script: Vec<Result<usize, ProbeError>>,
            state: SupervisorState,
            trace: Trace,
        ) -> Self {
            Self {
                script: script.into(),
                state,
                trace,
            }
        }
    }

    impl ProcessProbe for ScriptedProbe {
        fn count_running(&mut self, _name: &str) -> Result<usize, ProbeError> {
            self.trace.lock().unwrap().push((Event::Probe, Instant::now()));
            match self.script.pop_front() {
                Some(result) => result,
                None => {
                    self.state.request_stop();
                    Ok(1)
                }
            }
        }
    }

    pub(crate) struct RecordingLauncher {
        result: Result<(), LaunchError>,
        trace: Trace,
    }

    impl RecordingLauncher {
        pub(crate) fn new(result: Result<(), LaunchError>, trace: Trace) -> Self {
            Self { result, trace }
        }
    }

    impl ProcessLauncher for RecordingLauncher {
        fn launch(&mut self, path: &Path) -> Result<(), LaunchError> {
            self.trace
                .lock()
                .unwrap()
                .push((Event::Launch(path.to_path_buf()), Instant::now()));
            self.result.clone()
        }
    }

    fn events(trace: &Trace) -> Vec<Event> {
        trace.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }

    fn fast_config() -> SupervisionConfig {
        SupervisionConfig::new("App", "/opt/app/App", 5)
    }

    fn enumeration_error() -> ProbeError {
        ProbeError::enumeration("App", "access denied")
    }

    #[test]
    fn test_zero_count_is_followed_by_exactly_one_launch() {
        let state = SupervisorState::new();
        let trace = Trace::default();
        let script = vec![Ok(0), Ok(0), Ok(2), Ok(0)];
        let probe = ScriptedProbe::new(script, state.clone(), trace.clone());
        let launcher = RecordingLauncher::new(Ok(()), trace.clone());

        let report = SupervisorLoop::new(fast_config(), state, probe, launcher).run();

        let launch = Event::Launch(PathBuf::from("/opt/app/App"));
        assert_eq!(
            events(&trace),
            vec![
                Event::Probe,
                launch.clone(),
                Event::Probe,
                launch.clone(),
                Event::Probe,
                Event::Probe,
                launch,
                Event::Probe,
            ]
        );
        assert_eq!(report.launch_attempts, 3);
        assert_eq!(report.launches_succeeded, 3);
        assert_eq!(report.probes, 5);
        assert_eq!(report.cycles, 5);
        assert_eq!(report.final_phase, SupervisorPhase::Stopped);
    }

    #[test]
    fn test_running_target_is_not_launched() {
        let state = SupervisorState::new();
        let trace = Trace::default();
        let probe = ScriptedProbe::new(vec![Ok(1), Ok(1), Ok(3)], state.clone(), trace.clone());
        let launcher = RecordingLauncher::new(Ok(()), trace.clone());

        let report = SupervisorLoop::new(fast_config(), state, probe, launcher).run();

        assert!(events(&trace).iter().all(|e| *e == Event::Probe));
        assert_eq!(report.launch_attempts, 0);
    }

    #[test]
    fn test_missing_binary_does_not_stop_supervision() {
        let state = SupervisorState::new();
        let trace = Trace::default();
        let probe = ScriptedProbe::new(vec![Ok(0), Ok(0)], state.clone(), trace.clone());
        let launcher = RecordingLauncher::new(
            Err(LaunchError::not_found("/opt/app/App")),
            trace.clone(),
        );

        let report = SupervisorLoop::new(fast_config(), state, probe, launcher).run();

        assert_eq!(report.launch_attempts, 2);
        assert_eq!(report.launches_failed, 2);
        assert_eq!(report.probes, 3);
        assert_eq!(report.final_phase, SupervisorPhase::Stopped);
    }

    #[test]
    fn test_enumeration_failure_uses_fixed_backoff_not_interval() {
        let state = SupervisorState::new();
        let trace = Trace::default();
        let script = vec![Err(enumeration_error())];
        let probe = ScriptedProbe::new(script, state.clone(), trace.clone());
        let launcher = RecordingLauncher::new(Ok(()), trace.clone());

        // Configured interval is tiny; the backoff must still be honoured.
        let config = SupervisionConfig::new("App", "/opt/app/App", 1);
        let report = SupervisorLoop::new(config, state, probe, launcher)
            .with_enumeration_backoff(Duration::from_millis(200))
            .run();

        let trace = trace.lock().unwrap();
        assert_eq!(trace.len(), 2);
        let gap = trace[1].1 - trace[0].1;
        assert!(gap >= Duration::from_millis(200), "gap was {:?}", gap);
        assert_eq!(report.enumeration_failures, 1);
        assert_eq!(report.launch_attempts, 0);
    }

    #[test]
    fn test_enumeration_backoff_is_independent_of_long_interval() {
        let state = SupervisorState::new();
        let trace = Trace::default();
        let script = vec![Err(enumeration_error())];
        let probe = ScriptedProbe::new(script, state.clone(), trace.clone());
        let launcher = RecordingLauncher::new(Ok(()), trace.clone());

        let config = SupervisionConfig::new("App", "/opt/app/App", 60_000);
        let started = Instant::now();
        SupervisorLoop::new(config, state, probe, launcher)
            .with_enumeration_backoff(Duration::from_millis(50))
            .run();

        // Second probe came after the backoff, and the final stop was seen
        // within a poll slice rather than after a full minute.
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(events(&trace).len(), 2);
    }

    #[test]
    fn test_stop_before_start_performs_no_probe() {
        let state = SupervisorState::new();
        state.request_stop();
        let trace = Trace::default();
        let probe = ScriptedProbe::new(vec![Ok(0)], state.clone(), trace.clone());
        let launcher = RecordingLauncher::new(Ok(()), trace.clone());

        let report = SupervisorLoop::new(fast_config(), state, probe, launcher).run();

        assert!(events(&trace).is_empty());
        assert_eq!(report.cycles, 0);
        assert_eq!(report.final_phase, SupervisorPhase::Stopped);
    }

    #[test]
    fn test_current_cycle_completes_after_stop_request() {
        struct StopDuringProbe {
            state: SupervisorState,
            trace: Trace,
        }

        impl ProcessProbe for StopDuringProbe {
            fn count_running(&mut self, _name: &str) -> Result<usize, ProbeError> {
                self.trace.lock().unwrap().push((Event::Probe, Instant::now()));
                self.state.request_stop();
                Ok(0)
            }
        }

        let state = SupervisorState::new();
        let trace = Trace::default();
        let probe = StopDuringProbe {
            state: state.clone(),
            trace: trace.clone(),
        };
        let launcher = RecordingLauncher::new(Ok(()), trace.clone());

        let report = SupervisorLoop::new(fast_config(), state, probe, launcher).run();

        // The launch belonging to the in-flight cycle still happens, nothing after it.
        assert_eq!(
            events(&trace),
            vec![Event::Probe, Event::Launch(PathBuf::from("/opt/app/App"))]
        );
        assert_eq!(report.cycles, 1);
    }

    #[test]
    fn test_stop_interrupts_long_sleep() {
        let state = SupervisorState::new();
        let trace = Trace::default();
        let probe = ScriptedProbe::new(vec![Ok(1), Ok(1)], state.clone(), trace.clone());
        let launcher = RecordingLauncher::new(Ok(()), trace.clone());

        let supervisor = SupervisorLoop::new(
            SupervisionConfig::new("App", "/opt/app/App", 60_000),
            state.clone(),
            probe,
            launcher,
        )
        .with_stop_poll_interval(Duration::from_millis(20));

        let handle = thread::spawn(move || supervisor.run());
        thread::sleep(Duration::from_millis(100));
        let stopped_at = Instant::now();
        assert!(state.request_stop());

        let report = handle.join().unwrap();
        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        assert_eq!(report.probes, 1);
        assert_eq!(events(&trace), vec![Event::Probe]);
    }

    #[test]
    fn test_request_stop_flips_only_once() {
        let state = SupervisorState::new();
        assert!(state.is_running());
        assert!(state.request_stop());
        assert!(!state.request_stop());
        assert!(!state.is_running());
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let state = SupervisorState::new();
        let trace = Trace::default();
        let probe = ScriptedProbe::new(vec![], state.clone(), trace.clone());
        let launcher = RecordingLauncher::new(Ok(()), trace);
        let supervisor = SupervisorLoop::new(fast_config(), state, probe, launcher)
            .with_stop_poll_interval(Duration::ZERO);
        assert_eq!(supervisor.stop_poll_interval, Duration::from_millis(1));
        assert_eq!(supervisor.phases.current(), SupervisorPhase::Idle);
    }
}
