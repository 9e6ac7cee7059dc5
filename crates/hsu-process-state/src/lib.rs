//! # HSU Process State
//!
//! Phase tracking for the supervision loop.
//!
//! The loop moves through `Idle → Probing → (Launching) → Sleeping → Probing …`
//! until it observes a stop request and ends in `Stopped`. [`PhaseMachine`]
//! checks every move against that transition table and keeps a bounded,
//! timestamped history for diagnostics.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Maximum number of transitions kept in the history.
const MAX_HISTORY: usize = 100;

/// Phase of the supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorPhase {
    /// Constructed, first cycle not started yet
    Idle,
    /// Querying the OS for the target
    Probing,
    /// Starting the target because the probe found none
    Launching,
    /// Waiting for the next cycle
    Sleeping,
    /// Loop has exited; terminal
    Stopped,
}

impl fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorPhase::Idle => write!(f, "idle"),
            SupervisorPhase::Probing => write!(f, "probing"),
            SupervisorPhase::Launching => write!(f, "launching"),
            SupervisorPhase::Sleeping => write!(f, "sleeping"),
            SupervisorPhase::Stopped => write!(f, "stopped"),
        }
    }
}

impl SupervisorPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorPhase::Stopped)
    }
}

/// A move that the transition table does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid supervisor transition for '{target}': {from} -> {to}")]
pub struct InvalidTransition {
    pub target: String,
    pub from: SupervisorPhase,
    pub to: SupervisorPhase,
}

/// One recorded phase change.
#[derive(Debug, Clone)]
pub struct PhaseTransition {
    pub from: SupervisorPhase,
    pub to: SupervisorPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Validated phase tracking for one supervision loop.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    target: String,
    current: SupervisorPhase,
    history: Vec<PhaseTransition>,
    cycles: u64,
}

impl PhaseMachine {
    /// Create a machine in [`SupervisorPhase::Idle`] for the named target.
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            current: SupervisorPhase::Idle,
            history: Vec::new(),
            cycles: 0,
        }
    }

    pub fn current(&self) -> SupervisorPhase {
        self.current
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    pub fn last_transition(&self) -> Option<&PhaseTransition> {
        self.history.last()
    }

    /// Number of supervision cycles started (entries into `Probing`).
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Check a move against the transition table.
    pub fn is_valid_transition(&self, to: SupervisorPhase) -> bool {
        use SupervisorPhase::*;

        matches!(
            (self.current, to),
            (Idle, Probing)
                // Stop requested before the first cycle started
                | (Idle, Stopped)
                | (Probing, Launching)
                | (Probing, Sleeping)
                | (Launching, Sleeping)
                | (Sleeping, Probing)
                | (Sleeping, Stopped)
        )
    }

    /// Move to `to`, recording the optional reason.
    pub fn transition_to(
        &mut self,
        to: SupervisorPhase,
        reason: Option<String>,
    ) -> Result<(), InvalidTransition> {
        if !self.is_valid_transition(to) {
            return Err(InvalidTransition {
                target: self.target.clone(),
                from: self.current,
                to,
            });
        }

        let now = Utc::now();
        let from = self.current;
        self.history.push(PhaseTransition {
            from,
            to,
            timestamp: now,
            reason,
        });
        if self.history.len() > MAX_HISTORY {
            self.history.remove(0);
        }

        self.current = to;
        if to == SupervisorPhase::Probing {
            self.cycles += 1;
        }

        tracing::trace!("Supervisor for {} moved from {} to {}", self.target, from, to);
        Ok(())
    }

    pub fn begin_probe(&mut self) -> Result<(), InvalidTransition> {
        self.transition_to(SupervisorPhase::Probing, None)
    }

    pub fn begin_launch(&mut self) -> Result<(), InvalidTransition> {
        self.transition_to(
            SupervisorPhase::Launching,
            Some("target not running".to_string()),
        )
    }

    pub fn begin_sleep(&mut self, reason: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition_to(SupervisorPhase::Sleeping, Some(reason.into()))
    }

    pub fn stop(&mut self) -> Result<(), InvalidTransition> {
        self.transition_to(
            SupervisorPhase::Stopped,
            Some("stop requested".to_string()),
        )
    }
}
