//! Geocoding run state machine
//!
//! IDLE → RUNNING → COMPLETED | FAILED | CANCELLED

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GeocodeParameters, Progress};

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    /// Created, not started
    Idle,
    /// Collecting, resolving and persisting
    Running,
    /// All candidates processed
    Completed,
    /// Aborted by a fatal error
    Failed,
    /// Stopped on request
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }

    /// Column value stored in `geocode_runs.state`
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "IDLE",
            RunState::Running => "RUNNING",
            RunState::Completed => "COMPLETED",
            RunState::Failed => "FAILED",
            RunState::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for RunState {
    type Err = alumni_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(RunState::Idle),
            "RUNNING" => Ok(RunState::Running),
            "COMPLETED" => Ok(RunState::Completed),
            "FAILED" => Ok(RunState::Failed),
            "CANCELLED" => Ok(RunState::Cancelled),
            other => Err(alumni_common::Error::Internal(format!(
                "Unknown run state: {}",
                other
            ))),
        }
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// Progress of a run as shown to the administrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub done: usize,
    pub total: usize,
    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,
    pub elapsed_seconds: u64,
}

/// Counters of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Profiles collected as candidates
    pub candidates: usize,
    /// Addresses that resolved to coordinates
    pub resolved: usize,
    /// Addresses left without coordinates
    pub unresolved: usize,
    /// Profile rows updated
    pub written: usize,
    /// Profile updates that failed
    pub write_failures: usize,
    /// Batches processed
    pub batches: usize,
}

/// One geocoding run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeRun {
    pub run_id: Uuid,
    pub state: RunState,
    pub parameters: GeocodeParameters,
    pub progress: RunProgress,
    pub summary: Option<RunSummary>,
    /// Error message of a failed run
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl GeocodeRun {
    pub fn new(parameters: GeocodeParameters) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Idle,
            parameters,
            progress: RunProgress::default(),
            summary: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        transition
    }

    pub fn update_progress(&mut self, progress: Progress) {
        self.progress.done = progress.done;
        self.progress.total = progress.total;
        self.progress.percentage = progress.percentage();
        self.progress.elapsed_seconds = self.elapsed_seconds();
    }

    pub fn fail(&mut self, message: impl Into<String>) -> StateTransition {
        self.error = Some(message.into());
        self.transition_to(RunState::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        alumni_common::time::elapsed_seconds(self.started_at, end)
    }
}
