//! Statistics and report value types shared by stations, the scheduler and
//! notification sinks.
//!
//! Values here are immutable once built and cross into the notification
//! worker thread, so they own all their data.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::health::Health;

/// Outcome of a single station completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub station: String,
    /// Phase of a phased station that ran; `None` for single-script stations.
    pub phase: Option<String>,
    #[serde(with = "duration_secs")]
    pub time_taken: Duration,
    /// Amounts gained per resource (after plausibility bounding).
    pub resources_gained: BTreeMap<String, u64>,
    pub is_special_lap: bool,
    pub finished_at: DateTime<Utc>,
    /// Resources whose raw reading was replaced by the expected value.
    pub substitutions: Vec<String>,
    pub health: Health,
}

/// Running totals a station accumulates over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StationTotals {
    pub total_completions: u64,
    #[serde(with = "duration_secs")]
    pub total_time: Duration,
    pub resources: BTreeMap<String, u64>,
}

impl StationTotals {
    /// Fold a completion into the totals.
    pub fn absorb(&mut self, stats: &RunStatistics) {
        self.total_completions = self.total_completions.saturating_add(1);
        self.total_time = self.total_time.saturating_add(stats.time_taken);
        self.add_resources(&stats.resources_gained);
    }

    pub fn merge(&mut self, other: &StationTotals) {
        self.total_completions = self.total_completions.saturating_add(other.total_completions);
        self.total_time = self.total_time.saturating_add(other.total_time);
        self.add_resources(&other.resources);
    }

    fn add_resources(&mut self, amounts: &BTreeMap<String, u64>) {
        for (name, amount) in amounts {
            let total = self.resources.entry(name.clone()).or_insert(0);
            *total = total.saturating_add(*amount);
        }
    }
}

/// Reference to the last screen capture, attached to failure reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub frame_id: u64,
    pub path: Option<String>,
}

/// Outcome of a recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// A corrective action restored a controllable state.
    Recovered { actions_taken: u32 },
    /// Every action was tried and control was not confirmed.
    Failed { actions_taken: u32 },
}

impl RecoveryOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered { .. })
    }
}

/// Finalized payload handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    Completed(RunStatistics),
    /// A navigation or interaction target could not be reached.
    NotFound {
        station: String,
        target: String,
        detail: String,
        viewpoint: String,
        snapshot: Option<Snapshot>,
    },
    /// An unclassified failure and the recovery that followed it.
    Failure {
        station: String,
        error: String,
        viewpoint: String,
        snapshot: Option<Snapshot>,
        recovery: RecoveryOutcome,
    },
}

impl Report {
    pub fn kind(&self) -> &'static str {
        match self {
            Report::Completed(_) => "completed",
            Report::NotFound { .. } => "not_found",
            Report::Failure { .. } => "failure",
        }
    }

    pub fn station(&self) -> &str {
        match self {
            Report::Completed(stats) => &stats.station,
            Report::NotFound { station, .. } | Report::Failure { station, .. } => station,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
