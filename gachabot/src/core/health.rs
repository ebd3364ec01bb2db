//! Per-run health checks against configured expectations.
//!
//! A station may declare how long a run should take and how much it should
//! yield. Each completion is judged against those numbers and the verdict
//! travels with the run statistics into the report. Refill laps do more work,
//! so they are only held to their own time limit.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Expected shape of a healthy run. Unset fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Expectation {
    /// Longest acceptable run on a regular lap.
    pub max_secs: Option<u64>,
    /// Longest acceptable run on a refill lap.
    pub refill_max_secs: Option<u64>,
    /// Smallest acceptable gain per resource on a regular lap.
    pub min_yield: BTreeMap<String, u64>,
}

/// Verdict attached to every completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Health {
    #[default]
    Nominal,
    Degraded { issues: Vec<String> },
}

impl Health {
    pub fn is_nominal(&self) -> bool {
        matches!(self, Health::Nominal)
    }
}

impl Expectation {
    /// Judge one run. A resource missing from `gained` counts as zero.
    pub fn assess(
        &self,
        time_taken: Duration,
        gained: &BTreeMap<String, u64>,
        refill_lap: bool,
    ) -> Health {
        let secs = time_taken.as_secs();
        let mut issues = Vec::new();

        if refill_lap {
            if let Some(max) = self.refill_max_secs
                && secs > max
            {
                issues.push(format!("refill lap took {secs}s, expected at most {max}s"));
            }
        } else {
            for (resource, min) in &self.min_yield {
                let got = gained.get(resource).copied().unwrap_or(0);
                if got < *min {
                    issues.push(format!("{resource} yield {got} is below {min}"));
                }
            }
            if let Some(max) = self.max_secs
                && secs > max
            {
                issues.push(format!("took {secs}s, expected at most {max}s"));
            }
        }

        if issues.is_empty() {
            Health::Nominal
        } else {
            Health::Degraded { issues }
        }
    }
}
