//! Station that cycles through named phases, one per completion.
//!
//! Each phase is its own script with its own interval and optional gate; only
//! the current phase decides readiness. A successful completion moves to the
//! next phase (wrapping after the last), restarting that phase's interval
//! and re-arming its gate. A failed completion stays in the same phase and
//! waits out its interval before trying again.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::core::types::{RunStatistics, StationTotals};
use crate::station::chore::{ChoreStation, Publisher};
use crate::station::{Station, StationContext, StationError};

#[derive(Debug)]
pub struct Phase {
    pub name: String,
    pub station: ChoreStation,
}

#[derive(Debug)]
pub struct PhasedStation {
    name: String,
    phases: Vec<Phase>,
    current: usize,
    publishers: Vec<Publisher>,
}

impl PhasedStation {
    pub fn new(name: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self {
            name: name.into(),
            phases,
            current: 0,
            publishers: Vec::new(),
        }
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publishers.push(publisher);
        self
    }

    /// Name of the phase the next completion runs.
    pub fn phase(&self) -> Option<&str> {
        self.phases.get(self.current).map(|phase| phase.name.as_str())
    }
}

impl Station for PhasedStation {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.phases
            .get(self.current)
            .is_some_and(|phase| phase.station.is_ready(now))
    }

    #[instrument(skip_all, fields(station = %self.name, phase = self.phase().unwrap_or("-")))]
    fn complete(&mut self, ctx: &mut StationContext<'_>) -> Result<RunStatistics, StationError> {
        let Some(phase) = self.phases.get_mut(self.current) else {
            return Err(StationError::Other(anyhow::anyhow!(
                "station '{}' has no phases",
                self.name
            )));
        };
        let mut stats = phase.station.run(ctx, false)?;
        stats.phase = Some(phase.name.clone());

        self.current = (self.current + 1) % self.phases.len();
        let next = &mut self.phases[self.current];
        next.station.restart_at(stats.finished_at);
        info!(next = %next.name, "phase advanced");

        for publisher in &self.publishers {
            publisher.publish(&stats);
        }
        Ok(stats)
    }

    fn totals(&self) -> StationTotals {
        let mut totals = StationTotals::default();
        for phase in &self.phases {
            totals.merge(&phase.station.totals());
        }
        totals
    }
}
