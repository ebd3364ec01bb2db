//! Round-robin group of identical stations (one per bed).
//!
//! The group is always ready: every selection runs the member under the
//! cursor and advances the cursor by one, wrapping after the last member.
//! A lap starting at member 0 becomes a refill lap when the refill interval
//! has passed since the last refill lap finished.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::core::types::{RunStatistics, StationTotals};
use crate::station::chore::{ChoreStation, Publisher};
use crate::station::{Station, StationContext, StationError};

#[derive(Debug)]
pub struct StationGroup {
    name: String,
    members: Vec<ChoreStation>,
    cursor: usize,
    laps: u64,
    refill_interval: Option<Duration>,
    last_refill: DateTime<Utc>,
    refill_lap: bool,
    publishers: Vec<Publisher>,
}

impl StationGroup {
    /// `started` is when the refill interval starts counting.
    pub fn new(
        name: impl Into<String>,
        members: Vec<ChoreStation>,
        refill_interval: Option<Duration>,
        started: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            members,
            cursor: 0,
            laps: 0,
            refill_interval,
            last_refill: started,
            refill_lap: false,
            publishers: Vec::new(),
        }
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Completed laps.
    pub fn laps(&self) -> u64 {
        self.laps
    }

    pub fn is_refill_lap(&self) -> bool {
        self.refill_lap
    }

    /// Member the next selection will run.
    pub fn next_member(&self) -> Option<&str> {
        self.members.get(self.cursor).map(|member| member.name())
    }

    /// Run the member under the cursor, then advance the cursor.
    ///
    /// The cursor advances even when the member fails, so one broken bed
    /// cannot starve the rest.
    #[instrument(skip(self, ctx), fields(group = %self.name, cursor = self.cursor))]
    pub fn complete_next(
        &mut self,
        ctx: &mut StationContext<'_>,
    ) -> Result<RunStatistics, StationError> {
        if self.members.is_empty() {
            return Err(StationError::Other(anyhow::anyhow!(
                "group '{}' has no members",
                self.name
            )));
        }

        if self.cursor == 0 {
            let now = ctx.clock.now();
            self.refill_lap = self.refill_due(now);
            info!(lap = self.laps + 1, refill = self.refill_lap, "lap started");
        }
        let refill = self.refill_lap;
        let result = self.members[self.cursor].run(ctx, refill);

        self.cursor = (self.cursor + 1) % self.members.len();
        if self.cursor == 0 {
            self.finish_lap(ctx.clock.now());
        }

        if let Ok(stats) = &result {
            for publisher in &self.publishers {
                publisher.publish(stats);
            }
        }
        result
    }

    fn refill_due(&self, now: DateTime<Utc>) -> bool {
        let Some(interval) = self.refill_interval else {
            return false;
        };
        (now - self.last_refill)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= interval)
    }

    fn finish_lap(&mut self, now: DateTime<Utc>) {
        self.laps += 1;
        if self.refill_lap {
            self.refill_lap = false;
            self.last_refill = now;
        }
        info!(laps = self.laps, "lap finished");
    }

    pub fn totals(&self) -> StationTotals {
        let mut totals = StationTotals::default();
        for member in &self.members {
            totals.merge(&member.totals());
        }
        totals
    }
}
