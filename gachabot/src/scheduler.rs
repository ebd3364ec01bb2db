//! Priority scheduler: one ready station per tick.
//!
//! The roster is scanned in configured order and the first ready entry runs.
//! Round-robin groups are always ready, so anything placed after a group is
//! only reached while the group is empty. Failures are classified here:
//! not-found is reported, termination is swallowed and everything else goes
//! to the recovery handler. No failure escapes `tick`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{Report, RunStatistics, StationTotals};
use crate::io::movement::Reconnect;
use crate::io::notify::Notifier;
use crate::recovery::RecoveryHandler;
use crate::station::{Station, StationContext, StationError, StationGroup};

/// Nothing is ready; the caller should idle and tick again later.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no station is ready")]
pub struct NoReadyStationError;

/// One roster slot.
pub enum RosterEntry {
    Single(Box<dyn Station>),
    Group(StationGroup),
}

impl RosterEntry {
    pub fn name(&self) -> &str {
        match self {
            RosterEntry::Single(station) => station.name(),
            RosterEntry::Group(group) => group.name(),
        }
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self {
            RosterEntry::Single(station) => station.is_ready(now),
            RosterEntry::Group(group) => !group.is_empty(),
        }
    }

    /// Name of the station the next completion runs.
    fn next_station(&self) -> &str {
        match self {
            RosterEntry::Single(station) => station.name(),
            RosterEntry::Group(group) => group.next_member().unwrap_or(group.name()),
        }
    }

    fn complete(&mut self, ctx: &mut StationContext<'_>) -> Result<RunStatistics, StationError> {
        match self {
            RosterEntry::Single(station) => station.complete(ctx),
            RosterEntry::Group(group) => group.complete_next(ctx),
        }
    }

    pub fn totals(&self) -> StationTotals {
        match self {
            RosterEntry::Single(station) => station.totals(),
            RosterEntry::Group(group) => group.totals(),
        }
    }
}

impl std::fmt::Debug for RosterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterEntry::Single(station) => f.debug_tuple("Single").field(&station.name()).finish(),
            RosterEntry::Group(group) => f
                .debug_struct("Group")
                .field("name", &group.name())
                .field("len", &group.len())
                .finish(),
        }
    }
}

/// Everything one tick may touch.
pub struct TickContext<'a> {
    pub station: StationContext<'a>,
    pub session: &'a mut dyn Reconnect,
    pub notifier: &'a dyn Notifier,
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(RunStatistics),
    /// Target unreachable; reported, loop continues.
    NotFound { station: String },
    /// Shutdown observed mid-chore.
    Terminated { station: String },
    /// Unclassified failure handed to recovery.
    Recovered { station: String, recovered: bool },
}

pub struct Scheduler {
    roster: Vec<RosterEntry>,
    recovery: RecoveryHandler,
}

impl Scheduler {
    pub fn new(roster: Vec<RosterEntry>, recovery: RecoveryHandler) -> Self {
        Self { roster, recovery }
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    /// Run the first ready roster entry.
    #[instrument(skip_all)]
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<TickOutcome, NoReadyStationError> {
        let now = ctx.station.clock.now();
        let Some(entry) = self.roster.iter_mut().find(|entry| entry.is_ready(now)) else {
            debug!("no station ready");
            return Err(NoReadyStationError);
        };
        let station = entry.next_station().to_string();
        info!(%station, entry = entry.name(), "station selected");

        match entry.complete(&mut ctx.station) {
            Ok(stats) => {
                ctx.notifier.send(Report::Completed(stats.clone()));
                Ok(TickOutcome::Completed(stats))
            }
            Err(StationError::NotFound { target, detail }) => {
                warn!(%station, %target, %detail, "target not found");
                ctx.notifier.send(Report::NotFound {
                    station: station.clone(),
                    target,
                    detail,
                    viewpoint: ctx.station.navigator.current().to_string(),
                    snapshot: ctx
                        .station
                        .vision
                        .last_capture()
                        .map(|frame| frame.snapshot()),
                });
                Ok(TickOutcome::NotFound { station })
            }
            Err(StationError::Terminated) => {
                info!(%station, "terminated");
                Ok(TickOutcome::Terminated { station })
            }
            Err(err) => {
                warn!(%station, err = %format!("{err:#}"), "unclassified failure");
                let recovered = self.recovery.recover(&station, &err, ctx);
                Ok(TickOutcome::Recovered { station, recovered })
            }
        }
    }

    /// Accumulated statistics per roster entry, in roster order.
    pub fn totals(&self) -> Vec<(String, StationTotals)> {
        self.roster
            .iter()
            .map(|entry| (entry.name().to_string(), entry.totals()))
            .collect()
    }
}
