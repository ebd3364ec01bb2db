//! Builds the live roster from validated configuration.
//!
//! Published counters are created first (one writer each), then gates are
//! wired to read-only handles of those counters.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::chore::Step;
use crate::core::counter::{Counter, CounterReader, Gate};
use crate::core::readiness::ReadinessClock;
use crate::io::config::{
    BotConfig, GateConfig, GroupConfig, PhasedConfig, PublishConfig, RosterEntryConfig,
    StationConfig,
};
use crate::scheduler::RosterEntry;
use crate::station::chore::Publisher;
use crate::station::{ChoreStation, Phase, PhasedStation, StationGroup};

/// Construct every roster entry in priority order. `now` is startup time.
pub fn build_roster(cfg: &BotConfig, now: DateTime<Utc>) -> Result<Vec<RosterEntry>> {
    let mut writers: BTreeMap<String, Counter> = BTreeMap::new();
    for entry in &cfg.roster {
        for publish in entry.publishes() {
            if writers.contains_key(&publish.counter) {
                return Err(anyhow!("counter '{}' is published twice", publish.counter));
            }
            writers.insert(publish.counter.clone(), Counter::new(publish.counter.clone()));
        }
    }
    let readers: BTreeMap<String, CounterReader> = writers
        .iter()
        .map(|(name, counter)| (name.clone(), counter.reader()))
        .collect();

    let mut roster = Vec::with_capacity(cfg.roster.len());
    for entry in &cfg.roster {
        let built = match entry {
            RosterEntryConfig::Station(station) => {
                RosterEntry::Single(Box::new(build_station(station, &mut writers, &readers, now)?))
            }
            RosterEntryConfig::Group(group) => {
                RosterEntry::Group(build_group(group, &mut writers, now)?)
            }
            RosterEntryConfig::Phased(phased) => {
                RosterEntry::Single(Box::new(build_phased(phased, &mut writers, &readers, now)?))
            }
        };
        debug!(entry = built.name(), "roster entry built");
        roster.push(built);
    }
    Ok(roster)
}

fn build_station(
    cfg: &StationConfig,
    writers: &mut BTreeMap<String, Counter>,
    readers: &BTreeMap<String, CounterReader>,
    now: DateTime<Utc>,
) -> Result<ChoreStation> {
    let interval = Duration::from_secs(cfg.interval_secs);
    let clock = if cfg.ready_at_start {
        ReadinessClock::new(interval)
    } else {
        ReadinessClock::started_at(interval, now)
    };
    let steps: Rc<[Step]> = Rc::from(cfg.steps.clone());
    let mut station = ChoreStation::new(cfg.name.clone(), clock, steps)
        .with_expectation(cfg.expect.clone());

    if let Some(gate) = &cfg.gate {
        station = station.with_gate(build_gate(&cfg.name, gate, readers)?);
    }
    for (resource, plausibility) in &cfg.plausibility {
        station = station.with_plausibility(resource.clone(), *plausibility);
    }
    for publisher in take_publishers(&cfg.publishes, writers)? {
        station = station.with_publisher(publisher);
    }
    Ok(station)
}

/// Only the first phase honours `ready_at_start`; later phases start their
/// interval when they are entered.
fn build_phased(
    cfg: &PhasedConfig,
    writers: &mut BTreeMap<String, Counter>,
    readers: &BTreeMap<String, CounterReader>,
    now: DateTime<Utc>,
) -> Result<PhasedStation> {
    let mut phases = Vec::with_capacity(cfg.phases.len());
    for (idx, phase) in cfg.phases.iter().enumerate() {
        let interval = Duration::from_secs(phase.interval_secs);
        let clock = if idx == 0 && cfg.ready_at_start {
            ReadinessClock::new(interval)
        } else {
            ReadinessClock::started_at(interval, now)
        };
        let steps: Rc<[Step]> = Rc::from(phase.steps.clone());
        let mut station = ChoreStation::new(cfg.name.clone(), clock, steps)
            .with_expectation(phase.expect.clone());
        if let Some(gate) = &phase.gate {
            station = station.with_gate(build_gate(&cfg.name, gate, readers)?);
        }
        for (resource, plausibility) in &phase.plausibility {
            station = station.with_plausibility(resource.clone(), *plausibility);
        }
        phases.push(Phase {
            name: phase.name.clone(),
            station,
        });
    }

    let mut station = PhasedStation::new(cfg.name.clone(), phases);
    for publisher in take_publishers(&cfg.publishes, writers)? {
        station = station.with_publisher(publisher);
    }
    Ok(station)
}

fn build_gate(
    station: &str,
    cfg: &GateConfig,
    readers: &BTreeMap<String, CounterReader>,
) -> Result<Gate> {
    let reader = readers.get(&cfg.counter).ok_or_else(|| {
        anyhow!(
            "station '{station}' is gated on unknown counter '{}'",
            cfg.counter
        )
    })?;
    Ok(Gate::new(reader.clone(), cfg.threshold))
}

/// Members share one script and start due; the group cursor paces them.
/// A member's interval is zero, so its first reading seeds plausibility.
fn build_group(
    cfg: &GroupConfig,
    writers: &mut BTreeMap<String, Counter>,
    now: DateTime<Utc>,
) -> Result<StationGroup> {
    let steps: Rc<[Step]> = Rc::from(cfg.steps.clone());
    let members = cfg
        .member_names()
        .into_iter()
        .map(|name| {
            let mut member =
                ChoreStation::new(name, ReadinessClock::new(Duration::ZERO), Rc::clone(&steps))
                    .with_expectation(cfg.expect.clone());
            for (resource, plausibility) in &cfg.plausibility {
                member = member.with_plausibility(resource.clone(), *plausibility);
            }
            member
        })
        .collect();

    let refill = cfg.refill_interval_secs.map(Duration::from_secs);
    let mut group = StationGroup::new(cfg.prefix.clone(), members, refill, now);
    for publisher in take_publishers(&cfg.publishes, writers)? {
        group = group.with_publisher(publisher);
    }
    Ok(group)
}

fn take_publishers(
    publishes: &[PublishConfig],
    writers: &mut BTreeMap<String, Counter>,
) -> Result<Vec<Publisher>> {
    publishes
        .iter()
        .map(|publish| {
            let counter = writers
                .remove(&publish.counter)
                .ok_or_else(|| anyhow!("counter '{}' has no writer", publish.counter))?;
            Ok(Publisher {
                resource: publish.resource.clone(),
                counter,
            })
        })
        .collect()
}
