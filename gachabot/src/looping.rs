//! Multi-tick driver for `gachabot run`.

use std::time::Duration;

use tracing::{debug, info};

use crate::io::clock::Shutdown;
use crate::scheduler::{Scheduler, TickContext, TickOutcome};

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// Shutdown was requested (flag, stop file, or a terminated chore).
    Shutdown,
    /// The configured tick budget was used up.
    MaxTicks,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Ticks that ran a station.
    pub ticks: u64,
    /// Ticks that found nothing ready.
    pub idle_ticks: u64,
    /// Ticks skipped while paused.
    pub paused_ticks: u64,
    pub stop: LoopStop,
}

/// Tick the scheduler until shutdown or until `max_ticks` ticks (busy, idle
/// or paused) have passed. Idle and paused ticks sleep `idle` on the context
/// clock.
pub fn run_loop<F: FnMut(&TickOutcome)>(
    scheduler: &mut Scheduler,
    ctx: &mut TickContext<'_>,
    shutdown: &Shutdown,
    idle: Duration,
    max_ticks: Option<u64>,
    mut on_tick: F,
) -> LoopOutcome {
    let mut outcome = LoopOutcome {
        ticks: 0,
        idle_ticks: 0,
        paused_ticks: 0,
        stop: LoopStop::Shutdown,
    };
    let mut was_paused = false;

    loop {
        if shutdown.is_requested() {
            info!(ticks = outcome.ticks, idle_ticks = outcome.idle_ticks, "shutdown requested");
            return outcome;
        }
        let used = outcome.ticks + outcome.idle_ticks + outcome.paused_ticks;
        if max_ticks.is_some_and(|limit| used >= limit) {
            info!(ticks = outcome.ticks, idle_ticks = outcome.idle_ticks, "tick budget used up");
            outcome.stop = LoopStop::MaxTicks;
            return outcome;
        }

        let paused = shutdown.is_paused();
        if paused != was_paused {
            info!(paused, "pause switched");
            was_paused = paused;
        }
        if paused {
            outcome.paused_ticks += 1;
            ctx.station.clock.sleep(idle);
            continue;
        }

        match scheduler.tick(ctx) {
            Ok(tick) => {
                outcome.ticks += 1;
                on_tick(&tick);
                if matches!(tick, TickOutcome::Terminated { .. }) {
                    return outcome;
                }
            }
            Err(idle_signal) => {
                outcome.idle_ticks += 1;
                debug!(%idle_signal, secs = idle.as_secs(), "idling");
                ctx.station.clock.sleep(idle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::io::config::RecoveryConfig;
    use crate::recovery::RecoveryHandler;
    use crate::scheduler::RosterEntry;
    use crate::test_support::{Harness, Outcome, Scene, ScriptedStation};

    fn scheduler(stations: Vec<ScriptedStation>) -> Scheduler {
        let roster = stations
            .into_iter()
            .map(|station| RosterEntry::Single(Box::new(station)))
            .collect();
        Scheduler::new(roster, RecoveryHandler::new(RecoveryConfig::default(), "Home"))
    }

    #[test]
    fn idle_ticks_sleep_on_the_clock() {
        let mut scheduler = scheduler(vec![ScriptedStation::new("a", false)]);
        let mut harness = Harness::new(vec![Scene::new()]);
        let outcome = run_loop(
            &mut scheduler,
            &mut harness.tick_ctx(),
            &Shutdown::default(),
            Duration::from_secs(30),
            Some(3),
            |_| {},
        );
        assert_eq!(
            outcome,
            LoopOutcome {
                ticks: 0,
                idle_ticks: 3,
                paused_ticks: 0,
                stop: LoopStop::MaxTicks
            }
        );
        assert_eq!(harness.clock.slept(), Duration::from_secs(90));
    }

    #[test]
    fn terminated_chore_stops_the_loop() {
        let station = ScriptedStation::new("a", true)
            .then(Outcome::Complete)
            .then(Outcome::Terminated);
        let mut scheduler = scheduler(vec![station]);
        let mut harness = Harness::new(vec![Scene::new()]);
        let mut seen = Vec::new();
        let outcome = run_loop(
            &mut scheduler,
            &mut harness.tick_ctx(),
            &Shutdown::default(),
            Duration::from_secs(30),
            None,
            |tick| seen.push(tick.clone()),
        );
        assert_eq!(outcome.stop, LoopStop::Shutdown);
        assert_eq!(outcome.ticks, 2);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn requested_shutdown_stops_before_ticking() {
        let station = ScriptedStation::new("a", true);
        let runs = station.runs_handle();
        let mut scheduler = scheduler(vec![station]);
        let mut harness = Harness::new(vec![Scene::new()]);
        let shutdown = Shutdown::default();
        shutdown.request();
        let outcome = run_loop(
            &mut scheduler,
            &mut harness.tick_ctx(),
            &shutdown,
            Duration::from_secs(30),
            None,
            |_| {},
        );
        assert_eq!(outcome.stop, LoopStop::Shutdown);
        assert_eq!(runs.get(), 0);
    }

    #[test]
    fn paused_loop_runs_nothing_until_resumed() {
        let station = ScriptedStation::new("a", true);
        let runs = station.runs_handle();
        let mut scheduler = scheduler(vec![station]);
        let mut harness = Harness::new(vec![Scene::new()]);
        let shutdown = Shutdown::default();
        shutdown.toggle_pause();

        let outcome = run_loop(
            &mut scheduler,
            &mut harness.tick_ctx(),
            &shutdown,
            Duration::from_secs(30),
            Some(2),
            |_| {},
        );
        assert_eq!(outcome.paused_ticks, 2);
        assert_eq!(outcome.stop, LoopStop::MaxTicks);
        assert_eq!(runs.get(), 0);
        assert_eq!(harness.clock.slept(), Duration::from_secs(60));

        shutdown.toggle_pause();
        let outcome = run_loop(
            &mut scheduler,
            &mut harness.tick_ctx(),
            &shutdown,
            Duration::from_secs(30),
            Some(1),
            |_| {},
        );
        assert_eq!(outcome.ticks, 1);
        assert_eq!(runs.get(), 1);
    }
}
