//! Script-driven station.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::chore::{Step, WalkDirection, expand_bed};
use crate::core::counter::{Counter, Gate};
use crate::core::health::Expectation;
use crate::core::plausibility::{PlausibilityConfig, PlausibilityModel, bound};
use crate::core::readiness::ReadinessClock;
use crate::core::types::{RunStatistics, StationTotals};
use crate::perception::{PerceptionError, Reading};
use crate::station::{Station, StationContext, StationError};

/// Publishes the running total of one resource into a shared counter.
#[derive(Debug)]
pub struct Publisher {
    pub resource: String,
    pub counter: Counter,
}

impl Publisher {
    pub fn publish(&self, stats: &RunStatistics) {
        if let Some(amount) = stats.resources_gained.get(&self.resource) {
            self.counter.add(*amount);
            debug!(counter = self.counter.name(), total = self.counter.get(), "published");
        }
    }
}

/// Plausibility settings and history for one resource.
#[derive(Debug, Clone)]
struct Bounded {
    cfg: PlausibilityConfig,
    model: PlausibilityModel,
}

/// Amounts accumulated while a script runs.
#[derive(Debug, Default)]
struct Gains {
    resources: BTreeMap<String, u64>,
    substitutions: Vec<String>,
    /// Bounded values, recorded into the models only if the run succeeds.
    samples: Vec<(String, u64)>,
}

impl Gains {
    fn add(&mut self, resource: &str, amount: u64) {
        let total = self.resources.entry(resource.to_string()).or_insert(0);
        *total = total.saturating_add(amount);
    }

    fn substituted(&mut self, resource: &str) {
        if !self.substitutions.iter().any(|name| name == resource) {
            self.substitutions.push(resource.to_string());
        }
    }
}

/// A station whose chore is a configured step script.
#[derive(Debug)]
pub struct ChoreStation {
    name: String,
    clock: ReadinessClock,
    gate: Option<Gate>,
    steps: Rc<[Step]>,
    bounded: BTreeMap<String, Bounded>,
    publishers: Vec<Publisher>,
    expectation: Expectation,
    totals: StationTotals,
}

impl ChoreStation {
    pub fn new(name: impl Into<String>, clock: ReadinessClock, steps: Rc<[Step]>) -> Self {
        Self {
            name: name.into(),
            clock,
            gate: None,
            steps,
            bounded: BTreeMap::new(),
            publishers: Vec::new(),
            expectation: Expectation::default(),
            totals: StationTotals::default(),
        }
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_plausibility(mut self, resource: impl Into<String>, cfg: PlausibilityConfig) -> Self {
        self.bounded.insert(
            resource.into(),
            Bounded {
                cfg,
                model: PlausibilityModel::default(),
            },
        );
        self
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectation = expectation;
        self
    }

    /// Start waiting one interval from `now` and re-arm the gate.
    pub fn restart_at(&mut self, now: DateTime<Utc>) {
        self.clock.mark_completed(now);
        if let Some(gate) = &mut self.gate {
            gate.rearm();
        }
    }

    pub fn readiness(&self) -> &ReadinessClock {
        &self.clock
    }

    pub fn model(&self, resource: &str) -> Option<&PlausibilityModel> {
        self.bounded.get(resource).map(|bounded| &bounded.model)
    }

    /// Run the script; `refill` enables `refill` blocks.
    ///
    /// The readiness clock is marked completed whether or not the script
    /// succeeds, so a consistently failing station cannot hot-loop. Readings
    /// taken by a failed run count nowhere: neither the plausibility models
    /// nor the totals and counters see them.
    #[instrument(skip(self, ctx), fields(station = %self.name))]
    pub fn run(
        &mut self,
        ctx: &mut StationContext<'_>,
        refill: bool,
    ) -> Result<RunStatistics, StationError> {
        let started = ctx.clock.now();
        let since_last = match self.clock.last_completed() {
            Some(_) => self.clock.elapsed(started),
            None => self.clock.interval(),
        };
        let steps = Rc::clone(&self.steps);
        let mut gains = Gains::default();

        let outcome = self.run_steps(&steps, ctx, refill, since_last, &mut gains);

        let finished = ctx.clock.now();
        self.clock.mark_completed(finished);
        outcome?;

        for (resource, value) in gains.samples {
            if let Some(bounded) = self.bounded.get_mut(&resource) {
                bounded.model.record(value);
            }
        }
        let time_taken = (finished - started).to_std().unwrap_or(Duration::ZERO);
        let health = self
            .expectation
            .assess(time_taken, &gains.resources, refill);
        if !health.is_nominal() {
            warn!(?health, "run outside expectations");
        }
        let stats = RunStatistics {
            station: self.name.clone(),
            phase: None,
            time_taken,
            resources_gained: gains.resources,
            is_special_lap: refill,
            finished_at: finished,
            substitutions: gains.substitutions,
            health,
        };
        self.totals.absorb(&stats);
        for publisher in &self.publishers {
            publisher.publish(&stats);
        }
        info!(secs = stats.time_taken.as_secs(), gained = ?stats.resources_gained, "station completed");
        Ok(stats)
    }

    fn run_steps(
        &mut self,
        steps: &[Step],
        ctx: &mut StationContext<'_>,
        refill: bool,
        since_last: Duration,
        gains: &mut Gains,
    ) -> Result<(), StationError> {
        for step in steps {
            debug!(step = step.label(), "step");
            match step {
                Step::Spawn { bed, max_attempts } => {
                    self.spawn(ctx, &expand_bed(bed, &self.name), *max_attempts)?;
                }
                Step::TurnTo { viewpoint } => {
                    ctx.navigator.travel_to(viewpoint, ctx.movement)?;
                }
                Step::Turn { axis, degrees } => ctx.movement.turn(*axis, *degrees)?,
                Step::Press { key } => ctx.movement.press(key)?,
                Step::Walk { direction, secs } => {
                    ctx.movement.walk(*direction, secs_to_duration(*secs))?;
                }
                Step::Wait { secs } => ctx.movement.wait(secs_to_duration(*secs))?,
                Step::Read {
                    resources,
                    optional,
                    assume,
                } => {
                    match ctx
                        .verifier
                        .read_resources(resources, ctx.vision, ctx.movement)
                    {
                        Ok(reading) => self.absorb(reading, since_last, gains),
                        Err(PerceptionError::Exhausted { attempts, .. })
                            if assume.is_some() || *optional =>
                        {
                            if let Some(assume) = assume {
                                warn!(attempts, ?assume, "sensing exhausted, assuming amounts");
                                for (resource, amount) in assume {
                                    gains.add(resource, *amount);
                                    gains.substituted(resource);
                                }
                            } else {
                                warn!(attempts, ?resources, "sensing exhausted, skipping optional read");
                            }
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Step::Approach {
                    template,
                    max_steps,
                    step_secs,
                } => self.approach(ctx, template, *max_steps, secs_to_duration(*step_secs))?,
                Step::Enter {
                    key,
                    template,
                    max_attempts,
                } => self.enter(ctx, key, template, *max_attempts)?,
                Step::Refill { steps } => {
                    if refill {
                        self.run_steps(steps, ctx, refill, since_last, gains)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn spawn(
        &self,
        ctx: &mut StationContext<'_>,
        bed: &str,
        max_attempts: u32,
    ) -> Result<(), StationError> {
        for attempt in 1..=max_attempts {
            if ctx.movement.spawn_at(bed)? {
                debug!(bed, attempt, "spawned");
                return Ok(());
            }
            warn!(bed, attempt, "bed not found");
        }
        Err(StationError::NotFound {
            target: bed.to_string(),
            detail: format!("bed not found after {max_attempts} attempts"),
        })
    }

    fn approach(
        &self,
        ctx: &mut StationContext<'_>,
        template: &str,
        max_steps: u32,
        step: Duration,
    ) -> Result<(), StationError> {
        let viewport = ctx.verifier.config().viewport;
        for walked in 0..=max_steps {
            let frame = ctx.vision.capture(viewport)?;
            if ctx.vision.locate(template, &frame)?.is_some() {
                debug!(template, walked, "target in view");
                return Ok(());
            }
            if walked < max_steps {
                ctx.movement.walk(WalkDirection::Forward, step)?;
            }
        }
        Err(StationError::NotFound {
            target: template.to_string(),
            detail: format!("not visible after walking {max_steps} steps"),
        })
    }

    fn enter(
        &self,
        ctx: &mut StationContext<'_>,
        key: &str,
        template: &str,
        max_attempts: u32,
    ) -> Result<(), StationError> {
        let viewport = ctx.verifier.config().viewport;
        for attempt in 1..=max_attempts {
            ctx.movement.press(key)?;
            let frame = ctx.vision.capture(viewport)?;
            if ctx.vision.locate(template, &frame)?.is_some() {
                debug!(template, attempt, "interaction confirmed");
                return Ok(());
            }
        }
        Err(StationError::NotFound {
            target: template.to_string(),
            detail: format!("'{key}' not confirmed after {max_attempts} attempts"),
        })
    }

    fn absorb(&self, reading: Reading, since_last: Duration, gains: &mut Gains) {
        for (resource, raw) in reading {
            let amount = match self.bounded.get(&resource) {
                Some(bounded) => {
                    let verdict = bound(&bounded.model, &bounded.cfg, raw, since_last);
                    if verdict.is_substituted() {
                        warn!(%resource, ?verdict, "implausible reading replaced");
                        gains.substituted(&resource);
                    }
                    gains.samples.push((resource.clone(), verdict.value()));
                    verdict.value()
                }
                None => raw,
            };
            gains.add(&resource, amount);
        }
    }
}

impl Station for ChoreStation {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.clock.is_due(now) && self.gate.as_ref().is_none_or(Gate::is_open)
    }

    fn complete(&mut self, ctx: &mut StationContext<'_>) -> Result<RunStatistics, StationError> {
        self.run(ctx, false)
    }

    fn totals(&self) -> StationTotals {
        self.totals.clone()
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::health::Health;
    use crate::core::ring::Axis;
    use crate::test_support::{Harness, MovementOp, Scene, at};

    fn station(steps: Vec<Step>) -> ChoreStation {
        ChoreStation::new(
            "crystal",
            ReadinessClock::started_at(Duration::from_secs(600), at(0)),
            Rc::from(steps),
        )
    }

    fn read(resources: &[&str]) -> Step {
        Step::Read {
            resources: resources.iter().map(|name| name.to_string()).collect(),
            optional: false,
            assume: None,
        }
    }

    #[test]
    fn ready_after_interval_and_gate() {
        let counter = Counter::new("ytraps");
        let station = station(vec![]).with_gate(Gate::new(counter.reader(), 2_000));
        assert!(!station.is_ready(at(600)));
        counter.add(2_000);
        assert!(!station.is_ready(at(599)));
        assert!(station.is_ready(at(600)));
    }

    #[test]
    fn runs_script_and_publishes() {
        let counter = Counter::new("dust_made");
        let reader = counter.reader();
        let mut station = station(vec![
            Step::Spawn {
                bed: "{station}".to_string(),
                max_attempts: 2,
            },
            Step::TurnTo {
                viewpoint: "Vault".to_string(),
            },
            Step::Press {
                key: "f".to_string(),
            },
            read(&["dust"]),
        ])
        .with_publisher(Publisher {
            resource: "dust".to_string(),
            counter,
        });

        let mut harness = Harness::new(vec![Scene::new().with("dust", "4200")]);
        harness.clock.set(at(700));
        let stats = station.complete(&mut harness.ctx()).expect("complete");

        assert_eq!(stats.resources_gained["dust"], 4_200);
        assert!(!stats.is_special_lap);
        assert_eq!(reader.get(), 4_200);
        assert_eq!(harness.navigator.current(), "Vault");
        assert_eq!(
            harness.movement.ops(),
            &[
                MovementOp::Spawn("crystal".to_string()),
                MovementOp::Turn(Axis::X, -145),
                MovementOp::Press("f".to_string()),
            ]
        );
        assert_eq!(station.totals().total_completions, 1);
        assert_eq!(station.readiness().last_completed(), Some(at(700)));
    }

    #[test]
    fn failure_still_marks_completion() {
        let mut station = station(vec![read(&["dust"])]);
        let mut harness = Harness::new(vec![Scene::new()]);
        harness.clock.set(at(900));
        let err = station.complete(&mut harness.ctx()).unwrap_err();
        assert!(matches!(err, StationError::SensingExhausted { attempts: 10, .. }));
        assert_eq!(station.readiness().last_completed(), Some(at(900)));
        assert!(!station.is_ready(at(901)));
        assert_eq!(station.totals().total_completions, 0);
    }

    #[test]
    fn missing_bed_is_not_found_after_bounded_retries() {
        let mut station = station(vec![Step::Spawn {
            bed: "{station}".to_string(),
            max_attempts: 3,
        }]);
        let mut harness = Harness::new(vec![Scene::new()]);
        harness.movement.missing_bed("crystal");
        let err = station.complete(&mut harness.ctx()).unwrap_err();
        match err {
            StationError::NotFound { target, .. } => assert_eq!(target, "crystal"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(harness.movement.ops().len(), 3);
    }

    #[test]
    fn implausible_reading_is_substituted_and_recorded() {
        // 5/s over the 600s interval puts the first expectation at 3000.
        let cfg = PlausibilityConfig {
            nominal_rate_per_sec: 5,
            ..PlausibilityConfig::default()
        };
        let mut station = station(vec![read(&["dust"])]).with_plausibility("dust", cfg);
        let mut harness = Harness::new(vec![
            Scene::new().with("dust", "3000"),
            Scene::new().with("dust", "3000"),
            Scene::new().with("dust", "50000"),
        ]);

        for _ in 0..2 {
            station.complete(&mut harness.ctx()).expect("complete");
        }
        let stats = station.complete(&mut harness.ctx()).expect("complete");
        assert_eq!(stats.resources_gained["dust"], 3_000);
        assert_eq!(stats.substitutions, vec!["dust".to_string()]);
        let model = station.model("dust").expect("model");
        assert_eq!(model.total_samples, 3);
        assert_eq!(model.total_made, 9_000);
    }

    #[test]
    fn failed_run_leaves_models_untouched() {
        let counter = Counter::new("dust_made");
        let reader = counter.reader();
        let mut station = station(vec![
            read(&["dust"]),
            Step::Enter {
                key: "e".to_string(),
                template: "vault".to_string(),
                max_attempts: 1,
            },
        ])
        .with_plausibility("dust", PlausibilityConfig::default())
        .with_publisher(Publisher {
            resource: "dust".to_string(),
            counter,
        });
        let mut harness = Harness::new(vec![Scene::new().with("dust", "4000")]);

        let err = station.complete(&mut harness.ctx()).unwrap_err();
        assert!(matches!(err, StationError::NotFound { .. }));
        assert_eq!(station.model("dust"), Some(&PlausibilityModel::default()));
        assert_eq!(station.totals(), StationTotals::default());
        assert_eq!(reader.get(), 0);
    }

    #[test]
    fn repeated_huge_readings_saturate() {
        let mut station = station(vec![read(&["dust"]), read(&["dust"])]);
        let mut harness = Harness::new(vec![Scene::new().with("dust", &u64::MAX.to_string())]);
        let stats = station.complete(&mut harness.ctx()).expect("complete");
        assert_eq!(stats.resources_gained["dust"], u64::MAX);
        station.complete(&mut harness.ctx()).expect("complete");
        assert_eq!(station.totals().resources["dust"], u64::MAX);
    }

    #[test]
    fn run_is_judged_against_expectation() {
        let expectation = Expectation {
            max_secs: Some(100),
            min_yield: BTreeMap::from([("dust".to_string(), 1_000)]),
            ..Expectation::default()
        };
        let mut station = station(vec![read(&["dust"])]).with_expectation(expectation);
        let mut harness = Harness::new(vec![
            Scene::new().with("dust", "4000"),
            Scene::new().with("dust", "200"),
        ]);

        let stats = station.complete(&mut harness.ctx()).expect("complete");
        assert_eq!(stats.health, Health::Nominal);

        let stats = station.complete(&mut harness.ctx()).expect("complete");
        assert_eq!(
            stats.health,
            Health::Degraded {
                issues: vec!["dust yield 200 is below 1000".to_string()]
            }
        );
    }

    #[test]
    fn restart_rearms_gate_and_interval() {
        let counter = Counter::new("vault_full");
        let mut station = station(vec![]).with_gate(Gate::new(counter.reader(), 1));
        counter.add(1);
        assert!(station.is_ready(at(600)));
        station.restart_at(at(600));
        assert!(!station.is_ready(at(1_200)), "gate needs fresh growth");
        counter.add(1);
        assert!(!station.is_ready(at(1_199)));
        assert!(station.is_ready(at(1_200)));
    }

    #[test]
    fn optional_read_degrades_gracefully() {
        let mut station = station(vec![
            Step::Read {
                resources: vec!["pearls".to_string()],
                optional: true,
                assume: None,
            },
            Step::Press {
                key: "e".to_string(),
            },
        ]);
        let mut harness = Harness::new(vec![Scene::new()]);
        let stats = station.complete(&mut harness.ctx()).expect("complete");
        assert!(stats.resources_gained.is_empty());
        assert_eq!(harness.movement.ops().last(), Some(&MovementOp::Press("e".to_string())));
    }

    #[test]
    fn assumed_amounts_fill_in_after_exhaustion() {
        let mut station = station(vec![Step::Read {
            resources: vec!["paste".to_string()],
            optional: false,
            assume: Some(BTreeMap::from([("paste".to_string(), 2_600)])),
        }]);
        let mut harness = Harness::new(vec![Scene::new()]);
        let stats = station.complete(&mut harness.ctx()).expect("complete");
        assert_eq!(stats.resources_gained["paste"], 2_600);
        assert_eq!(stats.substitutions, vec!["paste".to_string()]);
    }

    #[test]
    fn approach_walks_until_template_visible() {
        let mut station = station(vec![Step::Approach {
            template: "dedi".to_string(),
            max_steps: 5,
            step_secs: 0.2,
        }]);
        let mut harness = Harness::new(vec![
            Scene::new(),
            Scene::new(),
            Scene::new().shows("dedi"),
        ]);
        station.complete(&mut harness.ctx()).expect("complete");
        let walks = harness
            .movement
            .ops()
            .iter()
            .filter(|op| matches!(op, MovementOp::Walk(WalkDirection::Forward, _)))
            .count();
        assert_eq!(walks, 2);
    }

    #[test]
    fn enter_gives_up_as_not_found() {
        let mut station = station(vec![Step::Enter {
            key: "e".to_string(),
            template: "inventory".to_string(),
            max_attempts: 3,
        }]);
        let mut harness = Harness::new(vec![Scene::new()]);
        let err = station.complete(&mut harness.ctx()).unwrap_err();
        assert!(matches!(err, StationError::NotFound { .. }));
        assert_eq!(harness.vision.captures(), 3);
    }

    #[test]
    fn refill_steps_only_run_on_refill_laps() {
        let mut station = station(vec![Step::Refill {
            steps: vec![Step::Press {
                key: "t".to_string(),
            }],
        }]);
        let mut harness = Harness::new(vec![Scene::new()]);
        station.run(&mut harness.ctx(), false).expect("plain lap");
        assert!(harness.movement.ops().is_empty());
        let stats = station.run(&mut harness.ctx(), true).expect("refill lap");
        assert!(stats.is_special_lap);
        assert_eq!(harness.movement.ops(), &[MovementOp::Press("t".to_string())]);
    }

    #[test]
    fn termination_is_classified() {
        let mut station = station(vec![Step::Press {
            key: "e".to_string(),
        }]);
        let mut harness = Harness::new(vec![Scene::new()]);
        harness.movement.terminate_after(0);
        let err = station.complete(&mut harness.ctx()).unwrap_err();
        assert!(matches!(err, StationError::Terminated));
    }
}
