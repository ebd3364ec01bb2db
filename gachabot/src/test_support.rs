//! Scripted collaborators for tests.
//!
//! Everything here is deterministic: movements are recorded instead of
//! performed, vision replays a list of scripted scenes and the clock only
//! moves when told to.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};

use crate::core::chore::WalkDirection;
use crate::core::health::Health;
use crate::core::ring::{Axis, Turn, Waypoint, WaypointRing};
use crate::core::types::{Report, RunStatistics, StationTotals};
use crate::io::clock::Clock;
use crate::io::config::PerceptionConfig;
use crate::io::movement::{ControlError, Movement, Reconnect};
use crate::io::notify::Notifier;
use crate::io::vision::{Frame, Region, Vision};
use crate::navigator::Navigator;
use crate::perception::PerceptionVerifier;
use crate::scheduler::TickContext;
use crate::station::{Station, StationContext, StationError};

/// Fixed instant `secs` seconds after an arbitrary epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("timestamp")
}

/// The three-viewpoint ring used across tests: Home, Grinder, Vault.
pub fn tower_ring() -> WaypointRing {
    WaypointRing::new(vec![
        Waypoint::new("Home", vec![Turn::new(Axis::X, 145)]),
        Waypoint::new("Grinder", vec![Turn::new(Axis::X, -50)]),
        Waypoint::new("Vault", vec![Turn::new(Axis::X, -95)]),
    ])
    .expect("tower ring")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovementOp {
    Turn(Axis, i32),
    Walk(WalkDirection, Duration),
    Press(String),
    Wait(Duration),
    Spawn(String),
}

/// Records issued primitives. Failed primitives are not recorded, except
/// spawns at a missing bed, which were issued but found nothing.
#[derive(Debug, Default)]
pub struct ScriptedMovement {
    ops: Vec<MovementOp>,
    turns: usize,
    fail_turns_after: Option<usize>,
    terminate_after: Option<usize>,
    missing_beds: BTreeSet<String>,
}

impl ScriptedMovement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[MovementOp] {
        &self.ops
    }

    /// Turns fail with a non-terminal error once `n` turns succeeded.
    pub fn fail_turns_after(&mut self, n: usize) {
        self.fail_turns_after = Some(n);
    }

    /// Every primitive returns `Terminated` once `n` primitives were recorded.
    pub fn terminate_after(&mut self, n: usize) {
        self.terminate_after = Some(n);
    }

    pub fn missing_bed(&mut self, bed: &str) {
        self.missing_beds.insert(bed.to_string());
    }

    fn issue(&mut self, op: MovementOp) -> Result<(), ControlError> {
        if self
            .terminate_after
            .is_some_and(|limit| self.ops.len() >= limit)
        {
            return Err(ControlError::Terminated);
        }
        self.ops.push(op);
        Ok(())
    }
}

impl Movement for ScriptedMovement {
    fn turn(&mut self, axis: Axis, degrees: i32) -> Result<(), ControlError> {
        if self
            .fail_turns_after
            .is_some_and(|limit| self.turns >= limit)
        {
            return Err(ControlError::Other(anyhow!("turn rejected")));
        }
        self.issue(MovementOp::Turn(axis, degrees))?;
        self.turns += 1;
        Ok(())
    }

    fn walk(&mut self, direction: WalkDirection, duration: Duration) -> Result<(), ControlError> {
        self.issue(MovementOp::Walk(direction, duration))
    }

    fn press(&mut self, key: &str) -> Result<(), ControlError> {
        self.issue(MovementOp::Press(key.to_string()))
    }

    fn wait(&mut self, duration: Duration) -> Result<(), ControlError> {
        self.issue(MovementOp::Wait(duration))
    }

    fn spawn_at(&mut self, bed: &str) -> Result<bool, ControlError> {
        self.issue(MovementOp::Spawn(bed.to_string()))?;
        Ok(!self.missing_beds.contains(bed))
    }
}

/// What one capture shows: visible templates and the text inside them.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    visible: BTreeSet<String>,
    texts: BTreeMap<String, String>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// `template` is visible and reads as `text`.
    pub fn with(mut self, template: &str, text: &str) -> Self {
        self.visible.insert(template.to_string());
        self.texts.insert(template.to_string(), text.to_string());
        self
    }

    /// `template` is visible (no text).
    pub fn shows(mut self, template: &str) -> Self {
        self.visible.insert(template.to_string());
        self
    }
}

/// Replays scenes: each successful capture shows the next scene, and the
/// last scene repeats forever.
#[derive(Debug)]
pub struct ScriptedVision {
    scenes: Vec<Scene>,
    next_scene: usize,
    captures: usize,
    failing_captures: usize,
    next_frame: u64,
    /// Frame id to the scene it shows.
    frames: HashMap<u64, usize>,
    /// Cropped frame id to (scene, template).
    crops: HashMap<u64, (usize, String)>,
    regions: Vec<(String, Region)>,
    last: Option<Frame>,
}

impl ScriptedVision {
    pub fn new(scenes: Vec<Scene>) -> Self {
        let scenes = if scenes.is_empty() {
            vec![Scene::new()]
        } else {
            scenes
        };
        Self {
            scenes,
            next_scene: 0,
            captures: 0,
            failing_captures: 0,
            next_frame: 1,
            frames: HashMap::new(),
            crops: HashMap::new(),
            regions: Vec::new(),
            last: None,
        }
    }

    /// Capture calls so far, failed ones included.
    pub fn captures(&self) -> usize {
        self.captures
    }

    /// The next `n` captures fail without consuming a scene.
    pub fn fail_captures(&mut self, n: usize) {
        self.failing_captures = n;
    }

    fn region_for(&mut self, template: &str) -> Region {
        if let Some((_, region)) = self.regions.iter().find(|(name, _)| name == template) {
            return *region;
        }
        let row = u32::try_from(self.regions.len()).unwrap_or(u32::MAX);
        let region = Region::new(0, row.saturating_mul(40), 200, 40);
        self.regions.push((template.to_string(), region));
        region
    }

    fn frame_id(&mut self) -> u64 {
        let id = self.next_frame;
        self.next_frame += 1;
        id
    }
}

impl Vision for ScriptedVision {
    fn capture(&mut self, region: Region) -> Result<Frame, ControlError> {
        self.captures += 1;
        if self.failing_captures > 0 {
            self.failing_captures -= 1;
            return Err(ControlError::Other(anyhow!("capture failed")));
        }
        let scene = self.next_scene.min(self.scenes.len() - 1);
        self.next_scene += 1;
        let id = self.frame_id();
        self.frames.insert(id, scene);
        let frame = Frame {
            id,
            region,
            path: None,
        };
        self.last = Some(frame.clone());
        Ok(frame)
    }

    fn locate(&mut self, template: &str, frame: &Frame) -> Result<Option<Region>, ControlError> {
        let scene = self
            .frames
            .get(&frame.id)
            .copied()
            .ok_or_else(|| ControlError::Other(anyhow!("unknown frame {}", frame.id)))?;
        if self.scenes[scene].visible.contains(template) {
            Ok(Some(self.region_for(template)))
        } else {
            Ok(None)
        }
    }

    fn crop(&mut self, frame: &Frame, region: Region) -> Result<Frame, ControlError> {
        let scene = self
            .frames
            .get(&frame.id)
            .copied()
            .ok_or_else(|| ControlError::Other(anyhow!("unknown frame {}", frame.id)))?;
        let template = self
            .regions
            .iter()
            .find(|(_, candidate)| *candidate == region)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| ControlError::Other(anyhow!("nothing located at {region:?}")))?;
        let id = self.frame_id();
        self.crops.insert(id, (scene, template));
        Ok(Frame {
            id,
            region,
            path: None,
        })
    }

    fn recognize_text(&mut self, frame: &Frame, _charset: &str) -> Result<String, ControlError> {
        let (scene, template) = self
            .crops
            .get(&frame.id)
            .ok_or_else(|| ControlError::Other(anyhow!("frame {} is not a crop", frame.id)))?;
        Ok(self.scenes[*scene]
            .texts
            .get(template)
            .cloned()
            .unwrap_or_default())
    }

    fn last_capture(&self) -> Option<Frame> {
        self.last.clone()
    }
}

/// Clock that only moves when set, advanced, or slept on.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
    slept: Cell<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Cell::new(at(0)),
            slept: Cell::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).expect("duration in range");
        self.now.set(self.now.get() + by);
    }

    /// Total time spent in `sleep`.
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
        self.advance(duration);
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: RefCell<Vec<Report>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, report: Report) {
        self.reports.borrow_mut().push(report);
    }
}

#[derive(Debug, Default)]
pub struct ScriptedSession {
    reconnects: usize,
    fail: bool,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects
    }

    /// Every reconnect attempt fails.
    pub fn fail_reconnects(&mut self) {
        self.fail = true;
    }
}

impl Reconnect for ScriptedSession {
    fn reconnect(&mut self) -> Result<(), ControlError> {
        self.reconnects += 1;
        if self.fail {
            return Err(ControlError::Other(anyhow!("session unavailable")));
        }
        Ok(())
    }
}

/// Result a [`ScriptedStation`] produces on its next completion.
#[derive(Debug, Clone)]
pub enum Outcome {
    Complete,
    NotFound,
    Exhausted,
    Terminated,
    Fail(String),
}

/// Station with externally controlled readiness and scripted outcomes.
///
/// Completions beyond the script succeed.
#[derive(Debug)]
pub struct ScriptedStation {
    name: String,
    ready: Rc<Cell<bool>>,
    runs: Rc<Cell<u32>>,
    outcomes: VecDeque<Outcome>,
    totals: StationTotals,
}

impl ScriptedStation {
    pub fn new(name: &str, ready: bool) -> Self {
        Self {
            name: name.to_string(),
            ready: Rc::new(Cell::new(ready)),
            runs: Rc::new(Cell::new(0)),
            outcomes: VecDeque::new(),
            totals: StationTotals::default(),
        }
    }

    pub fn then(mut self, outcome: Outcome) -> Self {
        self.outcomes.push_back(outcome);
        self
    }

    /// Handle to flip readiness after the station moved into a roster.
    pub fn ready_handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.ready)
    }

    /// Handle to the completion count.
    pub fn runs_handle(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.runs)
    }
}

impl Station for ScriptedStation {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self, _now: DateTime<Utc>) -> bool {
        self.ready.get()
    }

    fn complete(&mut self, ctx: &mut StationContext<'_>) -> Result<RunStatistics, StationError> {
        self.runs.set(self.runs.get() + 1);
        match self.outcomes.pop_front().unwrap_or(Outcome::Complete) {
            Outcome::Complete => {
                let stats = RunStatistics {
                    station: self.name.clone(),
                    phase: None,
                    time_taken: Duration::ZERO,
                    resources_gained: BTreeMap::new(),
                    is_special_lap: false,
                    finished_at: ctx.clock.now(),
                    substitutions: Vec::new(),
                    health: Health::Nominal,
                };
                self.totals.absorb(&stats);
                Ok(stats)
            }
            Outcome::NotFound => Err(StationError::NotFound {
                target: format!("{} bed", self.name),
                detail: "bed not found after 3 attempts".to_string(),
            }),
            Outcome::Exhausted => Err(StationError::SensingExhausted {
                attempts: 10,
                resources: vec!["dust".to_string()],
            }),
            Outcome::Terminated => Err(StationError::Terminated),
            Outcome::Fail(message) => Err(StationError::Other(anyhow!(message))),
        }
    }

    fn totals(&self) -> StationTotals {
        self.totals.clone()
    }
}

/// All collaborators of one tick, wired to the tower ring at `Home`.
pub struct Harness {
    pub navigator: Navigator,
    pub movement: ScriptedMovement,
    pub vision: ScriptedVision,
    pub verifier: PerceptionVerifier,
    pub clock: ManualClock,
    pub session: ScriptedSession,
    pub notifier: RecordingNotifier,
}

impl Harness {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self::with_perception(scenes, PerceptionConfig::default())
    }

    pub fn with_perception(scenes: Vec<Scene>, cfg: PerceptionConfig) -> Self {
        Self {
            navigator: Navigator::new(tower_ring(), "Home").expect("home on ring"),
            movement: ScriptedMovement::new(),
            vision: ScriptedVision::new(scenes),
            verifier: PerceptionVerifier::new(cfg),
            clock: ManualClock::new(),
            session: ScriptedSession::new(),
            notifier: RecordingNotifier::new(),
        }
    }

    pub fn ctx(&mut self) -> StationContext<'_> {
        StationContext {
            navigator: &mut self.navigator,
            movement: &mut self.movement,
            vision: &mut self.vision,
            verifier: &self.verifier,
            clock: &self.clock,
        }
    }

    pub fn tick_ctx(&mut self) -> TickContext<'_> {
        TickContext {
            station: StationContext {
                navigator: &mut self.navigator,
                movement: &mut self.movement,
                vision: &mut self.vision,
                verifier: &self.verifier,
                clock: &self.clock,
            },
            session: &mut self.session,
            notifier: &self.notifier,
        }
    }
}
