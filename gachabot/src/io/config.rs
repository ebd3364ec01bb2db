//! Bot configuration stored under `.gachabot/config.toml`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::core::chore::{Step, WalkDirection, resources_read, validate_script};
use crate::core::health::Expectation;
use crate::core::plausibility::PlausibilityConfig;
use crate::core::ring::{Axis, Turn, Waypoint, WaypointRing};
use crate::io::vision::Region;

pub const DEFAULT_CONFIG_PATH: &str = ".gachabot/config.toml";

/// Bot configuration (TOML).
///
/// Read once at startup; the loop never writes it back. Missing fields
/// default to the sample tower below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    /// Viewpoint the navigator assumes at startup.
    pub home: String,

    /// Seconds to sleep when no station is ready.
    pub idle_secs: u64,

    /// Optional file whose presence requests a graceful shutdown.
    pub stop_file: Option<String>,

    /// Optional file whose presence pauses the loop until it is removed.
    pub pause_file: Option<String>,

    pub perception: PerceptionConfig,
    pub recovery: RecoveryConfig,
    pub notify: NotifyConfig,

    /// Waypoints in ring order; each lists the turns that reach it from its predecessor.
    pub ring: Vec<Waypoint>,

    /// Stations and groups in priority order.
    pub roster: Vec<RosterEntryConfig>,
}

/// Perception verifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Attempts before sensing is declared exhausted.
    pub max_attempts: u32,

    /// Screen region captured on each attempt.
    pub viewport: Region,

    /// Characters the recognizer may emit (digits plus known misreads).
    pub charset: String,

    /// Single-character substitutions applied before parsing.
    pub misreads: BTreeMap<String, String>,

    pub probe: ProbeConfig,

    /// Static per-resource bounds; a value outside invalidates the attempt.
    pub valid_ranges: BTreeMap<String, ValidRange>,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        let misreads = [("l", "1"), ("i", "1"), ("I", "1"), ("|", "1"), ("O", "0")]
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        Self {
            max_attempts: 10,
            viewport: Region::new(0, 0, 1920, 1080),
            charset: "0123456789liI|O".to_string(),
            misreads,
            probe: ProbeConfig::default(),
            valid_ranges: BTreeMap::new(),
        }
    }
}

/// Corrective nudge issued between failed perception attempts.
///
/// Even attempts walk `direction`, odd attempts walk the opposite way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    pub direction: WalkDirection,
    pub secs: f64,
    /// Pause after the nudge before capturing again.
    pub settle_secs: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            direction: WalkDirection::Backward,
            secs: 0.1,
            settle_secs: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidRange {
    pub min: u64,
    pub max: u64,
}

impl ValidRange {
    pub fn contains(&self, value: u64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Recovery handler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Template that is only visible while the avatar is controllable.
    pub controllable_template: String,

    /// Input that is always safe to repeat (closes menus, cancels actions).
    pub safe_key: String,

    /// Pause after each corrective action before checking control.
    pub settle_secs: f64,

    /// Allow the last-resort reconnect of the control channel.
    pub allow_reconnect: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            controllable_template: "hud".to_string(),
            safe_key: "escape".to_string(),
            settle_secs: 2.0,
            allow_reconnect: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Write rendered reports to the tracing log.
    Log,
    /// Pipe each report as JSON into a command.
    Command,
}

/// Notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    pub sink: SinkKind,

    /// Command for the `command` sink (e.g. `["./post-webhook.sh"]`).
    pub command: Vec<String>,

    pub timeout_secs: u64,

    /// Also report successful completions, not just failures.
    pub completions: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            command: Vec::new(),
            timeout_secs: 30,
            completions: true,
        }
    }
}

/// One roster slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RosterEntryConfig {
    Station(StationConfig),
    Group(GroupConfig),
    Phased(PhasedConfig),
}

/// One step script of a roster entry, with the settings that bound its reads.
struct Script<'a> {
    label: String,
    steps: &'a [Step],
    plausibility: &'a BTreeMap<String, PlausibilityConfig>,
}

impl RosterEntryConfig {
    pub fn name(&self) -> &str {
        match self {
            RosterEntryConfig::Station(station) => &station.name,
            RosterEntryConfig::Group(group) => &group.prefix,
            RosterEntryConfig::Phased(phased) => &phased.name,
        }
    }

    pub fn publishes(&self) -> &[PublishConfig] {
        match self {
            RosterEntryConfig::Station(station) => &station.publishes,
            RosterEntryConfig::Group(group) => &group.publishes,
            RosterEntryConfig::Phased(phased) => &phased.publishes,
        }
    }

    fn scripts(&self) -> Vec<Script<'_>> {
        let name = self.name();
        match self {
            RosterEntryConfig::Station(station) => vec![Script {
                label: format!("'{name}'"),
                steps: &station.steps,
                plausibility: &station.plausibility,
            }],
            RosterEntryConfig::Group(group) => vec![Script {
                label: format!("'{name}'"),
                steps: &group.steps,
                plausibility: &group.plausibility,
            }],
            RosterEntryConfig::Phased(phased) => phased
                .phases
                .iter()
                .map(|phase| Script {
                    label: format!("'{name}' phase '{}'", phase.name),
                    steps: &phase.steps,
                    plausibility: &phase.plausibility,
                })
                .collect(),
        }
    }

    fn gates(&self) -> Vec<&GateConfig> {
        match self {
            RosterEntryConfig::Station(station) => station.gate.iter().collect(),
            RosterEntryConfig::Group(_) => Vec::new(),
            RosterEntryConfig::Phased(phased) => phased
                .phases
                .iter()
                .filter_map(|phase| phase.gate.as_ref())
                .collect(),
        }
    }
}

/// A single recurring station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    pub name: String,
    pub interval_secs: u64,
    /// Treat the station as never completed at startup.
    pub ready_at_start: bool,
    pub gate: Option<GateConfig>,
    pub publishes: Vec<PublishConfig>,
    /// Per-resource plausibility bounding; resources not listed are not bounded.
    pub plausibility: BTreeMap<String, PlausibilityConfig>,
    /// Health checks applied to every completed run.
    pub expect: Expectation,
    pub steps: Vec<Step>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            interval_secs: 60 * 60,
            ready_at_start: false,
            gate: None,
            publishes: Vec::new(),
            plausibility: BTreeMap::new(),
            expect: Expectation::default(),
            steps: Vec::new(),
        }
    }
}

/// A round-robin group of identical stations named `<prefix><NN>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroupConfig {
    pub prefix: String,
    pub count: u32,
    /// Minimum time between refill laps; `None` disables refill laps.
    pub refill_interval_secs: Option<u64>,
    pub publishes: Vec<PublishConfig>,
    pub plausibility: BTreeMap<String, PlausibilityConfig>,
    pub expect: Expectation,
    pub steps: Vec<Step>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            count: 1,
            refill_interval_secs: None,
            publishes: Vec::new(),
            plausibility: BTreeMap::new(),
            expect: Expectation::default(),
            steps: Vec::new(),
        }
    }
}

impl GroupConfig {
    pub fn member_name(&self, idx: u32) -> String {
        format!("{}{:02}", self.prefix, idx)
    }

    pub fn member_names(&self) -> Vec<String> {
        (0..self.count).map(|idx| self.member_name(idx)).collect()
    }
}

/// A station that cycles through phases, one per successful completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhasedConfig {
    pub name: String,
    /// The first phase starts due instead of waiting one interval.
    pub ready_at_start: bool,
    pub publishes: Vec<PublishConfig>,
    pub phases: Vec<PhaseConfig>,
}

/// One phase: its own interval, gate and script.
///
/// The interval counts from when the phase was entered. A gate counts growth
/// of its counter since the phase was entered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhaseConfig {
    pub name: String,
    pub interval_secs: u64,
    pub gate: Option<GateConfig>,
    pub plausibility: BTreeMap<String, PlausibilityConfig>,
    pub expect: Expectation,
    pub steps: Vec<Step>,
}

/// Readiness precondition on another entry's published counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateConfig {
    pub counter: String,
    pub threshold: u64,
}

/// Publish the running total of `resource` under `counter`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishConfig {
    pub counter: String,
    pub resource: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        sample_tower()
    }
}

impl BotConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn build_ring(&self) -> Result<WaypointRing> {
        WaypointRing::new(self.ring.clone()).context("invalid ring")
    }

    pub fn validate(&self) -> Result<()> {
        let ring = self.build_ring()?;
        let mut errors = Vec::new();

        if !ring.contains(&self.home) {
            errors.push(format!("home viewpoint '{}' is not on the ring", self.home));
        }
        if self.idle_secs == 0 {
            errors.push("idle_secs must be > 0".to_string());
        }
        self.validate_perception(&mut errors);
        if self.recovery.controllable_template.trim().is_empty() {
            errors.push("recovery.controllable_template must not be empty".to_string());
        }
        if !self.recovery.settle_secs.is_finite() || self.recovery.settle_secs < 0.0 {
            errors.push("recovery.settle_secs must be a finite, non-negative number".to_string());
        }
        if self.notify.sink == SinkKind::Command
            && self
                .notify
                .command
                .first()
                .is_none_or(|program| program.trim().is_empty())
        {
            errors.push("notify.command must be a non-empty array for the command sink".to_string());
        }
        if self.notify.timeout_secs == 0 {
            errors.push("notify.timeout_secs must be > 0".to_string());
        }
        self.validate_roster(&ring, &mut errors);

        if !errors.is_empty() {
            bail!("config violations:\n- {}", errors.join("\n- "));
        }
        Ok(())
    }

    fn validate_perception(&self, errors: &mut Vec<String>) {
        let perception = &self.perception;
        if perception.max_attempts == 0 {
            errors.push("perception.max_attempts must be > 0".to_string());
        }
        if perception.viewport.is_empty() {
            errors.push("perception.viewport must have a non-zero size".to_string());
        }
        for (from, to) in &perception.misreads {
            if from.chars().count() != 1 || to.chars().count() != 1 {
                errors.push(format!(
                    "perception.misreads '{from}' -> '{to}' must map one character to one character"
                ));
            }
        }
        for (resource, range) in &perception.valid_ranges {
            if range.min > range.max {
                errors.push(format!(
                    "perception.valid_ranges.{resource}: min {} exceeds max {}",
                    range.min, range.max
                ));
            }
        }
        let probe = &perception.probe;
        for secs in [probe.secs, probe.settle_secs] {
            if !secs.is_finite() || secs < 0.0 {
                errors.push("perception.probe durations must be finite and non-negative".to_string());
                break;
            }
        }
    }

    fn validate_roster(&self, ring: &WaypointRing, errors: &mut Vec<String>) {
        if self.roster.is_empty() {
            errors.push("roster must contain at least one station".to_string());
        }

        let mut names = HashSet::new();
        let mut publishers: HashMap<&str, usize> = HashMap::new();
        for (idx, entry) in self.roster.iter().enumerate() {
            let name = entry.name();
            if name.trim().is_empty() {
                errors.push(format!("roster[{idx}]: name must not be empty"));
            }
            let mut entry_names = vec![name.to_string()];
            if let RosterEntryConfig::Group(group) = entry {
                if group.count == 0 {
                    errors.push(format!("group '{name}': count must be > 0"));
                }
                if group.refill_interval_secs == Some(0) {
                    errors.push(format!("group '{name}': refill_interval_secs must be > 0"));
                }
                entry_names.extend(group.member_names());
            }
            for entry_name in entry_names {
                if !names.insert(entry_name.clone()) {
                    errors.push(format!("duplicate station name '{entry_name}'"));
                }
            }

            if let RosterEntryConfig::Phased(phased) = entry {
                if phased.phases.is_empty() {
                    errors.push(format!("'{name}': phases must not be empty"));
                }
                let mut phase_names = HashSet::new();
                for phase in &phased.phases {
                    if phase.name.trim().is_empty() {
                        errors.push(format!("'{name}': phase name must not be empty"));
                    } else if !phase_names.insert(phase.name.as_str()) {
                        errors.push(format!("'{name}': duplicate phase '{}'", phase.name));
                    }
                }
            }

            let mut read = HashSet::new();
            for script in entry.scripts() {
                if script.steps.is_empty() {
                    errors.push(format!("{}: steps must not be empty", script.label));
                }
                for err in validate_script(script.steps, ring) {
                    errors.push(format!("{} {err}", script.label));
                }
                let script_reads = resources_read(script.steps);
                for resource in script.plausibility.keys() {
                    if !script_reads.contains(resource) {
                        errors.push(format!(
                            "{}: plausibility for '{resource}' but no step reads it",
                            script.label
                        ));
                    }
                }
                read.extend(script_reads);
            }
            for publish in entry.publishes() {
                if !read.contains(&publish.resource) {
                    errors.push(format!(
                        "'{name}': publishes '{}' but no step reads it",
                        publish.resource
                    ));
                }
                if publishers.insert(publish.counter.as_str(), idx).is_some() {
                    errors.push(format!("counter '{}' is published twice", publish.counter));
                }
            }
        }

        for entry in &self.roster {
            for gate in entry.gates() {
                if !publishers.contains_key(gate.counter.as_str()) {
                    errors.push(format!(
                        "'{}': gate on unknown counter '{}'",
                        entry.name(),
                        gate.counter
                    ));
                }
            }
        }

        if let Some(cycle) = self.gate_cycle(&publishers) {
            errors.push(format!("gate cycle: {}", cycle.join(" -> ")));
        }
    }

    /// Depth-first search over gate -> publisher edges. Returns the entry
    /// names along the first cycle found, starting and ending on the same entry.
    fn gate_cycle(&self, publishers: &HashMap<&str, usize>) -> Option<Vec<String>> {
        let deps: Vec<Vec<usize>> = self
            .roster
            .iter()
            .map(|entry| {
                entry
                    .gates()
                    .iter()
                    .filter_map(|gate| publishers.get(gate.counter.as_str()).copied())
                    .collect()
            })
            .collect();
        let mut done = vec![false; self.roster.len()];
        for start in 0..self.roster.len() {
            let mut path = Vec::new();
            if let Some(cycle) = find_cycle(start, &deps, &mut path, &mut done) {
                return Some(
                    cycle
                        .into_iter()
                        .map(|idx| self.roster[idx].name().to_string())
                        .collect(),
                );
            }
        }
        None
    }
}

fn find_cycle(
    node: usize,
    deps: &[Vec<usize>],
    path: &mut Vec<usize>,
    done: &mut [bool],
) -> Option<Vec<usize>> {
    if let Some(pos) = path.iter().position(|&seen| seen == node) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(node);
        return Some(cycle);
    }
    if done[node] {
        return None;
    }
    path.push(node);
    for &dep in &deps[node] {
        if let Some(cycle) = find_cycle(dep, deps, path, done) {
            return Some(cycle);
        }
    }
    path.pop();
    done[node] = true;
    None
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BotConfig::default()`.
pub fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        let cfg = BotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Sample tower: a crystal station gated on Y-trap deposits, a grinder, and
/// a rotating group of Y-trap beds.
fn sample_tower() -> BotConfig {
    let turn = |degrees| Turn::new(Axis::X, degrees);
    let ring = vec![
        Waypoint::new("Home", vec![turn(145)]),
        Waypoint::new("Grinder", vec![turn(-50)]),
        Waypoint::new("Vault", vec![turn(-95)]),
    ];

    let crystal = StationConfig {
        name: "crystal".to_string(),
        interval_secs: 90 * 60,
        gate: Some(GateConfig {
            counter: "ytraps_deposited".to_string(),
            threshold: 2_000,
        }),
        plausibility: BTreeMap::from([("dust".to_string(), PlausibilityConfig::default())]),
        steps: vec![
            Step::Spawn {
                bed: "{station}".to_string(),
                max_attempts: 3,
            },
            Step::TurnTo {
                viewpoint: "Vault".to_string(),
            },
            Step::Press {
                key: "f".to_string(),
            },
            Step::Read {
                resources: vec!["dust".to_string(), "black_pearls".to_string()],
                optional: true,
                assume: None,
            },
        ],
        ..StationConfig::default()
    };

    let grinder = StationConfig {
        name: "grinder".to_string(),
        interval_secs: 3 * 60 * 60,
        steps: vec![
            Step::Spawn {
                bed: "{station}".to_string(),
                max_attempts: 3,
            },
            Step::TurnTo {
                viewpoint: "Grinder".to_string(),
            },
            Step::Approach {
                template: "dedi".to_string(),
                max_steps: 8,
                step_secs: 0.2,
            },
            Step::Read {
                resources: vec![
                    "silica_pearls".to_string(),
                    "paste".to_string(),
                    "metal_ingots".to_string(),
                    "electronics".to_string(),
                ],
                optional: false,
                assume: Some(BTreeMap::from([
                    ("silica_pearls".to_string(), 5_211),
                    ("paste".to_string(), 2_600),
                    ("metal_ingots".to_string(), 8_757),
                    ("electronics".to_string(), 1_773),
                ])),
            },
        ],
        ..StationConfig::default()
    };

    let ytraps = GroupConfig {
        prefix: "ytrap".to_string(),
        count: 4,
        refill_interval_secs: Some(24 * 60 * 60),
        publishes: vec![PublishConfig {
            counter: "ytraps_deposited".to_string(),
            resource: "ytraps".to_string(),
        }],
        expect: Expectation {
            max_secs: Some(100),
            refill_max_secs: Some(150),
            min_yield: BTreeMap::from([("ytraps".to_string(), 40)]),
        },
        steps: vec![
            Step::Spawn {
                bed: "{station}".to_string(),
                max_attempts: 3,
            },
            Step::Enter {
                key: "e".to_string(),
                template: "inventory".to_string(),
                max_attempts: 5,
            },
            Step::Refill {
                steps: vec![Step::Press {
                    key: "t".to_string(),
                }],
            },
            Step::Read {
                resources: vec!["ytraps".to_string()],
                optional: false,
                assume: Some(BTreeMap::from([("ytraps".to_string(), 0)])),
            },
        ],
        ..GroupConfig::default()
    };

    let valid_ranges = [
        ("silica_pearls", 6_000, 60_000),
        ("paste", 7_000, 180_000),
        ("electronics", 800, 10_000),
        ("metal_ingots", 9_000, 60_000),
    ]
    .into_iter()
    .map(|(name, min, max)| (name.to_string(), ValidRange { min, max }))
    .collect();

    BotConfig {
        home: "Home".to_string(),
        idle_secs: 30,
        stop_file: Some(".gachabot/STOP".to_string()),
        pause_file: Some(".gachabot/PAUSE".to_string()),
        perception: PerceptionConfig {
            valid_ranges,
            ..PerceptionConfig::default()
        },
        recovery: RecoveryConfig::default(),
        notify: NotifyConfig::default(),
        ring,
        roster: vec![
            RosterEntryConfig::Station(crystal),
            RosterEntryConfig::Station(grinder),
            RosterEntryConfig::Group(ytraps),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(name: &str) -> StationConfig {
        StationConfig {
            name: name.to_string(),
            steps: vec![Step::Read {
                resources: vec!["dust".to_string()],
                optional: false,
                assume: None,
            }],
            ..StationConfig::default()
        }
    }

    fn publishing(name: &str, counter: &str) -> StationConfig {
        StationConfig {
            publishes: vec![PublishConfig {
                counter: counter.to_string(),
                resource: "dust".to_string(),
            }],
            ..station(name)
        }
    }

    fn gated(mut cfg: StationConfig, counter: &str) -> StationConfig {
        cfg.gate = Some(GateConfig {
            counter: counter.to_string(),
            threshold: 1,
        });
        cfg
    }

    fn with_roster(roster: Vec<RosterEntryConfig>) -> BotConfig {
        BotConfig {
            roster,
            ..BotConfig::default()
        }
    }

    #[test]
    fn sample_config_is_valid() {
        BotConfig::default().validate().expect("valid");
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, BotConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".gachabot/config.toml");
        let cfg = BotConfig::default();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
            idle_secs = 5

            [perception]
            max_attempts = 4
            "#,
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.idle_secs, 5);
        assert_eq!(cfg.perception.max_attempts, 4);
        assert_eq!(cfg.perception.charset, PerceptionConfig::default().charset);
        assert_eq!(cfg.roster.len(), 3);
    }

    #[test]
    fn rejects_ring_that_does_not_close() {
        let mut cfg = BotConfig::default();
        cfg.ring[0].turns[0].degrees = 140;
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err:#}").contains("do not close"), "{err:#}");
    }

    #[test]
    fn rejects_zero_attempt_budget() {
        let mut cfg = BotConfig::default();
        cfg.perception.max_attempts = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("perception.max_attempts"));
    }

    #[test]
    fn rejects_gate_on_unknown_counter() {
        let cfg = with_roster(vec![RosterEntryConfig::Station(gated(
            station("crystal"),
            "missing",
        ))]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("gate on unknown counter 'missing'"));
    }

    #[test]
    fn rejects_gate_cycles() {
        let cfg = with_roster(vec![
            RosterEntryConfig::Station(gated(publishing("a", "from_a"), "from_b")),
            RosterEntryConfig::Station(gated(publishing("b", "from_b"), "from_a")),
        ]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("gate cycle: a -> b -> a"), "{err}");
    }

    #[test]
    fn rejects_self_gate() {
        let cfg = with_roster(vec![RosterEntryConfig::Station(gated(
            publishing("a", "from_a"),
            "from_a",
        ))]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("gate cycle: a -> a"), "{err}");
    }

    #[test]
    fn rejects_counter_published_twice() {
        let cfg = with_roster(vec![
            RosterEntryConfig::Station(publishing("a", "dust")),
            RosterEntryConfig::Station(publishing("b", "dust")),
        ]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("counter 'dust' is published twice"));
    }

    #[test]
    fn rejects_member_name_collisions() {
        let cfg = with_roster(vec![
            RosterEntryConfig::Station(station("bed01")),
            RosterEntryConfig::Group(GroupConfig {
                prefix: "bed".to_string(),
                count: 2,
                steps: station("x").steps,
                ..GroupConfig::default()
            }),
        ]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate station name 'bed01'"));
    }

    #[test]
    fn phased_station_parses_and_validates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [[roster]]
            kind = "station"
            name = "crystal"
            interval_secs = 5400
            publishes = [{ counter = "vault_full", resource = "dust" }]
            steps = [{ action = "read", resources = ["dust"] }]

            [[roster]]
            kind = "phased"
            name = "grinder"

            [[roster.phases]]
            name = "grind"
            gate = { counter = "vault_full", threshold = 1 }
            expect = { max_secs = 900 }
            steps = [{ action = "turn_to", viewpoint = "Grinder" }]

            [[roster.phases]]
            name = "craft"
            interval_secs = 600
            steps = [{ action = "press", key = "c" }]
            "#,
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        match &cfg.roster[1] {
            RosterEntryConfig::Phased(phased) => {
                assert_eq!(phased.phases.len(), 2);
                assert_eq!(phased.phases[0].expect.max_secs, Some(900));
                assert_eq!(phased.phases[1].interval_secs, 600);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_phases() {
        let phase = |name: &str, viewpoint: &str| PhaseConfig {
            name: name.to_string(),
            steps: vec![Step::TurnTo {
                viewpoint: viewpoint.to_string(),
            }],
            ..PhaseConfig::default()
        };
        let cfg = with_roster(vec![RosterEntryConfig::Phased(PhasedConfig {
            name: "grinder".to_string(),
            phases: vec![phase("grind", "Grinder"), phase("grind", "Attic")],
            ..PhasedConfig::default()
        })]);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("'grinder': duplicate phase 'grind'"), "{err}");
        assert!(err.contains("'grinder' phase 'grind'"), "{err}");

        let empty = with_roster(vec![RosterEntryConfig::Phased(PhasedConfig {
            name: "grinder".to_string(),
            ..PhasedConfig::default()
        })]);
        let err = empty.validate().unwrap_err().to_string();
        assert!(err.contains("'grinder': phases must not be empty"), "{err}");
    }

    #[test]
    fn rejects_cycle_through_a_phase_gate() {
        let phased = PhasedConfig {
            name: "grinder".to_string(),
            publishes: vec![PublishConfig {
                counter: "from_grinder".to_string(),
                resource: "dust".to_string(),
            }],
            phases: vec![
                PhaseConfig {
                    name: "grind".to_string(),
                    steps: station("x").steps,
                    ..PhaseConfig::default()
                },
                PhaseConfig {
                    name: "craft".to_string(),
                    gate: Some(GateConfig {
                        counter: "from_a".to_string(),
                        threshold: 1,
                    }),
                    steps: station("x").steps,
                    ..PhaseConfig::default()
                },
            ],
            ..PhasedConfig::default()
        };
        let cfg = with_roster(vec![
            RosterEntryConfig::Station(gated(publishing("a", "from_a"), "from_grinder")),
            RosterEntryConfig::Phased(phased),
        ]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("gate cycle: a -> grinder -> a"), "{err}");
    }

    #[test]
    fn group_members_are_zero_padded() {
        let group = GroupConfig {
            prefix: "ytrap".to_string(),
            count: 3,
            ..GroupConfig::default()
        };
        assert_eq!(group.member_names(), vec!["ytrap00", "ytrap01", "ytrap02"]);
    }
}
