//! Step vocabulary for scripted station chores.
//!
//! A chore is an ordered list of [`Step`]s loaded from configuration. The
//! station executing it supplies the movement, vision and navigation
//! collaborators; this module only describes and checks scripts.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::ring::{Axis, WaypointRing};

/// Placeholder in a `spawn` bed name replaced by the executing station's name.
pub const STATION_PLACEHOLDER: &str = "{station}";

/// Direction for a timed walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkDirection {
    Forward,
    Backward,
    Left,
    Right,
}

impl WalkDirection {
    pub fn opposite(self) -> Self {
        match self {
            WalkDirection::Forward => WalkDirection::Backward,
            WalkDirection::Backward => WalkDirection::Forward,
            WalkDirection::Left => WalkDirection::Right,
            WalkDirection::Right => WalkDirection::Left,
        }
    }
}

fn default_spawn_attempts() -> u32 {
    3
}

fn default_approach_steps() -> u32 {
    8
}

fn default_step_secs() -> f64 {
    0.2
}

fn default_enter_attempts() -> u32 {
    5
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Travel to a named bed. Running out of attempts is a not-found failure.
    Spawn {
        bed: String,
        #[serde(default = "default_spawn_attempts")]
        max_attempts: u32,
    },
    /// Reorient to a ring viewpoint through the navigator.
    TurnTo { viewpoint: String },
    /// Raw turn outside the ring (the navigator is not updated).
    Turn { axis: Axis, degrees: i32 },
    Press { key: String },
    Walk { direction: WalkDirection, secs: f64 },
    Wait { secs: f64 },
    /// Read resource amounts, then bound each one for plausibility.
    Read {
        resources: Vec<String>,
        /// Skip the reading instead of failing when sensing is exhausted.
        #[serde(default)]
        optional: bool,
        /// Amounts to use instead when sensing is exhausted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assume: Option<BTreeMap<String, u64>>,
    },
    /// Walk forward in short bursts until `template` is visible.
    Approach {
        template: String,
        #[serde(default = "default_approach_steps")]
        max_steps: u32,
        #[serde(default = "default_step_secs")]
        step_secs: f64,
    },
    /// Press `key` until `template` confirms the interaction took.
    Enter {
        key: String,
        template: String,
        #[serde(default = "default_enter_attempts")]
        max_attempts: u32,
    },
    /// Nested steps that only run during a refill lap.
    Refill { steps: Vec<Step> },
}

impl Step {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Step::Spawn { .. } => "spawn",
            Step::TurnTo { .. } => "turn_to",
            Step::Turn { .. } => "turn",
            Step::Press { .. } => "press",
            Step::Walk { .. } => "walk",
            Step::Wait { .. } => "wait",
            Step::Read { .. } => "read",
            Step::Approach { .. } => "approach",
            Step::Enter { .. } => "enter",
            Step::Refill { .. } => "refill",
        }
    }
}

/// Expand the station placeholder in a bed name.
pub fn expand_bed(bed: &str, station: &str) -> String {
    bed.replace(STATION_PLACEHOLDER, station)
}

/// Every resource a script can read, including refill-only reads.
pub fn resources_read(steps: &[Step]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_resources(steps, &mut out);
    out
}

fn collect_resources(steps: &[Step], out: &mut BTreeSet<String>) {
    for step in steps {
        match step {
            Step::Read { resources, .. } => out.extend(resources.iter().cloned()),
            Step::Refill { steps } => collect_resources(steps, out),
            _ => {}
        }
    }
}

/// Check a script against the ring:
/// - `turn_to` targets exist on the ring
/// - attempt and step budgets are > 0
/// - durations are finite and non-negative
/// - `read` lists are non-empty without duplicates, and `assume` covers exactly the read set
/// - `refill` blocks do not nest
pub fn validate_script(steps: &[Step], ring: &WaypointRing) -> Vec<String> {
    let mut errors = Vec::new();
    validate_steps(steps, ring, false, "steps", &mut errors);
    errors
}

fn validate_steps(
    steps: &[Step],
    ring: &WaypointRing,
    in_refill: bool,
    path: &str,
    errors: &mut Vec<String>,
) {
    for (idx, step) in steps.iter().enumerate() {
        let at = format!("{path}[{idx}] ({})", step.label());
        match step {
            Step::Spawn { bed, max_attempts } => {
                if bed.trim().is_empty() {
                    errors.push(format!("{at}: bed must not be empty"));
                }
                if *max_attempts == 0 {
                    errors.push(format!("{at}: max_attempts must be > 0"));
                }
            }
            Step::TurnTo { viewpoint } => {
                if !ring.contains(viewpoint) {
                    errors.push(format!("{at}: unknown viewpoint '{viewpoint}'"));
                }
            }
            Step::Turn { .. } => {}
            Step::Press { key } => {
                if key.trim().is_empty() {
                    errors.push(format!("{at}: key must not be empty"));
                }
            }
            Step::Walk { secs, .. } | Step::Wait { secs } => {
                check_secs(*secs, &at, errors);
            }
            Step::Read {
                resources, assume, ..
            } => {
                if resources.is_empty() {
                    errors.push(format!("{at}: resources must not be empty"));
                }
                let unique: BTreeSet<&String> = resources.iter().collect();
                if unique.len() != resources.len() {
                    errors.push(format!("{at}: duplicate resource names"));
                }
                if let Some(assume) = assume {
                    let assumed: BTreeSet<&String> = assume.keys().collect();
                    if assumed != unique {
                        errors.push(format!(
                            "{at}: assume must list exactly the resources being read"
                        ));
                    }
                }
            }
            Step::Approach {
                template,
                max_steps,
                step_secs,
            } => {
                if template.trim().is_empty() {
                    errors.push(format!("{at}: template must not be empty"));
                }
                if *max_steps == 0 {
                    errors.push(format!("{at}: max_steps must be > 0"));
                }
                check_secs(*step_secs, &at, errors);
            }
            Step::Enter {
                key,
                template,
                max_attempts,
            } => {
                if key.trim().is_empty() || template.trim().is_empty() {
                    errors.push(format!("{at}: key and template must not be empty"));
                }
                if *max_attempts == 0 {
                    errors.push(format!("{at}: max_attempts must be > 0"));
                }
            }
            Step::Refill { steps } => {
                if in_refill {
                    errors.push(format!("{at}: refill blocks cannot nest"));
                }
                validate_steps(steps, ring, true, &format!("{path}[{idx}].steps"), errors);
            }
        }
    }
}

fn check_secs(secs: f64, at: &str, errors: &mut Vec<String>) {
    if !secs.is_finite() || secs < 0.0 {
        errors.push(format!("{at}: secs must be a finite, non-negative number"));
    }
}
