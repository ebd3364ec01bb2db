//! Fixed cyclic ring of viewpoints and shortest-route planning on it.
//!
//! Each waypoint records the turns that reach it from its ring predecessor.
//! Travelling forward replays those turns; travelling backward undoes the
//! turns of every waypoint being left, with each magnitude negated.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Degrees in a full rotation; per-axis deltas around the ring must sum to a multiple.
pub const FULL_ROTATION: i32 = 360;

/// Camera axis a turn rotates around (`x` = yaw, `y` = pitch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

/// A single signed angular turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub axis: Axis,
    pub degrees: i32,
}

impl Turn {
    pub fn new(axis: Axis, degrees: i32) -> Self {
        Self { axis, degrees }
    }

    /// Same axis, opposite physical direction, same nominal angle.
    pub fn inverted(self) -> Self {
        Self {
            axis: self.axis,
            degrees: -self.degrees,
        }
    }
}

/// Named viewpoint plus the turns that reach it from its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            name: name.into(),
            turns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("ring must contain at least one waypoint")]
    Empty,
    #[error("waypoint names must not be empty")]
    EmptyName,
    #[error("duplicate waypoint '{0}'")]
    DuplicateName(String),
    #[error("turns around the ring do not close on the {axis:?} axis (sum {sum} is not a multiple of 360)")]
    NotClosed { axis: Axis, sum: i32 },
    #[error("unknown waypoint '{0}'")]
    UnknownWaypoint(String),
}

/// Direction chosen for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Target equals the current viewpoint; nothing to emit.
    Stay,
    Forward,
    Backward,
}

/// One hop of a route: the turns to issue, and the waypoint reached afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leg {
    pub waypoint: String,
    pub turns: Vec<Turn>,
}

/// Ordered turn operations between two viewpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub from: String,
    pub to: String,
    pub direction: Direction,
    pub legs: Vec<Leg>,
}

impl Route {
    fn stay(at: &str) -> Self {
        Self {
            from: at.to_string(),
            to: at.to_string(),
            direction: Direction::Stay,
            legs: Vec::new(),
        }
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Flattened turn operations in emission order.
    pub fn turns(&self) -> impl Iterator<Item = Turn> + '_ {
        self.legs.iter().flat_map(|leg| leg.turns.iter().copied())
    }
}

/// Validated, immutable ring of waypoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaypointRing {
    waypoints: Vec<Waypoint>,
}

impl WaypointRing {
    /// Build a ring, rejecting empty/duplicate names and deltas that do not close.
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, RingError> {
        if waypoints.is_empty() {
            return Err(RingError::Empty);
        }
        let mut seen = HashSet::new();
        for waypoint in &waypoints {
            if waypoint.name.trim().is_empty() {
                return Err(RingError::EmptyName);
            }
            if !seen.insert(waypoint.name.as_str()) {
                return Err(RingError::DuplicateName(waypoint.name.clone()));
            }
        }
        for axis in [Axis::X, Axis::Y] {
            let sum: i32 = waypoints
                .iter()
                .flat_map(|waypoint| waypoint.turns.iter())
                .filter(|turn| turn.axis == axis)
                .map(|turn| turn.degrees)
                .sum();
            if sum.rem_euclid(FULL_ROTATION) != 0 {
                return Err(RingError::NotClosed { axis, sum });
            }
        }
        Ok(Self { waypoints })
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_ok()
    }

    pub fn index_of(&self, name: &str) -> Result<usize, RingError> {
        self.waypoints
            .iter()
            .position(|waypoint| waypoint.name == name)
            .ok_or_else(|| RingError::UnknownWaypoint(name.to_string()))
    }

    /// Plan the shorter of the two cyclic traversals from `from` to `to`.
    ///
    /// Ties go forward. `from == to` yields an empty [`Direction::Stay`] route.
    pub fn route(&self, from: &str, to: &str) -> Result<Route, RingError> {
        let start = self.index_of(from)?;
        let target = self.index_of(to)?;
        if start == target {
            return Ok(Route::stay(from));
        }

        let forward = self.forward_legs(start, target);
        let backward = self.backward_legs(start, target);
        let (direction, legs) = if forward.len() <= backward.len() {
            (Direction::Forward, forward)
        } else {
            (Direction::Backward, backward)
        };

        Ok(Route {
            from: from.to_string(),
            to: to.to_string(),
            direction,
            legs,
        })
    }

    fn forward_legs(&self, start: usize, target: usize) -> Vec<Leg> {
        let n = self.waypoints.len();
        let mut legs = Vec::new();
        for step in 1..=n {
            let idx = (start + step) % n;
            let waypoint = &self.waypoints[idx];
            legs.push(Leg {
                waypoint: waypoint.name.clone(),
                turns: waypoint.turns.clone(),
            });
            if idx == target {
                break;
            }
        }
        legs
    }

    fn backward_legs(&self, start: usize, target: usize) -> Vec<Leg> {
        let n = self.waypoints.len();
        let mut legs = Vec::new();
        let mut current = start;
        for _ in 0..n {
            let prev = (current + n - 1) % n;
            // Leaving `current` backward undoes the turns that reached it.
            let turns = self.waypoints[current]
                .turns
                .iter()
                .map(|turn| turn.inverted())
                .collect();
            legs.push(Leg {
                waypoint: self.waypoints[prev].name.clone(),
                turns,
            });
            current = prev;
            if current == target {
                break;
            }
        }
        legs
    }
}
