//! Ring navigator: owns the current viewpoint and issues planned turns.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::ring::{Direction, RingError, Route, WaypointRing};
use crate::io::movement::{ControlError, Movement};

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error("turn toward '{target}' failed")]
    Control {
        target: String,
        #[source]
        source: ControlError,
    },
}

/// Single source of truth for the avatar's viewpoint on the ring.
///
/// The viewpoint only changes after every turn of a route was issued; a
/// failed turn leaves it untouched and retries belong to the caller.
#[derive(Debug, Clone)]
pub struct Navigator {
    ring: WaypointRing,
    current: String,
}

impl Navigator {
    pub fn new(ring: WaypointRing, home: &str) -> Result<Self, RingError> {
        ring.index_of(home)?;
        Ok(Self {
            ring,
            current: home.to_string(),
        })
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn ring(&self) -> &WaypointRing {
        &self.ring
    }

    /// Plan without moving.
    pub fn plan(&self, target: &str) -> Result<Route, RingError> {
        self.ring.route(&self.current, target)
    }

    /// Turn to `target` along the shorter direction and return the issued route.
    #[instrument(skip(self, movement), fields(from = %self.current))]
    pub fn travel_to(
        &mut self,
        target: &str,
        movement: &mut dyn Movement,
    ) -> Result<Route, NavigationError> {
        let route = self.plan(target)?;
        if route.direction == Direction::Stay {
            debug!("already at target");
            return Ok(route);
        }
        for turn in route.turns() {
            movement
                .turn(turn.axis, turn.degrees)
                .map_err(|source| NavigationError::Control {
                    target: target.to_string(),
                    source,
                })?;
        }
        info!(direction = ?route.direction, hops = route.len(), "reached viewpoint");
        self.current = target.to_string();
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ring::{Axis, Turn, Waypoint};
    use crate::test_support::{MovementOp, ScriptedMovement};

    fn navigator() -> Navigator {
        let ring = WaypointRing::new(vec![
            Waypoint::new("Home", vec![Turn::new(Axis::X, 145)]),
            Waypoint::new("Grinder", vec![Turn::new(Axis::X, -50)]),
            Waypoint::new("Vault", vec![Turn::new(Axis::X, -95)]),
        ])
        .expect("ring");
        Navigator::new(ring, "Home").expect("navigator")
    }

    #[test]
    fn home_must_be_on_the_ring() {
        let ring = navigator().ring().clone();
        assert!(Navigator::new(ring, "Attic").is_err());
    }

    #[test]
    fn travel_issues_turns_then_updates_viewpoint() {
        let mut nav = navigator();
        let mut movement = ScriptedMovement::new();
        let route = nav.travel_to("Vault", &mut movement).expect("travel");
        assert_eq!(route.direction, Direction::Backward);
        assert_eq!(movement.ops(), &[MovementOp::Turn(Axis::X, -145)]);
        assert_eq!(nav.current(), "Vault");

        nav.travel_to("Home", &mut movement).expect("travel");
        assert_eq!(movement.ops().last(), Some(&MovementOp::Turn(Axis::X, 145)));
        assert_eq!(nav.current(), "Home");
    }

    #[test]
    fn travel_to_current_is_a_no_op() {
        let mut nav = navigator();
        let mut movement = ScriptedMovement::new();
        let route = nav.travel_to("Home", &mut movement).expect("travel");
        assert!(route.is_empty());
        assert!(movement.ops().is_empty());
        assert_eq!(nav.current(), "Home");
    }

    #[test]
    fn failed_turn_keeps_previous_viewpoint() {
        let mut nav = navigator();
        let mut movement = ScriptedMovement::new();
        movement.fail_turns_after(0);
        let err = nav.travel_to("Grinder", &mut movement).unwrap_err();
        assert!(matches!(err, NavigationError::Control { .. }));
        assert_eq!(nav.current(), "Home");
    }

    #[test]
    fn unknown_target_is_a_ring_error() {
        let mut nav = navigator();
        let mut movement = ScriptedMovement::new();
        let err = nav.travel_to("Attic", &mut movement).unwrap_err();
        assert!(matches!(
            err,
            NavigationError::Ring(RingError::UnknownWaypoint(_))
        ));
    }
}
