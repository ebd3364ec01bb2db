//! Movement collaborator: the avatar's input device.
//!
//! Every primitive blocks for the physical duration of the action. The
//! [`Movement`] trait decouples stations from the concrete input backend;
//! tests use scripted movements that only record what was issued.

use std::time::Duration;

use thiserror::Error;

use crate::core::chore::WalkDirection;
use crate::core::ring::Axis;

/// Failure raised by a collaborator call.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A shutdown request was observed mid-action.
    #[error("terminated by shutdown request")]
    Terminated,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fire-and-block input primitives.
pub trait Movement {
    fn turn(&mut self, axis: Axis, degrees: i32) -> Result<(), ControlError>;

    fn walk(&mut self, direction: WalkDirection, duration: Duration) -> Result<(), ControlError>;

    fn press(&mut self, key: &str) -> Result<(), ControlError>;

    fn wait(&mut self, duration: Duration) -> Result<(), ControlError>;

    /// Respawn at a named bed. `Ok(false)` when the bed could not be found.
    fn spawn_at(&mut self, bed: &str) -> Result<bool, ControlError>;
}

/// Last-resort reset of the control channel (e.g. rejoin the session).
pub trait Reconnect {
    fn reconnect(&mut self) -> Result<(), ControlError>;
}
