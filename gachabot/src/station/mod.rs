//! Station capability contract and the shared execution context.
//!
//! A station is one recurring chore: it knows when it is ready and how to
//! complete itself. Stations never recover from failures themselves; they
//! classify them through [`StationError`] and the scheduler decides.

pub mod chore;
pub mod group;
pub mod phased;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::types::{RunStatistics, StationTotals};
use crate::io::clock::Clock;
use crate::io::movement::{ControlError, Movement};
use crate::io::vision::Vision;
use crate::navigator::{NavigationError, Navigator};
use crate::perception::{PerceptionError, PerceptionVerifier};

pub use chore::ChoreStation;
pub use group::StationGroup;
pub use phased::{Phase, PhasedStation};

/// Classified failure of a station completion.
#[derive(Debug, Error)]
pub enum StationError {
    /// A bed, structure or interaction target could not be reached.
    #[error("could not reach '{target}': {detail}")]
    NotFound { target: String, detail: String },

    #[error("could not read {resources:?} after {attempts} attempts")]
    SensingExhausted {
        attempts: u32,
        resources: Vec<String>,
    },

    /// Shutdown was requested mid-chore.
    #[error("terminated")]
    Terminated,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ControlError> for StationError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::Terminated => StationError::Terminated,
            ControlError::Other(err) => StationError::Other(err),
        }
    }
}

impl From<PerceptionError> for StationError {
    fn from(err: PerceptionError) -> Self {
        match err {
            PerceptionError::Exhausted {
                attempts,
                resources,
            } => StationError::SensingExhausted {
                attempts,
                resources,
            },
            PerceptionError::Terminated => StationError::Terminated,
        }
    }
}

impl From<NavigationError> for StationError {
    fn from(err: NavigationError) -> Self {
        match err {
            NavigationError::Control {
                source: ControlError::Terminated,
                ..
            } => StationError::Terminated,
            other => StationError::Other(anyhow::Error::new(other)),
        }
    }
}

/// Collaborators a station may drive during one completion.
pub struct StationContext<'a> {
    pub navigator: &'a mut Navigator,
    pub movement: &'a mut dyn Movement,
    pub vision: &'a mut dyn Vision,
    pub verifier: &'a PerceptionVerifier,
    pub clock: &'a dyn Clock,
}

/// One recurring chore.
pub trait Station {
    fn name(&self) -> &str;

    /// Interval elapsed and any cross-station gate open.
    fn is_ready(&self, now: DateTime<Utc>) -> bool;

    /// Perform the chore. Completion time is recorded even when this fails.
    fn complete(&mut self, ctx: &mut StationContext<'_>) -> Result<RunStatistics, StationError>;

    fn totals(&self) -> StationTotals;
}
