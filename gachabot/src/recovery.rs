//! Recovery after an unclassified station failure.
//!
//! Walks an escalation ladder of corrective actions, checking after each one
//! whether the avatar is controllable again (a configured template is
//! visible). Exactly one failure report is sent per recovery, carrying the
//! station, the error and what the agent last saw before recovery began.
//! The failed station is never retried here; the next tick re-evaluates
//! readiness.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::core::types::{RecoveryOutcome, Report};
use crate::io::config::RecoveryConfig;
use crate::io::movement::{ControlError, Reconnect};
use crate::navigator::NavigationError;
use crate::scheduler::TickContext;
use crate::station::StationContext;

/// Corrective actions, least disruptive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Turn back to the home viewpoint.
    Recenter,
    /// Press the always-safe key (closes menus, cancels actions).
    ReissueSafeInput,
    /// Reset the control channel.
    Reconnect,
}

pub const LADDER: [RecoveryAction; 3] = [
    RecoveryAction::Recenter,
    RecoveryAction::ReissueSafeInput,
    RecoveryAction::Reconnect,
];

pub struct RecoveryHandler {
    cfg: RecoveryConfig,
    home: String,
}

impl RecoveryHandler {
    pub fn new(cfg: RecoveryConfig, home: impl Into<String>) -> Self {
        Self {
            cfg,
            home: home.into(),
        }
    }

    /// Try to restore control and report the failure. Returns true when the
    /// avatar was confirmed controllable.
    #[instrument(skip(self, error, ctx))]
    pub fn recover(
        &self,
        station: &str,
        error: &dyn std::fmt::Display,
        ctx: &mut TickContext<'_>,
    ) -> bool {
        let viewpoint = ctx.station.navigator.current().to_string();
        let snapshot = ctx
            .station
            .vision
            .last_capture()
            .map(|frame| frame.snapshot());
        let outcome = self.run_ladder(&mut ctx.station, ctx.session);
        match outcome {
            RecoveryOutcome::Recovered { actions_taken } => {
                info!(actions_taken, "recovered");
            }
            RecoveryOutcome::Failed { actions_taken } => {
                warn!(actions_taken, "recovery failed");
            }
        }
        ctx.notifier.send(Report::Failure {
            station: station.to_string(),
            error: format!("{error:#}"),
            viewpoint,
            snapshot,
            recovery: outcome,
        });
        outcome.succeeded()
    }

    fn run_ladder(
        &self,
        ctx: &mut StationContext<'_>,
        session: &mut dyn Reconnect,
    ) -> RecoveryOutcome {
        let mut actions_taken = 0;
        for action in LADDER {
            if action == RecoveryAction::Reconnect && !self.cfg.allow_reconnect {
                continue;
            }
            actions_taken += 1;
            info!(?action, "recovery action");
            match self.apply(action, ctx, session) {
                Ok(()) => {}
                Err(ControlError::Terminated) => {
                    info!("shutdown requested during recovery");
                    return RecoveryOutcome::Failed { actions_taken };
                }
                Err(ControlError::Other(err)) => {
                    warn!(?action, err = %format!("{err:#}"), "recovery action failed");
                    continue;
                }
            }
            if self.is_controllable(ctx) {
                return RecoveryOutcome::Recovered { actions_taken };
            }
        }
        RecoveryOutcome::Failed { actions_taken }
    }

    fn apply(
        &self,
        action: RecoveryAction,
        ctx: &mut StationContext<'_>,
        session: &mut dyn Reconnect,
    ) -> Result<(), ControlError> {
        match action {
            RecoveryAction::Recenter => {
                ctx.navigator
                    .travel_to(&self.home, ctx.movement)
                    .map_err(|err| match err {
                        NavigationError::Control { source, .. } => source,
                        other => ControlError::Other(anyhow::Error::new(other)),
                    })?;
            }
            RecoveryAction::ReissueSafeInput => ctx.movement.press(&self.cfg.safe_key)?,
            RecoveryAction::Reconnect => session.reconnect()?,
        }
        let settle = Duration::try_from_secs_f64(self.cfg.settle_secs).unwrap_or(Duration::ZERO);
        ctx.movement.wait(settle)
    }

    fn is_controllable(&self, ctx: &mut StationContext<'_>) -> bool {
        let viewport = ctx.verifier.config().viewport;
        let located = ctx
            .vision
            .capture(viewport)
            .and_then(|frame| ctx.vision.locate(&self.cfg.controllable_template, &frame));
        matches!(located, Ok(Some(_)))
    }
}
