//! Dry-run collaborators for `gachabot run`.
//!
//! Nothing is sent to a real input device or screen: movements are logged
//! and every template is "visible". Recognized amounts come from a fixed
//! table so stations, plausibility and notifications can be exercised end to
//! end. Movements observe the shutdown flag and raise `Terminated`.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::core::chore::WalkDirection;
use crate::core::ring::Axis;
use crate::io::clock::Shutdown;
use crate::io::movement::{ControlError, Movement, Reconnect};
use crate::io::vision::{Frame, Region, Vision};

const ROW_HEIGHT: u32 = 32;

pub struct DryRunMovement {
    shutdown: Shutdown,
    issued: u64,
}

impl DryRunMovement {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            issued: 0,
        }
    }

    /// Number of primitives issued so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    fn issue(&mut self) -> Result<(), ControlError> {
        self.shutdown.check()?;
        self.issued += 1;
        Ok(())
    }
}

impl Movement for DryRunMovement {
    fn turn(&mut self, axis: Axis, degrees: i32) -> Result<(), ControlError> {
        self.issue()?;
        debug!(?axis, degrees, "turn");
        Ok(())
    }

    fn walk(&mut self, direction: WalkDirection, duration: Duration) -> Result<(), ControlError> {
        self.issue()?;
        debug!(?direction, secs = duration.as_secs_f64(), "walk");
        Ok(())
    }

    fn press(&mut self, key: &str) -> Result<(), ControlError> {
        self.issue()?;
        debug!(key, "press");
        Ok(())
    }

    fn wait(&mut self, duration: Duration) -> Result<(), ControlError> {
        self.issue()?;
        debug!(secs = duration.as_secs_f64(), "wait");
        Ok(())
    }

    fn spawn_at(&mut self, bed: &str) -> Result<bool, ControlError> {
        self.issue()?;
        debug!(bed, "spawn");
        Ok(true)
    }
}

/// Control channel that always reconnects.
pub struct DryRunSession {
    shutdown: Shutdown,
}

impl DryRunSession {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

impl Reconnect for DryRunSession {
    fn reconnect(&mut self) -> Result<(), ControlError> {
        self.shutdown.check()?;
        debug!("reconnect");
        Ok(())
    }
}

/// Vision backend that sees every template and reads amounts from a table.
pub struct DryRunVision {
    amounts: BTreeMap<String, u64>,
    default_amount: u64,
    regions: BTreeMap<String, Region>,
    next_id: u64,
    last: Option<Frame>,
}

impl DryRunVision {
    pub fn new(amounts: BTreeMap<String, u64>, default_amount: u64) -> Self {
        Self {
            amounts,
            default_amount,
            regions: BTreeMap::new(),
            next_id: 0,
            last: None,
        }
    }

    fn frame(&mut self, region: Region) -> Frame {
        self.next_id += 1;
        Frame {
            id: self.next_id,
            region,
            path: None,
        }
    }

    fn region_for(&mut self, template: &str) -> Region {
        let row = u32::try_from(self.regions.len()).unwrap_or(u32::MAX);
        *self
            .regions
            .entry(template.to_string())
            .or_insert_with(|| Region::new(0, row.saturating_mul(ROW_HEIGHT), 200, ROW_HEIGHT))
    }
}

impl Vision for DryRunVision {
    fn capture(&mut self, region: Region) -> Result<Frame, ControlError> {
        let frame = self.frame(region);
        self.last = Some(frame.clone());
        Ok(frame)
    }

    fn locate(&mut self, template: &str, _frame: &Frame) -> Result<Option<Region>, ControlError> {
        Ok(Some(self.region_for(template)))
    }

    fn crop(&mut self, _frame: &Frame, region: Region) -> Result<Frame, ControlError> {
        Ok(self.frame(region))
    }

    fn recognize_text(&mut self, frame: &Frame, _charset: &str) -> Result<String, ControlError> {
        let amount = self
            .regions
            .iter()
            .find(|(_, region)| **region == frame.region)
            .and_then(|(template, _)| self.amounts.get(template))
            .copied()
            .unwrap_or(self.default_amount);
        Ok(amount.to_string())
    }

    fn last_capture(&self) -> Option<Frame> {
        self.last.clone()
    }
}
