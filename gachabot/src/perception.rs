//! Perception verifier: turns noisy screen text into trusted amounts.
//!
//! Each attempt captures one frame and treats the requested resources as a
//! single composite measurement: every resource must be located, recognized,
//! parsed and in range, or the whole attempt is discarded. Readings are never
//! mixed across attempts. Between failed attempts a small probing walk
//! (alternating direction by attempt parity) nudges the view.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::io::config::PerceptionConfig;
use crate::io::movement::{ControlError, Movement};
use crate::io::vision::{Frame, Region, Vision};

/// Resource name to recognized amount.
pub type Reading = BTreeMap<String, u64>;

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("digit pattern is valid"));

#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("could not read {resources:?} after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        resources: Vec<String>,
    },
    #[error("terminated while reading resources")]
    Terminated,
}

/// Why a single attempt was abandoned.
#[derive(Debug)]
enum Miss {
    Terminated,
    Abandoned(String),
}

impl From<ControlError> for Miss {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::Terminated => Miss::Terminated,
            ControlError::Other(err) => Miss::Abandoned(format!("{err:#}")),
        }
    }
}

pub struct PerceptionVerifier {
    cfg: PerceptionConfig,
    misreads: Vec<(char, char)>,
}

impl PerceptionVerifier {
    pub fn new(cfg: PerceptionConfig) -> Self {
        let misreads = cfg
            .misreads
            .iter()
            .filter_map(|(from, to)| Some((from.chars().next()?, to.chars().next()?)))
            .collect();
        Self { cfg, misreads }
    }

    pub fn config(&self) -> &PerceptionConfig {
        &self.cfg
    }

    /// Read every name in `names`, or fail once the attempt budget is spent.
    ///
    /// The returned mapping always has exactly the requested key set.
    #[instrument(skip(self, vision, movement), fields(max_attempts = self.cfg.max_attempts))]
    pub fn read_resources(
        &self,
        names: &[String],
        vision: &mut dyn Vision,
        movement: &mut dyn Movement,
    ) -> Result<Reading, PerceptionError> {
        let requested: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        if requested.is_empty() {
            return Ok(Reading::new());
        }

        let max_attempts = self.cfg.max_attempts;
        for attempt in 0..max_attempts {
            match self.attempt(&requested, vision) {
                Ok(reading) => {
                    info!(attempt = attempt + 1, ?reading, "resources read");
                    return Ok(reading);
                }
                Err(Miss::Terminated) => return Err(PerceptionError::Terminated),
                Err(Miss::Abandoned(reason)) => {
                    debug!(attempt = attempt + 1, %reason, "attempt abandoned");
                }
            }
            if attempt + 1 < max_attempts {
                self.probe(attempt, movement)?;
            }
        }

        warn!(attempts = max_attempts, "sensing exhausted");
        Err(PerceptionError::Exhausted {
            attempts: max_attempts,
            resources: requested.iter().map(|name| name.to_string()).collect(),
        })
    }

    fn attempt(&self, requested: &BTreeSet<&str>, vision: &mut dyn Vision) -> Result<Reading, Miss> {
        let frame = vision.capture(self.cfg.viewport)?;

        let mut regions: Vec<(&str, Region)> = Vec::with_capacity(requested.len());
        for &name in requested {
            match vision.locate(name, &frame)? {
                Some(region) => regions.push((name, region)),
                None => return Err(Miss::Abandoned(format!("'{name}' not located"))),
            }
        }

        let mut reading = Reading::new();
        for (name, region) in regions {
            let amount = self.read_region(vision, &frame, name, region)?;
            reading.insert(name.to_string(), amount);
        }
        Ok(reading)
    }

    fn read_region(
        &self,
        vision: &mut dyn Vision,
        frame: &Frame,
        name: &str,
        region: Region,
    ) -> Result<u64, Miss> {
        let crop = vision.crop(frame, region)?;
        let raw = vision.recognize_text(&crop, &self.cfg.charset)?;
        let amount = self
            .parse_amount(&raw)
            .ok_or_else(|| Miss::Abandoned(format!("'{name}' read as non-numeric {raw:?}")))?;
        if let Some(range) = self.cfg.valid_ranges.get(name)
            && !range.contains(amount)
        {
            return Err(Miss::Abandoned(format!(
                "'{name}' amount {amount} outside [{}, {}]",
                range.min, range.max
            )));
        }
        Ok(amount)
    }

    /// Normalize common misreads, then accept digits only.
    pub fn parse_amount(&self, raw: &str) -> Option<u64> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| {
                self.misreads
                    .iter()
                    .find(|(from, _)| *from == c)
                    .map_or(c, |(_, to)| *to)
            })
            .collect();
        if !DIGITS.is_match(&normalized) {
            return None;
        }
        normalized.parse().ok()
    }

    fn probe(&self, attempt: u32, movement: &mut dyn Movement) -> Result<(), PerceptionError> {
        let probe = &self.cfg.probe;
        let direction = if attempt % 2 == 0 {
            probe.direction
        } else {
            probe.direction.opposite()
        };
        let result = movement
            .walk(direction, Duration::from_secs_f64(probe.secs))
            .and_then(|()| movement.wait(Duration::from_secs_f64(probe.settle_secs)));
        match result {
            Ok(()) => Ok(()),
            Err(ControlError::Terminated) => Err(PerceptionError::Terminated),
            Err(ControlError::Other(err)) => {
                warn!(err = %format!("{err:#}"), "probe move failed");
                Ok(())
            }
        }
    }
}
