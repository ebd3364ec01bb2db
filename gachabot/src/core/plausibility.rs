//! Rolling-average plausibility bounding for recognized resource amounts.
//!
//! This is a heuristic outlier filter, not a statistical test. A reading far
//! from the running average is assumed to be a misread and is replaced by the
//! average. Genuine bursts beyond the band are occasionally clamped; in
//! exchange a single bad read can never poison the long-run totals.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Asymmetric acceptance band around the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Band {
    /// Accepted distance below the expected value.
    pub lower_slack: u64,
    /// Accepted distance above the expected value (wider, bursts are legitimate).
    pub upper_slack: u64,
}

impl Default for Band {
    fn default() -> Self {
        Self {
            lower_slack: 5_000,
            upper_slack: 10_000,
        }
    }
}

impl Band {
    /// Inclusive `[low, high]` range around `expected`, floored at zero.
    pub fn range(&self, expected: u64) -> (u64, u64) {
        (
            expected.saturating_sub(self.lower_slack),
            expected.saturating_add(self.upper_slack),
        )
    }

    pub fn contains(&self, expected: u64, value: u64) -> bool {
        let (low, high) = self.range(expected);
        (low..=high).contains(&value)
    }
}

/// Per-resource bounding settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlausibilityConfig {
    /// When false, raw readings pass through unchanged (still recorded).
    pub enabled: bool,
    pub band: Band,
    /// Expected gain per second of interval, used before any sample exists.
    pub nominal_rate_per_sec: u64,
}

impl Default for PlausibilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            band: Band::default(),
            nominal_rate_per_sec: 100,
        }
    }
}

/// Running total and sample count for one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlausibilityModel {
    pub total_made: u64,
    pub total_samples: u64,
}

impl PlausibilityModel {
    /// Rounded running average, or `None` before the first sample.
    pub fn average(&self) -> Option<u64> {
        if self.total_samples == 0 {
            return None;
        }
        let half = self.total_samples / 2;
        Some(self.total_made.saturating_add(half) / self.total_samples)
    }

    /// Average if known, else the nominal rate over `elapsed`.
    pub fn expected(&self, cfg: &PlausibilityConfig, elapsed: Duration) -> u64 {
        self.average()
            .unwrap_or_else(|| cfg.nominal_rate_per_sec.saturating_mul(elapsed.as_secs()))
    }

    pub fn record(&mut self, amount: u64) {
        self.total_made = self.total_made.saturating_add(amount);
        self.total_samples = self.total_samples.saturating_add(1);
    }
}

/// Outcome of bounding a single raw reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accepted { value: u64 },
    Substituted { raw: u64, expected: u64 },
    /// Bounding disabled for this resource.
    Unchecked { value: u64 },
}

impl Verdict {
    /// The amount the caller should trust.
    pub fn value(&self) -> u64 {
        match *self {
            Verdict::Accepted { value } | Verdict::Unchecked { value } => value,
            Verdict::Substituted { expected, .. } => expected,
        }
    }

    pub fn is_substituted(&self) -> bool {
        matches!(self, Verdict::Substituted { .. })
    }
}

/// Judge `raw` against the model. Does not record; callers record `value()`.
///
/// With no samples and a zero nominal expectation there is nothing to judge
/// against, so the reading is accepted and seeds the model.
pub fn bound(
    model: &PlausibilityModel,
    cfg: &PlausibilityConfig,
    raw: u64,
    elapsed: Duration,
) -> Verdict {
    if !cfg.enabled {
        return Verdict::Unchecked { value: raw };
    }
    let expected = model.expected(cfg, elapsed);
    if model.total_samples == 0 && expected == 0 {
        return Verdict::Accepted { value: raw };
    }
    if cfg.band.contains(expected, raw) {
        Verdict::Accepted { value: raw }
    } else {
        Verdict::Substituted { raw, expected }
    }
}
