//! Reading validation
//!
//! A single decode is never trusted on its own. Candidates go through a
//! [`ReadingValidator`] which only confirms an identifier once it has recurred
//! consistently, and confirmations then pass the per-channel [`Cooldown`] before
//! anything becomes visible.
//!
//! Two strategies are available and they are not equivalent:
//!
//! - [`MajorityValidator`] keeps a window per channel and confirms `W - 1` of `W`.
//! - [`ThresholdValidator`] accumulates hits per identifier across channels and
//!   confirms on the `R`-th hit within the staleness horizon.

mod cooldown;
mod majority;
mod threshold;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Channel, VehicleId};

pub use cooldown::Cooldown;
pub use majority::MajorityValidator;
pub use threshold::ThresholdValidator;

/// Confirms candidates once they recur.
pub trait ReadingValidator: Send {
    /// Record one candidate seen on `channel` at monotonic time `now`.
    ///
    /// Returns the identifier when this reading completes a confirmation.
    fn validate(&mut self, channel: Channel, candidate: VehicleId, now: Duration) -> Option<VehicleId>;

    /// Drop all history.
    fn reset(&mut self);

    /// Number of keys currently holding history.
    fn tracked_keys(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Selectable validation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStrategy {
    /// Per-channel window, `W - 1` of `W`.
    #[default]
    Majority,
    /// Per-identifier hit count with recency expiry.
    Threshold,
}

impl ValidatorStrategy {
    /// Build a validator. `readings` is the window `W` or the threshold `R`.
    pub fn build(self, readings: usize, staleness: Duration) -> Box<dyn ReadingValidator> {
        match self {
            ValidatorStrategy::Majority => Box::new(MajorityValidator::new(readings, staleness)),
            ValidatorStrategy::Threshold => Box::new(ThresholdValidator::new(readings, staleness)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidatorStrategy::Majority => "majority",
            ValidatorStrategy::Threshold => "threshold",
        }
    }
}
