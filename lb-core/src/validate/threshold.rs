//! Hit-count validation keyed by identifier

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::debug;

use super::ReadingValidator;
use crate::types::{Channel, VehicleId};

#[derive(Debug, Default)]
struct Hits {
    channels: VecDeque<Channel>,
    last_hit: Option<Duration>,
}

/// Confirms an identifier on its `R`-th hit, from any channel, within the
/// staleness horizon. History for that identifier restarts after each confirmation.
#[derive(Debug)]
pub struct ThresholdValidator {
    threshold: usize,
    staleness: Duration,
    hits: HashMap<VehicleId, Hits>,
}

impl ThresholdValidator {
    pub fn new(threshold: usize, staleness: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            staleness,
            hits: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Hits accumulated for `id` since its last reset.
    pub fn pending(&self, id: VehicleId) -> usize {
        self.hits.get(&id).map_or(0, |h| h.channels.len())
    }
}

impl ReadingValidator for ThresholdValidator {
    fn validate(&mut self, channel: Channel, candidate: VehicleId, now: Duration) -> Option<VehicleId> {
        let entry = self.hits.entry(candidate).or_default();

        if let Some(last) = entry.last_hit {
            if now.saturating_sub(last) > self.staleness {
                entry.channels.clear();
            }
        }
        entry.channels.push_back(channel);
        entry.last_hit = Some(now);

        if entry.channels.len() < self.threshold {
            return None;
        }

        debug!(
            "Vehicle {} reached {} hits (channels {:?})",
            candidate, self.threshold, entry.channels
        );
        entry.channels.clear();
        Some(candidate)
    }

    fn reset(&mut self) {
        self.hits.clear();
    }

    fn tracked_keys(&self) -> usize {
        self.hits.len()
    }

    fn name(&self) -> &'static str {
        "threshold"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: u32) -> VehicleId {
        VehicleId::new(v, 8).unwrap()
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_confirms_exactly_on_rth_hit() {
        let mut validator = ThresholdValidator::new(4, ms(1000));
        for i in 0..3 {
            assert_eq!(validator.validate(Channel(1), id(3), ms(i * 50)), None);
        }
        assert_eq!(validator.validate(Channel(1), id(3), ms(150)), Some(id(3)));
        assert_eq!(validator.pending(id(3)), 0);
    }

    #[test]
    fn test_stale_gap_resets() {
        let mut validator = ThresholdValidator::new(4, ms(1000));
        for i in 0..3 {
            assert_eq!(validator.validate(Channel(1), id(3), ms(i * 50)), None);
        }
        assert_eq!(validator.validate(Channel(1), id(3), ms(100 + 1_001)), None);
        assert_eq!(validator.pending(id(3)), 1);
    }

    #[test]
    fn test_gap_equal_to_horizon_is_not_stale() {
        let mut validator = ThresholdValidator::new(2, ms(1000));
        assert_eq!(validator.validate(Channel(1), id(1), ms(0)), None);
        assert_eq!(validator.validate(Channel(1), id(1), ms(1000)), Some(id(1)));
    }

    #[test]
    fn test_hits_accumulate_across_channels() {
        let mut validator = ThresholdValidator::new(3, ms(1000));
        assert_eq!(validator.validate(Channel(1), id(7), ms(0)), None);
        assert_eq!(validator.validate(Channel(2), id(7), ms(10)), None);
        assert_eq!(validator.validate(Channel(1), id(7), ms(20)), Some(id(7)));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let mut validator = ThresholdValidator::new(2, ms(1000));
        assert_eq!(validator.validate(Channel(1), id(1), ms(0)), None);
        assert_eq!(validator.validate(Channel(1), id(2), ms(5)), None);
        assert_eq!(validator.validate(Channel(1), id(2), ms(10)), Some(id(2)));
        assert_eq!(validator.pending(id(1)), 1);
        assert_eq!(validator.tracked_keys(), 2);
    }

    #[test]
    fn test_one_confirmation_per_r_hits() {
        let mut validator = ThresholdValidator::new(3, ms(1000));
        let confirmed = (0..9)
            .filter_map(|i| validator.validate(Channel(1), id(4), ms(i * 40)))
            .count();
        assert_eq!(confirmed, 3);
    }
}
