//! Majority-of-window validation keyed by channel

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::debug;

use super::ReadingValidator;
use crate::types::{Channel, VehicleId};

/// Last `W` readings per channel; confirms a strict majority of at least `W - 1`.
#[derive(Debug)]
pub struct MajorityValidator {
    window: usize,
    staleness: Duration,
    history: HashMap<Channel, VecDeque<(VehicleId, Duration)>>,
}

impl MajorityValidator {
    pub fn new(window: usize, staleness: Duration) -> Self {
        Self {
            window: window.max(1),
            staleness,
            history: HashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Readings currently held for `channel`.
    pub fn history_len(&self, channel: Channel) -> usize {
        self.history.get(&channel).map_or(0, VecDeque::len)
    }

    /// The strict most frequent value with its count, if there is one.
    fn strict_mode(readings: &VecDeque<(VehicleId, Duration)>) -> Option<(VehicleId, usize)> {
        let mut counts: HashMap<VehicleId, usize> = HashMap::new();
        for (id, _) in readings {
            *counts.entry(*id).or_insert(0) += 1;
        }
        let best = counts.values().copied().max()?;
        let mut leaders = counts.iter().filter(|(_, n)| **n == best);
        let (id, _) = leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        Some((*id, best))
    }
}

impl ReadingValidator for MajorityValidator {
    fn validate(&mut self, channel: Channel, candidate: VehicleId, now: Duration) -> Option<VehicleId> {
        let staleness = self.staleness;
        let readings = self.history.entry(channel).or_default();

        readings.retain(|(_, at)| now.saturating_sub(*at) <= staleness);
        readings.push_back((candidate, now));
        while readings.len() > self.window {
            readings.pop_front();
        }

        if readings.len() < self.window {
            return None;
        }

        match Self::strict_mode(readings) {
            Some((id, count)) if id == candidate && count + 1 >= self.window => {
                debug!(
                    "Channel {}: vehicle {} holds {}/{} readings",
                    channel, id, count, self.window
                );
                Some(id)
            }
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.history.clear();
    }

    fn tracked_keys(&self) -> usize {
        self.history.len()
    }

    fn name(&self) -> &'static str {
        "majority"
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

    fn feed(validator: &mut MajorityValidator, channel: Channel, ids: &[u32]) -> Vec<Option<VehicleId>> {
        ids.iter()
            .enumerate()
            .map(|(i, v)| validator.validate(channel, id(*v), ms(i as u64 * 45)))
            .collect()
    }

    #[test]
    fn test_confirms_window_minus_one() {
        let mut validator = MajorityValidator::new(4, ms(1000));
        let results = feed(&mut validator, Channel(1), &[3, 3, 5, 3]);
        assert_eq!(results, vec![None, None, None, Some(id(3))]);
    }

    #[test]
    fn test_no_confirmation_before_window_full() {
        let mut validator = MajorityValidator::new(6, ms(1000));
        let results = feed(&mut validator, Channel(1), &[2, 2, 2, 2, 2]);
        assert!(results.iter().all(Option::is_none));
    }

    #[test]
    fn test_even_split_confirms_nothing() {
        let mut validator = MajorityValidator::new(4, ms(1000));
        let results = feed(&mut validator, Channel(1), &[1, 2, 1, 2]);
        assert!(results.iter().all(Option::is_none));
    }

    #[test]
    fn test_minority_candidate_not_confirmed() {
        // Majority is 4 but the current reading is 7.
        let mut validator = MajorityValidator::new(4, ms(1000));
        let results = feed(&mut validator, Channel(1), &[4, 4, 4, 7]);
        assert_eq!(results[3], None);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut validator = MajorityValidator::new(3, ms(1000));
        validator.validate(Channel(1), id(2), ms(0));
        validator.validate(Channel(2), id(2), ms(1));
        validator.validate(Channel(1), id(2), ms(2));
        assert_eq!(validator.validate(Channel(2), id(6), ms(3)), None);
        assert_eq!(validator.validate(Channel(1), id(2), ms(4)), Some(id(2)));
        assert_eq!(validator.tracked_keys(), 2);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut validator = MajorityValidator::new(3, ms(1000));
        feed(&mut validator, Channel(1), &[1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(validator.history_len(Channel(1)), 3);
    }

    #[test]
    fn test_stale_readings_purged() {
        let mut validator = MajorityValidator::new(3, ms(1000));
        validator.validate(Channel(1), id(5), ms(0));
        validator.validate(Channel(1), id(5), ms(10));
        // Gap longer than the horizon: the first two no longer count.
        assert_eq!(validator.validate(Channel(1), id(5), ms(2_000)), None);
        assert_eq!(validator.history_len(Channel(1)), 1);
    }
}
