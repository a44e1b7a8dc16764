//! Per-channel re-confirmation interval

use std::collections::HashMap;
use std::time::Duration;

use crate::types::Channel;

/// Drops confirmations that follow the last accepted one on the same channel
/// within `interval`. The first confirmation on a channel always passes.
#[derive(Debug, Clone)]
pub struct Cooldown {
    interval: Duration,
    last: HashMap<Channel, Duration>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Accept and record `now` if more than `interval` has passed on `channel`.
    pub fn try_accept(&mut self, channel: Channel, now: Duration) -> bool {
        if let Some(last) = self.last.get(&channel) {
            if now.saturating_sub(*last) <= self.interval {
                return false;
            }
        }
        self.last.insert(channel, now);
        true
    }

    /// Time of the last accepted confirmation on `channel`.
    pub fn last_accepted(&self, channel: Channel) -> Option<Duration> {
        self.last.get(&channel).copied()
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_confirmation_passes() {
        let mut cooldown = Cooldown::new(Duration::from_millis(20));
        assert!(cooldown.try_accept(Channel(1), Duration::ZERO));
    }

    #[test]
    fn test_within_interval_dropped() {
        let mut cooldown = Cooldown::new(Duration::from_millis(20));
        assert!(cooldown.try_accept(Channel(1), Duration::from_millis(100)));
        assert!(!cooldown.try_accept(Channel(1), Duration::from_millis(110)));
        assert!(!cooldown.try_accept(Channel(1), Duration::from_millis(120)));
        assert!(cooldown.try_accept(Channel(1), Duration::from_millis(121)));
    }

    #[test]
    fn test_dropped_confirmation_does_not_extend() {
        let mut cooldown = Cooldown::new(Duration::from_millis(20));
        assert!(cooldown.try_accept(Channel(1), Duration::ZERO));
        assert!(!cooldown.try_accept(Channel(1), Duration::from_millis(15)));
        assert_eq!(cooldown.last_accepted(Channel(1)), Some(Duration::ZERO));
        assert!(cooldown.try_accept(Channel(1), Duration::from_millis(25)));
    }

    #[test]
    fn test_channels_independent() {
        let mut cooldown = Cooldown::new(Duration::from_millis(20));
        assert!(cooldown.try_accept(Channel(1), Duration::from_millis(5)));
        assert!(cooldown.try_accept(Channel(2), Duration::from_millis(6)));
    }
}
