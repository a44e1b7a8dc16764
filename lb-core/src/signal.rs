//! Signal sampling primitives
//!
//! The decoder never touches hardware or `std::time` directly. It samples through a
//! [`SignalSource`] and measures through a [`Clock`], so the same code runs against
//! GPIO pins with the monotonic clock and against simulated waveforms with a
//! virtual clock in tests.
//!
//! All waiting is busy polling with an explicit deadline. Every poll also checks the
//! loop's stop flag, which bounds how long a shutdown can be delayed by a decode
//! attempt in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use lb_error::Result;

use crate::types::Channel;

/// Non-blocking access to the raw electrical level of each channel.
pub trait SignalSource: Send {
    /// Current level of `channel` (`true` = high).
    fn read_level(&self, channel: Channel) -> Result<bool>;
}

impl<S: SignalSource + ?Sized> SignalSource for Box<S> {
    fn read_level(&self, channel: Channel) -> Result<bool> {
        (**self).read_level(channel)
    }
}

/// Time source for the decoder and validator.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary, fixed origin.
    fn now(&self) -> Duration;

    /// Wait for `duration`. Only used for short settle delays.
    fn sleep(&self, duration: Duration);

    /// Wall-clock time used to stamp published detections.
    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Real clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// How a bounded wait on an active pulse ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// The line went idle; carries the pulse width measured from the start instant.
    Released(Duration),
    /// Still active past the limit.
    Expired,
    /// The stop flag was raised.
    Interrupted,
}

/// One channel bound to its sampler, clock, polarity and stop flag for the
/// duration of a decode attempt.
pub struct Line<'a> {
    source: &'a dyn SignalSource,
    clock: &'a dyn Clock,
    channel: Channel,
    idle_level: bool,
    stop: &'a AtomicBool,
}

impl<'a> Line<'a> {
    /// `active_low` lines idle high and carry pulses as low levels (the usual
    /// demodulating IR receiver output).
    pub fn new(
        source: &'a dyn SignalSource,
        clock: &'a dyn Clock,
        channel: Channel,
        active_low: bool,
        stop: &'a AtomicBool,
    ) -> Self {
        Self {
            source,
            clock,
            channel,
            idle_level: active_low,
            stop,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn settle(&self, duration: Duration) {
        if !duration.is_zero() {
            self.clock.sleep(duration);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Whether a pulse is on the line right now.
    pub fn is_active(&self) -> Result<bool> {
        Ok(self.source.read_level(self.channel)? != self.idle_level)
    }

    /// Poll until the current pulse ends, measuring from `since`.
    ///
    /// A pulse that ends exactly at `limit` counts as released.
    pub fn hold_while_active(&self, since: Duration, limit: Duration) -> Result<Hold> {
        loop {
            if self.is_stopped() {
                return Ok(Hold::Interrupted);
            }
            let elapsed = self.now().saturating_sub(since);
            if !self.is_active()? {
                return Ok(Hold::Released(elapsed));
            }
            if elapsed > limit {
                return Ok(Hold::Expired);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimClock, SimSignal, Waveform};
    use std::sync::Arc;

    fn fixture(waveform: Waveform) -> (Arc<SimClock>, SimSignal) {
        let clock = Arc::new(SimClock::new(Duration::from_micros(1)));
        let signal = SimSignal::virtual_time(clock.clone()).with_channel(Channel(1), waveform);
        (clock, signal)
    }

    #[test]
    fn test_hold_measures_pulse_width() {
        let wave = Waveform::builder(true).active(Duration::from_micros(3_000)).build();
        let (clock, signal) = fixture(wave);
        let stop = AtomicBool::new(false);
        let line = Line::new(&signal, clock.as_ref(), Channel(1), true, &stop);

        let since = line.now();
        let hold = line.hold_while_active(since, Duration::from_micros(8_000)).unwrap();
        assert_eq!(hold, Hold::Released(Duration::from_micros(3_000)));
    }

    #[test]
    fn test_hold_expires_on_stuck_line() {
        let wave = Waveform::builder(true).active(Duration::from_secs(1)).build();
        let (clock, signal) = fixture(wave);
        let stop = AtomicBool::new(false);
        let line = Line::new(&signal, clock.as_ref(), Channel(1), true, &stop);

        let hold = line.hold_while_active(line.now(), Duration::from_micros(500)).unwrap();
        assert_eq!(hold, Hold::Expired);
        assert!(clock.now() < Duration::from_micros(600));
    }

    #[test]
    fn test_hold_interrupted_by_stop_flag() {
        let wave = Waveform::builder(true).active(Duration::from_secs(1)).build();
        let (clock, signal) = fixture(wave);
        let stop = AtomicBool::new(true);
        let line = Line::new(&signal, clock.as_ref(), Channel(1), true, &stop);

        let hold = line.hold_while_active(line.now(), Duration::from_secs(1)).unwrap();
        assert_eq!(hold, Hold::Interrupted);
    }

    #[test]
    fn test_polarity() {
        // Active-high line: a high level is a pulse.
        let wave = Waveform::builder(false).active(Duration::from_millis(1)).build();
        let clock = Arc::new(SimClock::new(Duration::from_micros(1)));
        let signal = SimSignal::virtual_time(clock.clone()).with_channel(Channel(1), wave);
        let stop = AtomicBool::new(false);
        let line = Line::new(&signal, clock.as_ref(), Channel(1), false, &stop);
        assert!(line.is_active().unwrap());
    }
}
