//! Pulse decoding
//!
//! Turns the timing pattern on one channel into a candidate vehicle identifier.
//!
//! # Frame layout
//!
//! Every transmission opens with a start pulse whose width must fall inside
//! `[start_pulse_min, start_pulse_max]` (both inclusive). What follows depends on the
//! scheme:
//!
//! - **Pulse count** ([`PulseCountDecoder`]): after a settle delay, the number of short
//!   pulses inside the counting window is the identifier.
//! - **Pulse width** ([`PulseWidthDecoder`]): after a fixed gap, an ID pulse of
//!   `max_vehicles + 1 - id` units, followed by `id` short pulses. The count must
//!   agree with the width or the frame is dropped.
//!
//! Decoders hold no state between attempts. Every timing miss ends the attempt with
//! [`DecodeOutcome::NoCandidate`]; only sampling failures are errors.

mod count;
mod width;

use std::fmt;
use std::time::Duration;

use lb_error::Result;
use serde::{Deserialize, Serialize};

use crate::constants::timing;
use crate::signal::{Hold, Line};
use crate::types::VehicleId;

pub use count::{count_pulses, PulseCountDecoder};
pub use width::PulseWidthDecoder;

/// Why an attempt produced no candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// No pulse on the line when sampled.
    Idle,
    /// Start pulse width outside the accepted bounds.
    StartPulseOutOfRange(Duration),
    /// Start pulse still active past `start_pulse_max`.
    StartPulseTimeout,
    /// ID pulse still active past its timeout.
    IdPulseTimeout,
    /// Decoded value outside `[1, max_vehicles]`.
    OutOfRange(i64),
    /// Width and count disagree (pulse-width scheme).
    CrossCheckMismatch { width_id: u8, counted: u32 },
    /// Stop requested mid-attempt.
    Interrupted,
}

impl Rejection {
    /// Stable short name for counters and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::Idle => "idle",
            Rejection::StartPulseOutOfRange(_) => "start_pulse_out_of_range",
            Rejection::StartPulseTimeout => "start_pulse_timeout",
            Rejection::IdPulseTimeout => "id_pulse_timeout",
            Rejection::OutOfRange(_) => "out_of_range",
            Rejection::CrossCheckMismatch { .. } => "cross_check_mismatch",
            Rejection::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::StartPulseOutOfRange(width) => {
                write!(f, "start pulse {:.3}ms out of range", width.as_secs_f64() * 1000.0)
            }
            Rejection::OutOfRange(value) => write!(f, "decoded value {} out of range", value),
            Rejection::CrossCheckMismatch { width_id, counted } => {
                write!(f, "width says {} but counted {} pulses", width_id, counted)
            }
            other => f.write_str(other.kind()),
        }
    }
}

/// Result of one decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Candidate(VehicleId),
    NoCandidate(Rejection),
}

impl DecodeOutcome {
    pub fn candidate(self) -> Option<VehicleId> {
        match self {
            DecodeOutcome::Candidate(id) => Some(id),
            DecodeOutcome::NoCandidate(_) => None,
        }
    }
}

/// A decoding strategy.
pub trait PulseDecoder: Send + Sync {
    /// Run one attempt on `line`.
    fn decode(&self, line: &Line<'_>) -> Result<DecodeOutcome>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Which encoding the beacons use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecodeScheme {
    #[default]
    PulseCount,
    PulseWidth,
}

impl DecodeScheme {
    pub fn decoder(self, timing: DecodeTiming, max_vehicles: u8) -> Box<dyn PulseDecoder> {
        match self {
            DecodeScheme::PulseCount => Box::new(PulseCountDecoder::new(timing, max_vehicles)),
            DecodeScheme::PulseWidth => Box::new(PulseWidthDecoder::new(timing, max_vehicles)),
        }
    }
}

/// Timing parameters shared by both schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeTiming {
    pub start_pulse_min: Duration,
    pub start_pulse_max: Duration,
    pub post_start_delay: Duration,
    pub id_pulse_gap: Duration,
    pub id_pulse_timeout: Duration,
    pub id_pulse_unit: Duration,
    pub pulse_count_window: Duration,
    pub inter_pulse_delay: Duration,
}

impl Default for DecodeTiming {
    fn default() -> Self {
        Self {
            start_pulse_min: timing::START_PULSE_MIN,
            start_pulse_max: timing::START_PULSE_MAX,
            post_start_delay: timing::POST_START_DELAY,
            id_pulse_gap: timing::ID_PULSE_GAP,
            id_pulse_timeout: timing::ID_PULSE_TIMEOUT,
            id_pulse_unit: timing::ID_PULSE_UNIT,
            pulse_count_window: timing::PULSE_COUNT_WINDOW,
            inter_pulse_delay: timing::INTER_PULSE_DELAY,
        }
    }
}

impl DecodeTiming {
    pub fn accepts_start_pulse(&self, width: Duration) -> bool {
        width >= self.start_pulse_min && width <= self.start_pulse_max
    }
}

/// Shared first stage: require an active line and a start pulse within bounds.
///
/// Returns `Ok(None)` once the start pulse has been validated and the line released.
pub(crate) fn check_start_pulse(line: &Line<'_>, timing: &DecodeTiming) -> Result<Option<Rejection>> {
    let since = line.now();
    if !line.is_active()? {
        return Ok(Some(Rejection::Idle));
    }
    let width = match line.hold_while_active(since, timing.start_pulse_max)? {
        Hold::Released(width) => width,
        Hold::Expired => return Ok(Some(Rejection::StartPulseTimeout)),
        Hold::Interrupted => return Ok(Some(Rejection::Interrupted)),
    };
    if !timing.accepts_start_pulse(width) {
        return Ok(Some(Rejection::StartPulseOutOfRange(width)));
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::sim::{SimClock, SimSignal, Waveform};
    use crate::types::Channel;

    pub fn run(decoder: &dyn PulseDecoder, waveform: Waveform) -> DecodeOutcome {
        let clock = Arc::new(SimClock::new(Duration::from_micros(1)));
        let signal = SimSignal::virtual_time(clock.clone()).with_channel(Channel(1), waveform);
        let stop = AtomicBool::new(false);
        let line = Line::new(&signal, clock.as_ref(), Channel(1), true, &stop);
        decoder.decode(&line).unwrap()
    }

    pub fn ms(v: f64) -> Duration {
        Duration::from_micros((v * 1000.0).round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{ms, run};
    use super::*;
    use crate::sim::Waveform;
    use crate::signal::SignalSource;
    use crate::types::Channel;
    use mockall::mock;
    use std::sync::atomic::AtomicBool;

    mock! {
        Source {}
        impl SignalSource for Source {
            fn read_level(&self, channel: Channel) -> Result<bool>;
        }
    }

    fn start_pulse_then_one(width: Duration) -> Waveform {
        Waveform::builder(true)
            .active(width)
            .idle(ms(2.0))
            .active(ms(1.0))
            .idle(ms(30.0))
            .build()
    }

    #[test]
    fn test_idle_line_reads_once() {
        let mut source = MockSource::new();
        source
            .expect_read_level()
            .times(1)
            .returning(|_| Ok(true));
        let clock = crate::sim::SimClock::new(Duration::from_micros(1));
        let stop = AtomicBool::new(false);
        let line = Line::new(&source, &clock, Channel(2), true, &stop);

        let decoder = PulseCountDecoder::new(DecodeTiming::default(), 8);
        let outcome = decoder.decode(&line).unwrap();
        assert_eq!(outcome, DecodeOutcome::NoCandidate(Rejection::Idle));
    }

    #[test]
    fn test_sampling_error_propagates() {
        let mut source = MockSource::new();
        source
            .expect_read_level()
            .returning(|ch| Err(lb_error::LapbeaconError::UnknownChannel(ch.id())));
        let clock = crate::sim::SimClock::new(Duration::from_micros(1));
        let stop = AtomicBool::new(false);
        let line = Line::new(&source, &clock, Channel(3), true, &stop);

        let decoder = PulseWidthDecoder::new(DecodeTiming::default(), 8);
        assert!(decoder.decode(&line).is_err());
    }

    #[test]
    fn test_start_pulse_inclusive_bounds() {
        let decoder = PulseCountDecoder::new(DecodeTiming::default(), 8);
        for accepted in [3.0, 5.0, 8.0] {
            let outcome = run(&decoder, start_pulse_then_one(ms(accepted)));
            assert!(
                !matches!(outcome, DecodeOutcome::NoCandidate(Rejection::StartPulseOutOfRange(_))),
                "{}ms start pulse should pass the start stage, got {:?}",
                accepted,
                outcome
            );
        }
    }

    #[test]
    fn test_start_pulse_too_short() {
        let decoder = PulseCountDecoder::new(DecodeTiming::default(), 8);
        let outcome = run(&decoder, start_pulse_then_one(ms(2.9)));
        assert_eq!(
            outcome,
            DecodeOutcome::NoCandidate(Rejection::StartPulseOutOfRange(ms(2.9)))
        );
    }

    #[test]
    fn test_start_pulse_too_long() {
        let decoder = PulseCountDecoder::new(DecodeTiming::default(), 8);
        let outcome = run(&decoder, start_pulse_then_one(ms(8.5)));
        assert_eq!(outcome, DecodeOutcome::NoCandidate(Rejection::StartPulseTimeout));
    }

    #[test]
    fn test_rejection_display() {
        let r = Rejection::CrossCheckMismatch { width_id: 6, counted: 5 };
        assert_eq!(r.to_string(), "width says 6 but counted 5 pulses");
        assert_eq!(Rejection::Idle.to_string(), "idle");
    }
}
