//! Pulse-count scheme

use std::time::Duration;

use lb_error::Result;
use tracing::trace;

use super::{check_start_pulse, DecodeOutcome, DecodeTiming, PulseDecoder, Rejection};
use crate::signal::{Hold, Line};
use crate::types::VehicleId;

/// Count the pulses that begin inside `window`, starting now.
///
/// Each pulse is waited out and followed by `gap` before the line is sampled again.
/// Returns `None` if the stop flag is raised.
pub fn count_pulses(line: &Line<'_>, window: Duration, gap: Duration) -> Result<Option<u32>> {
    let since = line.now();
    let mut count = 0u32;

    loop {
        if line.is_stopped() {
            return Ok(None);
        }
        let elapsed = line.now().saturating_sub(since);
        if elapsed >= window {
            break;
        }
        if line.is_active()? {
            count += 1;
            let remaining = window - elapsed;
            if line.hold_while_active(line.now(), remaining)? == Hold::Interrupted {
                return Ok(None);
            }
            line.settle(gap);
        }
    }

    Ok(Some(count))
}

/// Start pulse, then `id` short pulses.
#[derive(Debug, Clone)]
pub struct PulseCountDecoder {
    timing: DecodeTiming,
    max_vehicles: u8,
}

impl PulseCountDecoder {
    pub fn new(timing: DecodeTiming, max_vehicles: u8) -> Self {
        Self {
            timing,
            max_vehicles,
        }
    }
}

impl PulseDecoder for PulseCountDecoder {
    fn decode(&self, line: &Line<'_>) -> Result<DecodeOutcome> {
        if let Some(rejection) = check_start_pulse(line, &self.timing)? {
            return Ok(DecodeOutcome::NoCandidate(rejection));
        }

        line.settle(self.timing.post_start_delay);

        let counted = match count_pulses(
            line,
            self.timing.pulse_count_window,
            self.timing.inter_pulse_delay,
        )? {
            Some(n) => n,
            None => return Ok(DecodeOutcome::NoCandidate(Rejection::Interrupted)),
        };
        trace!("Channel {}: counted {} pulses", line.channel(), counted);

        Ok(match VehicleId::new(counted, self.max_vehicles) {
            Some(id) => DecodeOutcome::Candidate(id),
            None => DecodeOutcome::NoCandidate(Rejection::OutOfRange(counted as i64)),
        })
    }

    fn name(&self) -> &'static str {
        "pulse_count"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ms, run};
    use super::*;
    use crate::signal::Clock;
    use crate::sim::beacon::{self, Encoding};
    use crate::sim::{SimClock, SimSignal, Waveform};
    use crate::types::Channel;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn frame_with_pulses(n: usize) -> Waveform {
        let mut builder = Waveform::builder(true).active(ms(5.0)).idle(ms(2.0));
        for _ in 0..n {
            builder = builder.active(ms(1.0)).idle(ms(1.0));
        }
        builder.idle(ms(20.0)).build()
    }

    #[test]
    fn test_decodes_every_beacon_id() {
        let decoder = PulseCountDecoder::new(DecodeTiming::default(), 8);
        for id in 1..=8u8 {
            let outcome = run(&decoder, beacon::frame(Encoding::PulseCount, id, 8, true));
            assert_eq!(outcome.candidate().map(VehicleId::get), Some(id), "id {}", id);
        }
    }

    #[test]
    fn test_zero_pulses_rejected() {
        let decoder = PulseCountDecoder::new(DecodeTiming::default(), 8);
        let outcome = run(&decoder, frame_with_pulses(0));
        assert_eq!(outcome, DecodeOutcome::NoCandidate(Rejection::OutOfRange(0)));
    }

    #[test]
    fn test_too_many_pulses_rejected() {
        let decoder = PulseCountDecoder::new(DecodeTiming::default(), 8);
        let outcome = run(&decoder, frame_with_pulses(9));
        assert_eq!(outcome, DecodeOutcome::NoCandidate(Rejection::OutOfRange(9)));
    }

    #[test]
    fn test_smaller_id_space() {
        let decoder = PulseCountDecoder::new(DecodeTiming::default(), 4);
        let outcome = run(&decoder, frame_with_pulses(5));
        assert_eq!(outcome, DecodeOutcome::NoCandidate(Rejection::OutOfRange(5)));
        let outcome = run(&decoder, frame_with_pulses(4));
        assert_eq!(outcome.candidate().map(VehicleId::get), Some(4));
    }

    #[test]
    fn test_stop_flag_interrupts() {
        let clock = Arc::new(SimClock::new(Duration::from_micros(1)));
        let signal = SimSignal::virtual_time(clock.clone())
            .with_channel(Channel(1), frame_with_pulses(3));
        let stop = AtomicBool::new(true);
        let line = Line::new(&signal, clock.as_ref(), Channel(1), true, &stop);

        let decoder = PulseCountDecoder::new(DecodeTiming::default(), 8);
        let outcome = decoder.decode(&line).unwrap();
        assert_eq!(outcome, DecodeOutcome::NoCandidate(Rejection::Interrupted));
    }

    #[test]
    fn test_count_window_bounds_the_attempt() {
        let clock = Arc::new(SimClock::new(Duration::from_micros(1)));
        let signal = SimSignal::virtual_time(clock.clone()).with_channel(Channel(1), Waveform::flat(true));
        let stop = AtomicBool::new(false);
        let line = Line::new(&signal, clock.as_ref(), Channel(1), true, &stop);

        let counted = count_pulses(&line, ms(2.0), ms(0.2)).unwrap();
        assert_eq!(counted, Some(0));
        assert!(clock.now() >= ms(2.0));
        assert!(clock.now() < ms(2.1));
    }
}
