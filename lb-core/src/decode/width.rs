//! Pulse-width scheme with count cross-check

use std::time::Duration;

use lb_error::Result;
use tracing::trace;

use super::{check_start_pulse, count_pulses, DecodeOutcome, DecodeTiming, PulseDecoder, Rejection};
use crate::signal::{Hold, Line};
use crate::types::VehicleId;

/// Start pulse, ID pulse of `max + 1 - id` units, then `id` short pulses.
#[derive(Debug, Clone)]
pub struct PulseWidthDecoder {
    timing: DecodeTiming,
    max_vehicles: u8,
}

impl PulseWidthDecoder {
    pub fn new(timing: DecodeTiming, max_vehicles: u8) -> Self {
        Self {
            timing,
            max_vehicles,
        }
    }

    /// Width in whole units, rounded to nearest.
    fn units(&self, width: Duration) -> i64 {
        let unit = self.timing.id_pulse_unit.as_nanos().max(1);
        ((width.as_nanos() + unit / 2) / unit) as i64
    }
}

impl PulseDecoder for PulseWidthDecoder {
    fn decode(&self, line: &Line<'_>) -> Result<DecodeOutcome> {
        if let Some(rejection) = check_start_pulse(line, &self.timing)? {
            return Ok(DecodeOutcome::NoCandidate(rejection));
        }

        line.settle(self.timing.id_pulse_gap);

        let width = match line.hold_while_active(line.now(), self.timing.id_pulse_timeout)? {
            Hold::Released(width) => width,
            Hold::Expired => return Ok(DecodeOutcome::NoCandidate(Rejection::IdPulseTimeout)),
            Hold::Interrupted => return Ok(DecodeOutcome::NoCandidate(Rejection::Interrupted)),
        };

        let raw = self.max_vehicles as i64 + 1 - self.units(width);
        let width_id = match VehicleId::from_signed(raw, self.max_vehicles) {
            Some(id) => id,
            None => return Ok(DecodeOutcome::NoCandidate(Rejection::OutOfRange(raw))),
        };

        let counted = match count_pulses(
            line,
            self.timing.pulse_count_window,
            self.timing.inter_pulse_delay,
        )? {
            Some(n) => n,
            None => return Ok(DecodeOutcome::NoCandidate(Rejection::Interrupted)),
        };
        trace!(
            "Channel {}: id pulse {:?} -> {}, counted {}",
            line.channel(),
            width,
            width_id,
            counted
        );

        if counted != width_id.get() as u32 {
            return Ok(DecodeOutcome::NoCandidate(Rejection::CrossCheckMismatch {
                width_id: width_id.get(),
                counted,
            }));
        }

        Ok(DecodeOutcome::Candidate(width_id))
    }

    fn name(&self) -> &'static str {
        "pulse_width"
    }
}
