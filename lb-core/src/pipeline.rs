//! Detection loop
//!
//! Polls every channel in a fixed order through the decoder, feeds candidates to
//! the validator, gates confirmations through the cool-down and publishes the
//! survivors to the [`DetectionBoard`].
//!
//! The loop never stops on a failed decode. A sampling error is counted and logged
//! against its own channel and polling moves on to the next one; only the stop
//! flag ends the loop. The error backoff applies once every channel keeps failing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lb_error::{LapbeaconError, Result};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::board::{ConfirmedDetection, DetectionBoard};
use crate::config::DetectorConfig;
use crate::constants::detection::{ERROR_BACKOFF, MAX_CONSECUTIVE_ERRORS};
use crate::decode::{DecodeOutcome, PulseDecoder, Rejection};
use crate::signal::{Clock, Line, SignalSource};
use crate::types::{Channel, VehicleId};
use crate::validate::{Cooldown, ReadingValidator};

/// A detection that survived validation and the cool-down.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub channel: Channel,
    pub vehicle: VehicleId,
    /// Monotonic time of the confirming reading
    pub at: Duration,
    /// The record as published
    pub detection: Arc<ConfirmedDetection>,
}

/// Counters kept by the loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub iterations: u64,
    pub attempts: u64,
    pub candidates: u64,
    pub rejections: BTreeMap<&'static str, u64>,
    /// Confirmations dropped by the cool-down
    pub suppressed: u64,
    /// Published confirmations per vehicle
    pub confirmed: BTreeMap<u8, u64>,
    pub errors: u64,
}

impl PipelineStats {
    fn reject(&mut self, rejection: Rejection) {
        *self.rejections.entry(rejection.kind()).or_insert(0) += 1;
    }

    pub fn total_confirmed(&self) -> u64 {
        self.confirmed.values().sum()
    }

    /// Rejections other than an idle line.
    pub fn total_rejected(&self) -> u64 {
        self.rejections
            .iter()
            .filter(|(kind, _)| **kind != Rejection::Idle.kind())
            .map(|(_, n)| n)
            .sum()
    }
}

/// Decoder, validator, cool-down and board wired together.
pub struct DetectionPipeline {
    channels: Vec<Channel>,
    decoder: Box<dyn PulseDecoder>,
    validator: Box<dyn ReadingValidator>,
    cooldown: Cooldown,
    board: Arc<DetectionBoard>,
    active_low: bool,
    clear_after: Option<Duration>,
    last_published: Option<Duration>,
    /// Consecutive sampling errors, indexed like `channels`
    consecutive_errors: Vec<u32>,
    stats: PipelineStats,
}

impl DetectionPipeline {
    pub fn new(
        channels: Vec<Channel>,
        decoder: Box<dyn PulseDecoder>,
        validator: Box<dyn ReadingValidator>,
        cooldown: Cooldown,
        board: Arc<DetectionBoard>,
    ) -> Self {
        Self {
            consecutive_errors: vec![0; channels.len()],
            channels,
            decoder,
            validator,
            cooldown,
            board,
            active_low: true,
            clear_after: None,
            last_published: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn from_config(config: &DetectorConfig, board: Arc<DetectionBoard>) -> Self {
        Self::new(
            config.channel_ids(),
            config.build_decoder(),
            config.build_validator(),
            config.build_cooldown(),
            board,
        )
        .with_active_low(config.active_low)
        .with_clear_after(config.clear_after())
    }

    pub fn with_active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }

    /// Clear the board this long after the last published confirmation.
    pub fn with_clear_after(mut self, clear_after: Option<Duration>) -> Self {
        self.clear_after = clear_after;
        self
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn board(&self) -> &Arc<DetectionBoard> {
        &self.board
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    pub fn validator_name(&self) -> &'static str {
        self.validator.name()
    }

    /// One decode attempt on `channel`, then validation and gating.
    pub fn poll_channel(
        &mut self,
        source: &dyn SignalSource,
        clock: &dyn Clock,
        channel: Channel,
        stop: &AtomicBool,
    ) -> Result<Option<Confirmation>> {
        self.stats.attempts += 1;
        let line = Line::new(source, clock, channel, self.active_low, stop);

        let candidate = match self.decoder.decode(&line)? {
            DecodeOutcome::Candidate(id) => id,
            DecodeOutcome::NoCandidate(rejection) => {
                if rejection != Rejection::Idle {
                    trace!("Channel {}: no candidate ({})", channel, rejection);
                }
                self.stats.reject(rejection);
                return Ok(None);
            }
        };

        self.stats.candidates += 1;
        let now = clock.now();
        debug!("Channel {}: candidate vehicle {}", channel, candidate);

        let vehicle = match self.validator.validate(channel, candidate, now) {
            Some(vehicle) => vehicle,
            None => return Ok(None),
        };

        if !self.cooldown.try_accept(channel, now) {
            self.stats.suppressed += 1;
            debug!(
                "Channel {}: vehicle {} confirmed again within {:?}, dropped",
                channel,
                vehicle,
                self.cooldown.interval()
            );
            return Ok(None);
        }

        let detection = self.board.publish(vehicle, clock.wall());
        self.last_published = Some(now);
        *self.stats.confirmed.entry(vehicle.get()).or_insert(0) += 1;
        info!("Vehicle {} confirmed on channel {}", vehicle, channel);

        Ok(Some(Confirmation {
            channel,
            vehicle,
            at: now,
            detection,
        }))
    }

    /// Clear the board once `clear_after` has passed since the last confirmation.
    pub fn expire(&mut self, now: Duration) {
        if let (Some(clear_after), Some(last)) = (self.clear_after, self.last_published) {
            if now.saturating_sub(last) >= clear_after {
                debug!("Clearing detection record after {:?}", clear_after);
                self.board.clear();
                self.last_published = None;
            }
        }
    }

    /// Poll each channel once, in order.
    ///
    /// A channel whose source fails is skipped for this iteration; the others are
    /// still polled.
    pub fn run_iteration(
        &mut self,
        source: &dyn SignalSource,
        clock: &dyn Clock,
        stop: &AtomicBool,
    ) -> Vec<Confirmation> {
        self.stats.iterations += 1;
        let mut confirmations = Vec::new();

        for i in 0..self.channels.len() {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let channel = self.channels[i];
            match self.poll_channel(source, clock, channel, stop) {
                Ok(confirmation) => {
                    self.channel_recovered(i);
                    confirmations.extend(confirmation);
                }
                Err(e) => self.channel_failed(i, &e),
            }
        }

        if self.all_channels_failing() {
            clock.sleep(ERROR_BACKOFF);
        }

        self.expire(clock.now());
        confirmations
    }

    fn channel_recovered(&mut self, index: usize) {
        let count = std::mem::take(&mut self.consecutive_errors[index]);
        if count > 0 {
            debug!("Channel {} recovered after {} errors", self.channels[index], count);
        }
    }

    fn channel_failed(&mut self, index: usize, e: &LapbeaconError) {
        self.stats.errors += 1;
        let count = &mut self.consecutive_errors[index];
        *count += 1;
        let count = *count;
        let channel = self.channels[index];

        if count == 1 || count % MAX_CONSECUTIVE_ERRORS == 0 {
            error!("Channel {} sampling error (count: {}): {}", channel, count, e);
        }
        if count == MAX_CONSECUTIVE_ERRORS {
            warn!("Channel {}: too many consecutive sampling errors", channel);
        }
    }

    /// Every channel has reached `MAX_CONSECUTIVE_ERRORS` in a row.
    fn all_channels_failing(&self) -> bool {
        !self.consecutive_errors.is_empty()
            && self
                .consecutive_errors
                .iter()
                .all(|&n| n >= MAX_CONSECUTIVE_ERRORS)
    }

    /// Consecutive sampling errors on `channel`.
    pub fn channel_errors(&self, channel: Channel) -> u32 {
        self.channels
            .iter()
            .position(|&c| c == channel)
            .map_or(0, |i| self.consecutive_errors[i])
    }

    /// Run until `stop` is raised, calling `on_confirm` for every published detection.
    pub fn run_until_stopped<F>(
        &mut self,
        source: &dyn SignalSource,
        clock: &dyn Clock,
        stop: &AtomicBool,
        loop_delay: Duration,
        mut on_confirm: F,
    ) where
        F: FnMut(&Confirmation),
    {
        info!(
            "Detection loop starting: {} channel(s), {} decoder, {} validator",
            self.channels.len(),
            self.decoder.name(),
            self.validator.name()
        );

        while !stop.load(Ordering::SeqCst) {
            for confirmation in &self.run_iteration(source, clock, stop) {
                on_confirm(confirmation);
            }
            clock.sleep(loop_delay);
        }

        info!(
            "Detection loop stopped after {} iterations ({} confirmed, {} errors)",
            self.stats.iterations,
            self.stats.total_confirmed(),
            self.stats.errors
        );
    }
}
