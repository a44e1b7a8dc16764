//! Beacon and clock simulation
//!
//! [`SimClock`] is a virtual monotonic clock in which every level sample costs a fixed
//! tick and `sleep` advances time instantly. [`SimSignal`] plays back per-channel
//! [`Waveform`]s against either that virtual clock (deterministic tests) or the live
//! monotonic clock (`--simulate` runs without hardware).
//!
//! The [`beacon`] module reproduces the frames the vehicle beacons transmit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use lb_error::{LapbeaconError, Result};

use crate::config::DetectorConfig;
use crate::signal::{Clock, MonotonicClock, SignalSource};
use crate::types::{Channel, VehicleId};

/// Virtual clock. Time only moves when sampled or slept on.
#[derive(Debug)]
pub struct SimClock {
    nanos: AtomicU64,
    tick: Duration,
    wall_origin: DateTime<Local>,
}

impl SimClock {
    /// `tick` is the cost of one level sample.
    pub fn new(tick: Duration) -> Self {
        let wall_origin = Local
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .earliest()
            .unwrap_or_else(Local::now);
        Self {
            nanos: AtomicU64::new(0),
            tick,
            wall_origin,
        }
    }

    /// Move time forward without sampling.
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Time of this sample; the clock then moves on by one tick.
    pub fn sample(&self) -> Duration {
        let before = self
            .nanos
            .fetch_add(self.tick.as_nanos() as u64, Ordering::SeqCst);
        Duration::from_nanos(before)
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn wall(&self) -> DateTime<Local> {
        let offset = chrono::Duration::from_std(self.now()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + offset
    }
}

/// Piecewise-constant level over time.
#[derive(Debug, Clone)]
pub struct Waveform {
    idle_level: bool,
    segments: Vec<(bool, Duration)>,
    start: Duration,
    looping: bool,
}

impl Waveform {
    pub fn builder(idle_level: bool) -> WaveformBuilder {
        WaveformBuilder {
            idle_level,
            segments: Vec::new(),
        }
    }

    /// A line that never carries a pulse.
    pub fn flat(idle_level: bool) -> Self {
        Self::builder(idle_level).build()
    }

    /// Shift the whole waveform to begin at `start`; the line is idle before it.
    pub fn starting_at(mut self, start: Duration) -> Self {
        self.start = start;
        self
    }

    pub fn period(&self) -> Duration {
        self.segments.iter().map(|(_, d)| *d).sum()
    }

    /// Level at absolute time `t`. Idle before the start and after the last segment
    /// (unless looping).
    pub fn level_at(&self, t: Duration) -> bool {
        if t < self.start {
            return self.idle_level;
        }
        let mut rel = t - self.start;
        let period = self.period();
        if period.is_zero() {
            return self.idle_level;
        }
        if self.looping {
            rel = Duration::from_nanos((rel.as_nanos() % period.as_nanos()) as u64);
        }
        let mut cursor = Duration::ZERO;
        for (level, len) in &self.segments {
            cursor += *len;
            if rel < cursor {
                return *level;
            }
        }
        self.idle_level
    }
}

pub struct WaveformBuilder {
    idle_level: bool,
    segments: Vec<(bool, Duration)>,
}

impl WaveformBuilder {
    /// Append a pulse (the non-idle level).
    pub fn active(mut self, duration: Duration) -> Self {
        self.segments.push((!self.idle_level, duration));
        self
    }

    /// Append quiet time.
    pub fn idle(mut self, duration: Duration) -> Self {
        self.segments.push((self.idle_level, duration));
        self
    }

    /// Append another waveform's segments.
    pub fn append(mut self, other: &Waveform) -> Self {
        self.segments.extend(other.segments.iter().copied());
        self
    }

    pub fn build(self) -> Waveform {
        Waveform {
            idle_level: self.idle_level,
            segments: self.segments,
            start: Duration::ZERO,
            looping: false,
        }
    }

    /// Repeat the segments forever.
    pub fn build_looping(self) -> Waveform {
        Waveform {
            looping: true,
            ..self.build()
        }
    }
}

#[derive(Debug, Clone)]
enum Timebase {
    Virtual(Arc<SimClock>),
    Live(MonotonicClock),
}

/// Signal source playing waveforms.
#[derive(Debug, Clone)]
pub struct SimSignal {
    timebase: Timebase,
    channels: HashMap<Channel, Waveform>,
}

impl SimSignal {
    /// Samples advance `clock` by its tick.
    pub fn virtual_time(clock: Arc<SimClock>) -> Self {
        Self {
            timebase: Timebase::Virtual(clock),
            channels: HashMap::new(),
        }
    }

    /// Samples read the real monotonic clock.
    pub fn live() -> Self {
        Self {
            timebase: Timebase::Live(MonotonicClock::new()),
            channels: HashMap::new(),
        }
    }

    pub fn with_channel(mut self, channel: Channel, waveform: Waveform) -> Self {
        self.channels.insert(channel, waveform);
        self
    }

    pub fn set_channel(&mut self, channel: Channel, waveform: Waveform) {
        self.channels.insert(channel, waveform);
    }
}

impl SignalSource for SimSignal {
    fn read_level(&self, channel: Channel) -> Result<bool> {
        let t = match &self.timebase {
            Timebase::Virtual(clock) => clock.sample(),
            Timebase::Live(clock) => clock.now(),
        };
        self.channels
            .get(&channel)
            .map(|wave| wave.level_at(t))
            .ok_or(LapbeaconError::UnknownChannel(channel.id()))
    }
}

/// Parse a `CHANNEL=ID[,CHANNEL=ID...]` beacon assignment.
pub fn parse_assignments(spec: &str) -> Result<Vec<(Channel, u8)>> {
    spec.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| -> Result<(Channel, u8)> {
            let (channel, id) = part
                .split_once('=')
                .ok_or_else(|| LapbeaconError::config(format!("expected CHANNEL=ID, got '{}'", part)))?;
            let channel = channel
                .trim()
                .parse::<u8>()
                .map_err(|e| LapbeaconError::config(format!("bad channel '{}': {}", channel, e)))?;
            let id = id
                .trim()
                .parse::<u8>()
                .map_err(|e| LapbeaconError::config(format!("bad vehicle id '{}': {}", id, e)))?;
            Ok((Channel(channel), id))
        })
        .collect()
}

impl SimSignal {
    /// Live-clock source with continuously transmitting beacons on the assigned
    /// channels and idle lines on the rest.
    pub fn live_beacons(config: &DetectorConfig, assignments: &[(Channel, u8)]) -> Result<Self> {
        let max = config.max_vehicles();
        let encoding = beacon::Encoding::from(config.scheme);
        let mut signal = Self::live();

        for channel in config.channel_ids() {
            signal.set_channel(channel, Waveform::flat(config.active_low));
        }
        for &(channel, id) in assignments {
            if !config.channel_ids().contains(&channel) {
                return Err(LapbeaconError::UnknownChannel(channel.id()));
            }
            if VehicleId::new(id as u32, max).is_none() {
                return Err(LapbeaconError::config(format!(
                    "vehicle id {} outside 1..={}",
                    id, max
                )));
            }
            signal.set_channel(
                channel,
                beacon::continuous(encoding, id, max, config.active_low),
            );
        }
        Ok(signal)
    }
}

/// Frames as transmitted by the vehicle beacons.
pub mod beacon {
    use super::*;
    use crate::constants::{beacon as fw, timing};
    use crate::decode::DecodeScheme;

    /// Which identifier encoding the beacon emits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Encoding {
        /// Start pulse, then `id` short pulses.
        PulseCount,
        /// Start pulse, ID pulse of `(max + 1 - id)` units, then `id` short pulses.
        PulseWidth,
    }

    impl From<DecodeScheme> for Encoding {
        fn from(scheme: DecodeScheme) -> Self {
            match scheme {
                DecodeScheme::PulseCount => Encoding::PulseCount,
                DecodeScheme::PulseWidth => Encoding::PulseWidth,
            }
        }
    }

    fn id_pulses(mut builder: WaveformBuilder, id: u8) -> WaveformBuilder {
        for _ in 0..id {
            builder = builder.active(fw::ID_PULSE).idle(fw::ID_GAP);
        }
        builder
    }

    /// One complete frame including the trailing quiet time.
    pub fn frame(encoding: Encoding, id: u8, max_vehicles: u8, idle_level: bool) -> Waveform {
        let builder = Waveform::builder(idle_level).active(fw::START_PULSE);
        let builder = match encoding {
            Encoding::PulseCount => builder.idle(fw::START_GAP),
            Encoding::PulseWidth => {
                let units = (max_vehicles as u32 + 1).saturating_sub(id as u32);
                builder
                    .idle(timing::ID_PULSE_GAP)
                    .active(timing::ID_PULSE_UNIT * units)
                    .idle(fw::ID_GAP)
            }
        };
        id_pulses(builder, id).idle(fw::FRAME_GAP).build()
    }

    /// The beacon transmitting continuously.
    pub fn continuous(encoding: Encoding, id: u8, max_vehicles: u8, idle_level: bool) -> Waveform {
        Waveform::builder(idle_level)
            .append(&frame(encoding, id, max_vehicles, idle_level))
            .build_looping()
    }

    /// `count` back-to-back frames, then silence.
    pub fn burst(encoding: Encoding, id: u8, max_vehicles: u8, idle_level: bool, count: usize) -> Waveform {
        let one = frame(encoding, id, max_vehicles, idle_level);
        let mut builder = Waveform::builder(idle_level);
        for _ in 0..count {
            builder = builder.append(&one);
        }
        builder.build()
    }
}
