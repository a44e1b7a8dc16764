//! Detector configuration
//!
//! A JSON document where every field falls back to its default from
//! [`crate::constants`], so partial files are fine. Values are checked by
//! [`DetectorConfig::validate`] after loading; a missing file yields the defaults.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lb_error::{LapbeaconError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{channels, limits, paths, server, timing, validation, vehicles};
use crate::decode::{DecodeScheme, DecodeTiming, PulseDecoder};
use crate::types::Channel;
use crate::validate::{Cooldown, ReadingValidator, ValidatorStrategy};

fn us(d: Duration) -> u64 {
    d.as_micros() as u64
}

fn default_true() -> bool {
    true
}

fn default_max_vehicles() -> u32 {
    vehicles::DEFAULT_MAX_VEHICLES as u32
}

fn default_channels() -> Vec<ChannelConfig> {
    channels::DEFAULT_CHANNELS
        .iter()
        .map(|&(id, pin)| ChannelConfig { id, pin })
        .collect()
}

fn default_detection_interval_ms() -> u64 {
    validation::DETECTION_INTERVAL.as_millis() as u64
}

/// One sensor input and the GPIO line it is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: u8,
    /// BCM pin number
    pub pin: u32,
}

/// Pulse timing, all in microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "TimingConfig::default_start_pulse_min_us")]
    pub start_pulse_min_us: u64,
    #[serde(default = "TimingConfig::default_start_pulse_max_us")]
    pub start_pulse_max_us: u64,
    #[serde(default = "TimingConfig::default_post_start_delay_us")]
    pub post_start_delay_us: u64,
    #[serde(default = "TimingConfig::default_id_pulse_gap_us")]
    pub id_pulse_gap_us: u64,
    #[serde(default = "TimingConfig::default_id_pulse_timeout_us")]
    pub id_pulse_timeout_us: u64,
    #[serde(default = "TimingConfig::default_id_pulse_unit_us")]
    pub id_pulse_unit_us: u64,
    #[serde(default = "TimingConfig::default_pulse_count_window_us")]
    pub pulse_count_window_us: u64,
    #[serde(default = "TimingConfig::default_inter_pulse_delay_us")]
    pub inter_pulse_delay_us: u64,
    #[serde(default = "TimingConfig::default_loop_delay_us")]
    pub loop_delay_us: u64,
}

impl TimingConfig {
    fn default_start_pulse_min_us() -> u64 {
        us(timing::START_PULSE_MIN)
    }
    fn default_start_pulse_max_us() -> u64 {
        us(timing::START_PULSE_MAX)
    }
    fn default_post_start_delay_us() -> u64 {
        us(timing::POST_START_DELAY)
    }
    fn default_id_pulse_gap_us() -> u64 {
        us(timing::ID_PULSE_GAP)
    }
    fn default_id_pulse_timeout_us() -> u64 {
        us(timing::ID_PULSE_TIMEOUT)
    }
    fn default_id_pulse_unit_us() -> u64 {
        us(timing::ID_PULSE_UNIT)
    }
    fn default_pulse_count_window_us() -> u64 {
        us(timing::PULSE_COUNT_WINDOW)
    }
    fn default_inter_pulse_delay_us() -> u64 {
        us(timing::INTER_PULSE_DELAY)
    }
    fn default_loop_delay_us() -> u64 {
        us(timing::LOOP_DELAY)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            start_pulse_min_us: Self::default_start_pulse_min_us(),
            start_pulse_max_us: Self::default_start_pulse_max_us(),
            post_start_delay_us: Self::default_post_start_delay_us(),
            id_pulse_gap_us: Self::default_id_pulse_gap_us(),
            id_pulse_timeout_us: Self::default_id_pulse_timeout_us(),
            id_pulse_unit_us: Self::default_id_pulse_unit_us(),
            pulse_count_window_us: Self::default_pulse_count_window_us(),
            inter_pulse_delay_us: Self::default_inter_pulse_delay_us(),
            loop_delay_us: Self::default_loop_delay_us(),
        }
    }
}

/// Validator selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub strategy: ValidatorStrategy,
    /// Window `W` (majority) or threshold `R` (threshold)
    #[serde(default = "ValidationConfig::default_readings")]
    pub readings: usize,
    #[serde(default = "ValidationConfig::default_staleness_ms")]
    pub staleness_ms: u64,
}

impl ValidationConfig {
    fn default_readings() -> usize {
        validation::DEFAULT_READINGS
    }
    fn default_staleness_ms() -> u64 {
        validation::STALENESS_HORIZON.as_millis() as u64
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strategy: ValidatorStrategy::default(),
            readings: Self::default_readings(),
            staleness_ms: Self::default_staleness_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioConfig {
    #[serde(default = "GpioConfig::default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

impl GpioConfig {
    fn default_sysfs_root() -> PathBuf {
        PathBuf::from(paths::GPIO_SYSFS_ROOT)
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            sysfs_root: Self::default_sysfs_root(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "ServerConfig::default_bind")]
    pub bind: String,
}

impl ServerConfig {
    fn default_bind() -> String {
        server::DEFAULT_BIND.to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: Self::default_bind(),
        }
    }
}

/// Complete detector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_max_vehicles")]
    pub max_vehicles: u32,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
    /// Lines idle high and pulse low
    #[serde(default = "default_true")]
    pub active_low: bool,
    #[serde(default)]
    pub scheme: DecodeScheme,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default = "default_detection_interval_ms")]
    pub detection_interval_ms: u64,
    /// Clear the detection record this long after the last confirmation
    #[serde(default)]
    pub clear_after_ms: Option<u64>,
    #[serde(default)]
    pub gpio: GpioConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_vehicles: default_max_vehicles(),
            channels: default_channels(),
            active_low: true,
            scheme: DecodeScheme::default(),
            timing: TimingConfig::default(),
            validation: ValidationConfig::default(),
            detection_interval_ms: default_detection_interval_ms(),
            clear_after_ms: None,
            gpio: GpioConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Check every value; the first violation is returned.
    pub fn validate(&self) -> Result<()> {
        if self.max_vehicles == 0 || self.max_vehicles > u8::MAX as u32 {
            return Err(LapbeaconError::invalid_config(
                "max_vehicles",
                format!("must be between 1 and {}, got {}", u8::MAX, self.max_vehicles),
            ));
        }

        if self.channels.is_empty() {
            return Err(LapbeaconError::invalid_config("channels", "at least one channel is required"));
        }
        if self.channels.len() > limits::MAX_CHANNELS {
            return Err(LapbeaconError::invalid_config(
                "channels",
                format!("at most {} channels supported", limits::MAX_CHANNELS),
            ));
        }
        let mut ids = HashSet::new();
        let mut pins = HashSet::new();
        for ch in &self.channels {
            if !ids.insert(ch.id) {
                return Err(LapbeaconError::invalid_config("channels", format!("duplicate channel id {}", ch.id)));
            }
            if !pins.insert(ch.pin) {
                return Err(LapbeaconError::invalid_config("channels", format!("pin {} used twice", ch.pin)));
            }
        }

        let t = &self.timing;
        if t.start_pulse_min_us > t.start_pulse_max_us {
            return Err(LapbeaconError::invalid_config(
                "timing.start_pulse_min_us",
                format!("{} exceeds start_pulse_max_us {}", t.start_pulse_min_us, t.start_pulse_max_us),
            ));
        }
        for (field, value) in [
            ("timing.start_pulse_max_us", t.start_pulse_max_us),
            ("timing.pulse_count_window_us", t.pulse_count_window_us),
            ("timing.id_pulse_unit_us", t.id_pulse_unit_us),
            ("timing.id_pulse_timeout_us", t.id_pulse_timeout_us),
            ("validation.staleness_ms", self.validation.staleness_ms),
        ] {
            if value == 0 {
                return Err(LapbeaconError::invalid_config(field, "must be greater than zero"));
            }
        }

        let readings = self.validation.readings;
        if !(validation::MIN_READINGS..=validation::MAX_READINGS).contains(&readings) {
            return Err(LapbeaconError::invalid_config(
                "validation.readings",
                format!(
                    "must be between {} and {}, got {}",
                    validation::MIN_READINGS,
                    validation::MAX_READINGS,
                    readings
                ),
            ));
        }

        if self.scheme == DecodeScheme::PulseWidth {
            let longest = t.id_pulse_unit_us.saturating_mul(self.max_vehicles as u64);
            if t.id_pulse_timeout_us < longest {
                return Err(LapbeaconError::invalid_config(
                    "timing.id_pulse_timeout_us",
                    format!("{} is shorter than the longest ID pulse ({}us)", t.id_pulse_timeout_us, longest),
                ));
            }
        }

        Ok(())
    }

    /// Identifier space; call after [`validate`](Self::validate).
    pub fn max_vehicles(&self) -> u8 {
        self.max_vehicles.min(u8::MAX as u32) as u8
    }

    /// Channel ids in polling order.
    pub fn channel_ids(&self) -> Vec<Channel> {
        self.channels.iter().map(|c| Channel(c.id)).collect()
    }

    pub fn decode_timing(&self) -> DecodeTiming {
        let t = &self.timing;
        DecodeTiming {
            start_pulse_min: Duration::from_micros(t.start_pulse_min_us),
            start_pulse_max: Duration::from_micros(t.start_pulse_max_us),
            post_start_delay: Duration::from_micros(t.post_start_delay_us),
            id_pulse_gap: Duration::from_micros(t.id_pulse_gap_us),
            id_pulse_timeout: Duration::from_micros(t.id_pulse_timeout_us),
            id_pulse_unit: Duration::from_micros(t.id_pulse_unit_us),
            pulse_count_window: Duration::from_micros(t.pulse_count_window_us),
            inter_pulse_delay: Duration::from_micros(t.inter_pulse_delay_us),
        }
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_micros(self.timing.loop_delay_us)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.validation.staleness_ms)
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn clear_after(&self) -> Option<Duration> {
        self.clear_after_ms.map(Duration::from_millis)
    }

    pub fn build_decoder(&self) -> Box<dyn PulseDecoder> {
        self.scheme.decoder(self.decode_timing(), self.max_vehicles())
    }

    pub fn build_validator(&self) -> Box<dyn ReadingValidator> {
        self.validation
            .strategy
            .build(self.validation.readings, self.staleness())
    }

    pub fn build_cooldown(&self) -> Cooldown {
        Cooldown::new(self.detection_interval())
    }
}

/// Load and validate a configuration file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<DetectorConfig> {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return Ok(DetectorConfig::default());
    }

    let size = fs::metadata(path)
        .map_err(|e| LapbeaconError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();
    if size > limits::MAX_CONFIG_SIZE {
        return Err(LapbeaconError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            max_size: limits::MAX_CONFIG_SIZE,
        });
    }

    let contents = fs::read_to_string(path).map_err(|e| LapbeaconError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: DetectorConfig = serde_json::from_str(&contents)?;
    config.validate()?;

    info!(
        "Loaded config from {:?}: {} channel(s), {:?} scheme, {} validation",
        path,
        config.channels.len(),
        config.scheme,
        config.validation.strategy.as_str()
    );
    Ok(config)
}

/// Write the configuration atomically (temp file + rename).
pub fn save_config(path: &Path, config: &DetectorConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");
    let write_err = |e| LapbeaconError::FileWrite {
        path: temp_path.clone(),
        source: e,
    };

    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(json.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| LapbeaconError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!("Saved config to {:?}", path);
    Ok(())
}
