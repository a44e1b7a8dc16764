//! Constants and configuration defaults for Lapbeacon
//!
//! Every timing value the decoder and validator use has its default here.
//! The runtime values come from `DetectorConfig`; these are only what a missing
//! or partial config file falls back to.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Configuration directory
    pub const CONFIG_DIR: &str = "/etc/lapbeacon";

    /// Detector configuration file
    pub const CONFIG_FILE: &str = "config.json";

    /// Linux sysfs GPIO class directory
    pub const GPIO_SYSFS_ROOT: &str = "/sys/class/gpio";

    /// Full path of the default configuration file
    pub fn default_config_path() -> std::path::PathBuf {
        std::path::Path::new(CONFIG_DIR).join(CONFIG_FILE)
    }
}

/// Vehicle identifier space
pub mod vehicles {
    /// Number of distinct beacons the protocol can tell apart
    pub const DEFAULT_MAX_VEHICLES: u8 = 8;
}

/// Default channel to GPIO (BCM numbering) assignment
pub mod channels {
    /// (channel id, BCM pin)
    pub const DEFAULT_CHANNELS: &[(u8, u32)] = &[(1, 17), (2, 18)];
}

/// Pulse timing of the beacon protocol
pub mod timing {
    use super::*;

    /// Shortest start pulse accepted (inclusive)
    pub const START_PULSE_MIN: Duration = Duration::from_micros(3_000);

    /// Longest start pulse accepted (inclusive); also the wait bound while measuring it
    pub const START_PULSE_MAX: Duration = Duration::from_micros(8_000);

    /// Settle delay between the start pulse and pulse counting (pulse-count scheme)
    pub const POST_START_DELAY: Duration = Duration::from_micros(1_000);

    /// Settle delay between the start pulse and the ID pulse (pulse-width scheme)
    pub const ID_PULSE_GAP: Duration = Duration::from_micros(5_000);

    /// Upper bound on the ID pulse width
    pub const ID_PULSE_TIMEOUT: Duration = Duration::from_micros(10_000);

    /// One unit of ID pulse width
    pub const ID_PULSE_UNIT: Duration = Duration::from_micros(1_000);

    /// Window in which the identifier pulses are counted
    pub const PULSE_COUNT_WINDOW: Duration = Duration::from_micros(20_000);

    /// Gap after each counted pulse so a noisy edge is not counted twice
    pub const INTER_PULSE_DELAY: Duration = Duration::from_micros(200);

    /// Pause between detection loop iterations
    pub const LOOP_DELAY: Duration = Duration::from_micros(100);
}

/// Reading validation parameters
pub mod validation {
    use super::*;

    /// Default readings for the majority window (`W`) or the threshold (`R`)
    pub const DEFAULT_READINGS: usize = 6;

    /// Default readings used by the debug CLI
    pub const DEBUG_READINGS: usize = 4;

    /// Smallest accepted window / threshold
    pub const MIN_READINGS: usize = 2;

    /// Largest accepted window / threshold
    pub const MAX_READINGS: usize = 32;

    /// Gap after which a key's history is treated as unrelated
    pub const STALENESS_HORIZON: Duration = Duration::from_secs(1);

    /// Minimum gap between published confirmations on one channel
    pub const DETECTION_INTERVAL: Duration = Duration::from_millis(20);
}

/// Detection loop behaviour
pub mod detection {
    /// Consecutive sampling errors before the loop escalates to an error log
    pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

    /// Pause between iterations once errors reach `MAX_CONSECUTIVE_ERRORS`
    pub const ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_millis(100);

    /// Wall-clock format of published detection timestamps
    pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
}

/// Beacon firmware waveform (used by the simulator)
pub mod beacon {
    use super::*;

    /// Start pulse emitted by the beacon
    pub const START_PULSE: Duration = Duration::from_millis(5);

    /// Quiet time after the start pulse in pulse-count frames
    pub const START_GAP: Duration = Duration::from_millis(2);

    /// Width of one identifier pulse
    pub const ID_PULSE: Duration = Duration::from_millis(1);

    /// Quiet time after each identifier pulse
    pub const ID_GAP: Duration = Duration::from_millis(1);

    /// Quiet time between frames
    pub const FRAME_GAP: Duration = Duration::from_millis(20);
}

/// Sysfs GPIO interface
pub mod gpio {
    use super::*;

    /// How long to wait for udev to create `gpioN/` after an export
    pub const EXPORT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Poll interval while waiting for the export
    pub const EXPORT_POLL_INTERVAL: Duration = Duration::from_millis(10);
}

/// Status server defaults
pub mod server {
    /// Bind address of the status endpoint
    pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

    /// Path of the current-detection endpoint
    pub const CURRENT_DETECTION_PATH: &str = "/current_car";
}

/// File size limits
pub mod limits {
    /// Maximum accepted configuration file size (64 KiB)
    pub const MAX_CONFIG_SIZE: u64 = 64 * 1024;

    /// Maximum number of channels
    pub const MAX_CHANNELS: usize = 16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_pulse_bounds_ordered() {
        assert!(timing::START_PULSE_MIN < timing::START_PULSE_MAX);
    }

    #[test]
    fn test_longest_id_pulse_fits_timeout() {
        let longest = timing::ID_PULSE_UNIT * vehicles::DEFAULT_MAX_VEHICLES as u32;
        assert!(longest <= timing::ID_PULSE_TIMEOUT);
    }

    #[test]
    fn test_count_frame_fits_window() {
        // The last pulse of the highest id must land inside the counting window.
        let lead = beacon::START_GAP.saturating_sub(timing::POST_START_DELAY);
        let pulses = (beacon::ID_PULSE + beacon::ID_GAP) * vehicles::DEFAULT_MAX_VEHICLES as u32;
        assert!(lead + pulses < timing::PULSE_COUNT_WINDOW);
    }
}
