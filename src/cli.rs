/*
 * This file is part of Lapbeacon.
 *
 * Copyright (C) 2026 Lapbeacon contributors
 *
 * Lapbeacon is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Lapbeacon is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Lapbeacon. If not, see <https://www.gnu.org/licenses/>.
 */

//! Command line interface of the debug tool

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use lb_core::{DecodeScheme, DetectorConfig, ValidatorStrategy};

use crate::logger::DEFAULT_LOG_PATH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// W-1 of the last W readings per channel
    Majority,
    /// R hits per vehicle within the staleness horizon
    Threshold,
}

impl From<StrategyArg> for ValidatorStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Majority => ValidatorStrategy::Majority,
            StrategyArg::Threshold => ValidatorStrategy::Threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemeArg {
    /// Pulse count only
    Count,
    /// ID pulse width, cross-checked by pulse count
    Width,
}

impl From<SchemeArg> for DecodeScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Count => DecodeScheme::PulseCount,
            SchemeArg::Width => DecodeScheme::PulseWidth,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "lapbeacon")]
#[command(version)]
#[command(about = "Lapbeacon - IR beacon detection debugger")]
#[command(long_about = "Lapbeacon - IR beacon detection debugger

Runs the detection pipeline in the foreground and prints every confirmed
vehicle. Press Ctrl+C to stop and print a detection summary.

EXAMPLES:
    lapbeacon                                  Watch the GPIO channels
    lapbeacon --validation-readings 6          Require 6 readings
    lapbeacon --strategy majority --scheme count
    lapbeacon --simulate 1=3,2=7 --duration-secs 5

ENVIRONMENT VARIABLES:
    RUST_LOG=debug         Enable debug logging

FILES:
    /etc/lapbeacon/config.json             Detector configuration")]
pub struct Cli {
    /// Readings needed to confirm (window W or threshold R) [default: 4 unless set in the config file]
    #[arg(long, value_name = "N")]
    pub validation_readings: Option<usize>,

    /// Validation strategy [default: threshold unless set in the config file]
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Beacon encoding [default: width unless set in the config file]
    #[arg(long, value_enum)]
    pub scheme: Option<SchemeArg>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Simulated beacons as CHANNEL=ID[,CHANNEL=ID...] instead of GPIO
    #[arg(long, value_name = "ASSIGNMENTS")]
    pub simulate: Option<String>,

    /// Append confirmations as JSON lines
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = DEFAULT_LOG_PATH)]
    pub event_log: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration_secs: Option<u64>,
}

/// Validation strategy of the debug tool when the config file names none
pub const DEBUG_STRATEGY: StrategyArg = StrategyArg::Threshold;

/// Beacon encoding of the debug tool when the config file names none
pub const DEBUG_SCHEME: SchemeArg = SchemeArg::Width;

impl Cli {
    /// Overlay the options given on the command line onto a loaded configuration.
    pub fn apply(&self, config: &mut DetectorConfig) {
        if let Some(readings) = self.validation_readings {
            config.validation.readings = readings;
        }
        if let Some(strategy) = self.strategy {
            config.validation.strategy = strategy.into();
        }
        if let Some(scheme) = self.scheme {
            config.scheme = scheme.into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["lapbeacon"]).unwrap();
        assert_eq!(cli.validation_readings, None);
        assert_eq!(cli.strategy, None);
        assert_eq!(cli.scheme, None);
        assert!(cli.event_log.is_none());
    }

    #[test]
    fn test_apply_without_flags_keeps_config() {
        let cli = Cli::try_parse_from(["lapbeacon"]).unwrap();
        let mut config = DetectorConfig::default();
        config.validation.readings = 9;
        config.validation.strategy = ValidatorStrategy::Majority;
        config.scheme = DecodeScheme::PulseCount;
        let before = config.clone();

        cli.apply(&mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::try_parse_from([
            "lapbeacon",
            "--validation-readings",
            "6",
            "--strategy",
            "majority",
            "--scheme",
            "count",
        ])
        .unwrap();
        let mut config = DetectorConfig::default();
        config.scheme = DecodeScheme::PulseWidth;
        cli.apply(&mut config);
        assert_eq!(config.validation.readings, 6);
        assert_eq!(config.validation.strategy, ValidatorStrategy::Majority);
        assert_eq!(config.scheme, DecodeScheme::PulseCount);
    }

    #[test]
    fn test_event_log_default_path() {
        let cli = Cli::try_parse_from(["lapbeacon", "--event-log"]).unwrap();
        assert_eq!(cli.event_log, Some(PathBuf::from(DEFAULT_LOG_PATH)));
        let cli = Cli::try_parse_from(["lapbeacon", "--event-log", "/tmp/x.json"]).unwrap();
        assert_eq!(cli.event_log, Some(PathBuf::from("/tmp/x.json")));
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        assert!(Cli::try_parse_from(["lapbeacon", "--strategy", "vote"]).is_err());
    }
}
