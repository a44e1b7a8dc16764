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

//! Foreground detection session

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use lb_core::constants::paths;
use lb_core::constants::validation::DEBUG_READINGS;
use lb_core::sim::parse_assignments;
use lb_core::{
    load_config, DetectionBoard, DetectionPipeline, DetectorConfig, MonotonicClock, PipelineStats,
    SignalSource, SimSignal, SysfsGpio,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::cli::{Cli, DEBUG_SCHEME, DEBUG_STRATEGY};
use crate::{logger, summary};

/// Whether the config file at `path` spells out the value at `pointer`.
fn file_sets(path: &Path, pointer: &str) -> bool {
    fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .map_or(false, |doc| doc.pointer(pointer).is_some())
}

/// Debug defaults for the choices the config file leaves open.
fn apply_debug_defaults(config: &mut DetectorConfig, path: &Path) {
    if !file_sets(path, "/validation/readings") {
        config.validation.readings = DEBUG_READINGS;
    }
    if !file_sets(path, "/validation/strategy") {
        config.validation.strategy = DEBUG_STRATEGY.into();
    }
    if !file_sets(path, "/scheme") {
        config.scheme = DEBUG_SCHEME.into();
    }
}

/// Load the configuration file and overlay the command line.
///
/// Precedence per option: command line, then config file, then the debug defaults.
pub fn build_config(cli: &Cli) -> anyhow::Result<DetectorConfig> {
    let path = cli.config.clone().unwrap_or_else(paths::default_config_path);
    let mut config = load_config(&path).with_context(|| format!("loading {}", path.display()))?;
    apply_debug_defaults(&mut config, &path);
    cli.apply(&mut config);
    config.validate().context("invalid command line options")?;
    Ok(config)
}

fn open_source(cli: &Cli, config: &DetectorConfig) -> anyhow::Result<Box<dyn SignalSource>> {
    match cli.simulate.as_deref() {
        Some(spec) => {
            let assignments = parse_assignments(spec).context("invalid --simulate value")?;
            Ok(Box::new(SimSignal::live_beacons(config, &assignments)?))
        }
        None => Ok(Box::new(
            SysfsGpio::open(&config.gpio.sysfs_root, &config.channels).context("acquiring GPIO lines")?,
        )),
    }
}

/// Run the pipeline until `stop` is raised or the configured duration ends,
/// printing each confirmation to stdout.
pub fn run(cli: &Cli, config: &DetectorConfig, stop: Arc<AtomicBool>) -> anyhow::Result<PipelineStats> {
    let source = open_source(cli, config)?;

    if let Some(path) = &cli.event_log {
        match logger::init_logging(path) {
            Some(used) => info!("Event log: {}", used.display()),
            None => debug!("Event log unavailable"),
        }
    }

    if let Some(secs) = cli.duration_secs {
        let stop = stop.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            stop.store(true, Ordering::SeqCst);
        });
    }

    let board = Arc::new(DetectionBoard::new());
    let mut pipeline = DetectionPipeline::from_config(config, board);
    let clock = MonotonicClock::new();

    println!(
        "Watching {} channel(s) with the {} decoder and {} validator (Ctrl+C to stop)",
        pipeline.channels().len(),
        pipeline.decoder_name(),
        pipeline.validator_name()
    );

    pipeline.run_until_stopped(source.as_ref(), &clock, &stop, config.loop_delay(), |c| {
        println!("{}", summary::confirmation_line(c));
        logger::log_confirmation(c);
    });

    drop(source);
    logger::close_logging();
    Ok(pipeline.stats().clone())
}
