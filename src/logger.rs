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

//! JSON-lines event log
//!
//! One line per event: `{"ts_ms": ..., "event": ..., "data": ...}`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use lb_core::Confirmation;
use serde_json::{json, Value};

pub const DEFAULT_LOG_PATH: &str = "/var/log/lapbeacon/detections.json";
pub const FALLBACK_LOG_PATH: &str = "/tmp/lapbeacon_detections.json";

lazy_static! {
    static ref LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Open the event log at `path`, falling back to `/tmp`. Returns the path in use.
pub fn init_logging(path: &Path) -> Option<PathBuf> {
    let (file, used) = match open_append(path) {
        Some(f) => (f, path.to_path_buf()),
        None => (open_append(Path::new(FALLBACK_LOG_PATH))?, PathBuf::from(FALLBACK_LOG_PATH)),
    };
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }
    Some(used)
}

/// Stop writing to the event log.
pub fn close_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = None;
    }
}

/// Whether an event log is open.
pub fn is_enabled() -> bool {
    LOG_FILE.lock().map(|g| g.is_some()).unwrap_or(false)
}

/// Append one event. A no-op while no log is open.
pub fn log_event(event: &str, data: Value) {
    let line = json!({
        "ts_ms": now_millis(),
        "event": event,
        "data": data,
    })
    .to_string();

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(f) = guard.as_mut() {
            let _ = writeln!(f, "{}", line);
        }
    }
}

pub fn log_confirmation(confirmation: &Confirmation) {
    log_event(
        "confirmed",
        json!({
            "vehicle": confirmation.vehicle,
            "channel": confirmation.channel,
            "time": confirmation.detection.time,
            "monotonic_us": confirmation.at.as_micros() as u64,
        }),
    );
}
