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

//! Console output of the debug tool

use std::fmt::Write;

use lb_core::{Confirmation, PipelineStats};

/// `CONFIRMED: vehicle X on channel Y at T`
pub fn confirmation_line(confirmation: &Confirmation) -> String {
    format!(
        "CONFIRMED: vehicle {} on channel {} at {}",
        confirmation.vehicle,
        confirmation.channel,
        confirmation.detection.time.as_deref().unwrap_or("-")
    )
}

/// Per-vehicle detection counts followed by the decoder counters.
pub fn render(stats: &PipelineStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Detection summary:");
    if stats.confirmed.is_empty() {
        let _ = writeln!(out, "  no vehicles detected");
    }
    for (vehicle, count) in &stats.confirmed {
        let _ = writeln!(out, "  vehicle {}: {} detection(s)", vehicle, count);
    }

    let _ = writeln!(
        out,
        "Decoder: {} attempts, {} candidates, {} rejected, {} suppressed by cool-down, {} errors",
        stats.attempts,
        stats.candidates,
        stats.total_rejected(),
        stats.suppressed,
        stats.errors
    );
    for (kind, count) in stats.rejections.iter().filter(|(kind, _)| **kind != "idle") {
        let _ = writeln!(out, "  {}: {}", kind, count);
    }
    out
}
