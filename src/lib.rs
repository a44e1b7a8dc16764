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

//! Lapbeacon debug tool
//!
//! Foreground front end over `lb-core` for bench testing beacons and sensors.

pub mod cli;
pub mod logger;
pub mod session;
pub mod summary;
