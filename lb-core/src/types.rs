//! Identifier types shared across the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// One physical sensor input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(pub u8);

impl Channel {
    pub fn id(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A vehicle identifier in `[1, max_vehicles]`.
///
/// Only constructible through range-checked constructors, so a `VehicleId`
/// held anywhere in the pipeline is always a valid protocol value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VehicleId(u8);

impl VehicleId {
    /// Accepts `raw` only if it lies in `[1, max_vehicles]`.
    pub fn new(raw: u32, max_vehicles: u8) -> Option<Self> {
        if raw >= 1 && raw <= max_vehicles as u32 {
            Some(Self(raw as u8))
        } else {
            None
        }
    }

    /// Signed variant for values derived by subtraction (pulse-width mapping).
    pub fn from_signed(raw: i64, max_vehicles: u8) -> Option<Self> {
        u32::try_from(raw)
            .ok()
            .and_then(|v| Self::new(v, max_vehicles))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_id_range() {
        assert!(VehicleId::new(0, 8).is_none());
        assert_eq!(VehicleId::new(1, 8).map(VehicleId::get), Some(1));
        assert_eq!(VehicleId::new(8, 8).map(VehicleId::get), Some(8));
        assert!(VehicleId::new(9, 8).is_none());
    }

    #[test]
    fn test_vehicle_id_from_signed() {
        assert!(VehicleId::from_signed(-1, 8).is_none());
        assert!(VehicleId::from_signed(0, 8).is_none());
        assert_eq!(VehicleId::from_signed(6, 8).map(VehicleId::get), Some(6));
    }

    #[test]
    fn test_channel_serializes_as_number() {
        let json = serde_json::to_string(&Channel(2)).unwrap();
        assert_eq!(json, "2");
    }
}
