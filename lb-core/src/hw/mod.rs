//! Hardware access
//!
//! Contains the GPIO signal source used on the track-side host.

mod gpio;

pub use gpio::SysfsGpio;
