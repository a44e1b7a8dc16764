//! Lapbeacon Core Library
//!
//! Identifies vehicles passing an IR sensor from the pulse trains their beacons emit.
//!
//! # Features
//!
//! - **Pulse Decoding**: Pulse-count and pulse-width schemes behind one trait
//! - **Reading Validation**: Majority-of-window or hit-threshold confirmation
//! - **Cool-down Gating**: Per-channel minimum interval between confirmations
//! - **Detection Board**: Lock-light snapshot cell for status readers
//! - **Simulation**: Virtual clock and beacon waveforms for tests and dry runs
//!
//! # Module Structure
//!
//! - `decode/` - Pulse decoders
//! - `validate/` - Reading validators and the cool-down gate
//! - `hw/` - GPIO signal source
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use lb_core::{DetectionBoard, DetectionPipeline, DetectorConfig, MonotonicClock, SysfsGpio};
//!
//! let config = DetectorConfig::default();
//! let gpio = SysfsGpio::open(&config.gpio.sysfs_root, &config.channels).unwrap();
//! let board = Arc::new(DetectionBoard::new());
//! let mut pipeline = DetectionPipeline::from_config(&config, board);
//! let stop = AtomicBool::new(false);
//! pipeline.run_until_stopped(&gpio, &MonotonicClock::new(), &stop, config.loop_delay(), |c| {
//!     println!("vehicle {} on channel {}", c.vehicle, c.channel);
//! });
//! ```

// Grouped modules
pub mod decode;
pub mod hw;
pub mod validate;

// Standalone modules
pub mod board;
pub mod config;
pub mod constants;
pub mod pipeline;
pub mod signal;
pub mod sim;
pub mod types;

// Re-export error types
pub use lb_error::{LapbeaconError, Result};

pub use board::{ConfirmedDetection, DetectionBoard};
pub use config::{load_config, save_config, ChannelConfig, DetectorConfig};
pub use decode::{DecodeOutcome, DecodeScheme, DecodeTiming, PulseDecoder, Rejection};
pub use hw::SysfsGpio;
pub use pipeline::{Confirmation, DetectionPipeline, PipelineStats};
pub use signal::{Clock, MonotonicClock, SignalSource};
pub use sim::{SimClock, SimSignal, Waveform};
pub use types::{Channel, VehicleId};
pub use validate::{Cooldown, ReadingValidator, ValidatorStrategy};
