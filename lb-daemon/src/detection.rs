//! Detection loop runner
//!
//! Owns the signal source for the lifetime of the loop. The source is dropped
//! as soon as the loop returns, which releases the GPIO lines no matter where in
//! a decode attempt the stop was observed.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use lb_core::{
    DetectionBoard, DetectionPipeline, DetectorConfig, MonotonicClock, PipelineStats, SignalSource,
};
use tracing::{debug, info};

/// Run the pipeline until `shutdown` is raised.
pub fn run_detection_loop(
    config: &DetectorConfig,
    source: Box<dyn SignalSource>,
    board: Arc<DetectionBoard>,
    shutdown: &AtomicBool,
) -> PipelineStats {
    let clock = MonotonicClock::new();
    let mut pipeline = DetectionPipeline::from_config(config, board);

    pipeline.run_until_stopped(source.as_ref(), &clock, shutdown, config.loop_delay(), |c| {
        info!(
            "DETECTION: vehicle {} on channel {} at {}",
            c.vehicle,
            c.channel,
            c.detection.time.as_deref().unwrap_or("-")
        );
    });

    drop(source);
    debug!("Signal source released");

    let stats = pipeline.stats().clone();
    info!(
        "Detection summary: {} attempts, {} candidates, {} confirmed, {} suppressed, {} errors",
        stats.attempts,
        stats.candidates,
        stats.total_confirmed(),
        stats.suppressed,
        stats.errors
    );
    stats
}
