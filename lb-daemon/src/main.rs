//! Lapbeacon Daemon (lapbeacond)
//!
//! Track-side service that watches the IR sensor channels, confirms passing
//! vehicles and serves the most recent detection over HTTP.
//!
//! # Startup
//! 1. Parse arguments
//! 2. Logging (systemd journal, falling back to stdout)
//! 3. Load and validate configuration
//! 4. Acquire the GPIO lines (or build a simulated source); failure is fatal
//! 5. Signal handler, detection loop on a blocking thread, status server
//!
//! # Shutdown
//! SIGINT/SIGTERM raise the stop flag and wake the status server. The server
//! drains, the detection loop finishes its current attempt and releases the
//! GPIO lines, then the process exits.

mod detection;
mod server;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use lb_core::constants::paths;
use lb_core::sim::parse_assignments;
use lb_core::{load_config, DetectionBoard, DetectorConfig, SignalSource, SimSignal, SysfsGpio};
use tokio::sync::Notify;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// CLI
// ============================================================================

#[derive(Debug, Default)]
struct DaemonArgs {
    config_path: Option<PathBuf>,
    bind: Option<String>,
    simulate: Option<String>,
    no_server: bool,
}

fn print_help() {
    eprintln!("lapbeacond {} - Lapbeacon detection daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    lapbeacond [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH         Config file (default {})", paths::default_config_path().display());
    eprintln!("    -b, --bind ADDR           Status server address (overrides config)");
    eprintln!("        --simulate CH=ID,...  Use simulated beacons instead of GPIO");
    eprintln!("        --no-server           Do not start the status server");
    eprintln!("    -v, --version             Print version");
    eprintln!("    -h, --help                Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    LAPBEACON_LOG             Log filter (trace, debug, info, warn, error)");
}

fn print_version() {
    println!("lapbeacond {}", VERSION);
}

/// `Ok(None)` means help or version was printed.
fn parse_args(args: &[String]) -> Result<Option<DaemonArgs>, String> {
    let mut parsed = DaemonArgs::default();
    let mut i = 1;

    let value = |i: usize, flag: &str| -> Result<String, String> {
        args.get(i)
            .cloned()
            .ok_or_else(|| format!("{} requires an argument", flag))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "-v" | "--version" => {
                print_version();
                return Ok(None);
            }
            "-c" | "--config" => {
                i += 1;
                parsed.config_path = Some(PathBuf::from(value(i, "--config")?));
            }
            "-b" | "--bind" => {
                i += 1;
                parsed.bind = Some(value(i, "--bind")?);
            }
            "--simulate" => {
                i += 1;
                parsed.simulate = Some(value(i, "--simulate")?);
            }
            "--no-server" => parsed.no_server = true,
            arg => return Err(format!("Unknown argument: {}", arg)),
        }
        i += 1;
    }

    Ok(Some(parsed))
}

// ============================================================================
// Logging
// ============================================================================

/// Journald when available, stdout otherwise. Returns whether journald is in use.
fn init_logging(filter: &str) -> bool {
    use tracing_subscriber::prelude::*;

    if std::path::Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(filter))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .init();
    false
}

// ============================================================================
// Startup helpers
// ============================================================================

fn open_source(config: &DetectorConfig, simulate: Option<&str>) -> anyhow::Result<Box<dyn SignalSource>> {
    match simulate {
        Some(spec) => {
            let assignments = parse_assignments(spec).context("invalid --simulate value")?;
            let source = SimSignal::live_beacons(config, &assignments)?;
            info!("STARTUP: Simulating beacons {:?}", assignments);
            Ok(Box::new(source))
        }
        None => {
            let gpio = SysfsGpio::open(&config.gpio.sysfs_root, &config.channels)?;
            Ok(Box::new(gpio))
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // PHASE 1: Arguments
    let args: Vec<String> = std::env::args().collect();
    let args = match parse_args(&args) {
        Ok(Some(args)) => args,
        Ok(None) => return Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // PHASE 2: Logging
    let log_filter = std::env::var("LAPBEACON_LOG").unwrap_or_else(|_| "info".to_string());
    let journald = init_logging(&log_filter);
    info!("STARTUP: lapbeacond {} starting", VERSION);
    info!("STARTUP: Logging to {}", if journald { "systemd journal" } else { "stdout" });

    // PHASE 3: Configuration
    let config_path = args.config_path.clone().unwrap_or_else(paths::default_config_path);
    let mut config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("STARTUP: Invalid configuration {:?}: {}", config_path, e);
            std::process::exit(1);
        }
    };
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if args.no_server {
        config.server.enabled = false;
    }

    // PHASE 4: Signal source
    let source = match open_source(&config, args.simulate.as_deref()) {
        Ok(source) => source,
        Err(e) => {
            error!("STARTUP: {:#}", e);
            std::process::exit(1);
        }
    };

    // PHASE 5: Signal handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let server_shutdown = Arc::new(Notify::new());
    {
        let shutdown = shutdown.clone();
        let server_shutdown = server_shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
            shutdown.store(true, Ordering::SeqCst);
            server_shutdown.notify_one();
        }) {
            warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
        }
    }

    // PHASE 6: Detection loop
    let board = Arc::new(DetectionBoard::new());
    let detection_handle = {
        let config = config.clone();
        let board = board.clone();
        let shutdown = shutdown.clone();
        tokio::task::spawn_blocking(move || detection::run_detection_loop(&config, source, board, &shutdown))
    };
    info!("STARTUP: Detection loop started on {} channel(s)", config.channels.len());

    // PHASE 7: Status server
    let mut server_result = Ok(());
    if config.server.enabled {
        server_result = server::run_server(&config.server.bind, board.clone(), server_shutdown).await;
        if server_result.is_err() {
            shutdown.store(true, Ordering::SeqCst);
        }
    } else {
        info!("STARTUP: Status server disabled");
    }

    // PHASE 8: Join the detection loop
    detection_handle.await.context("detection loop panicked")?;
    info!("SHUTDOWN: lapbeacond stopped");

    if let Err(e) = server_result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("lapbeacond")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(&args(&["-c", "/tmp/x.json", "--bind", "0.0.0.0:8080", "--no-server"]))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.config_path, Some(PathBuf::from("/tmp/x.json")));
        assert_eq!(parsed.bind.as_deref(), Some("0.0.0.0:8080"));
        assert!(parsed.no_server);
        assert!(parsed.simulate.is_none());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&["--config"])).is_err());
        assert!(parse_args(&args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn test_simulated_source_validates_assignments() {
        let config = DetectorConfig::default();
        assert!(open_source(&config, Some("1=3")).is_ok());
        assert!(open_source(&config, Some("1-3")).is_err());
        assert!(open_source(&config, Some("4=3")).is_err());
    }
}
