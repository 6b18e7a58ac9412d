//! flowtap command line tool
//!
//! Replays a pcap file or captures on an interface, classifies every TCP flow
//! and prints the final counters as JSON.

use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};
use tokio::{select, signal};

use flowtap::common::{init_logger, DispatchError, Result};
use flowtap::config::{log_config, AppConfig, ConfigLoader, ConfigValidator};
use flowtap::handler::RawHandler;
use flowtap::protocol::{DnsDetector, HttpDetector, TlsDetector};
use flowtap::{Dispatcher, APP_NAME, VERSION};

/// flowtap: passive TCP protocol detection and dispatch
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Capture live on this interface
    #[clap(short, long, env = "FLOWTAP_INTERFACE", conflicts_with = "file")]
    interface: Option<String>,

    /// Replay this pcap file
    #[clap(short = 'r', long, env = "FLOWTAP_FILE")]
    file: Option<PathBuf>,

    /// BPF-style filter expression, e.g. "tcp port 443"
    #[clap(short, long)]
    filter: Option<String>,

    /// Snapshot length for live capture
    #[clap(long)]
    snaplen: Option<u32>,

    /// Do not put the interface into promiscuous mode
    #[clap(long)]
    no_promisc: bool,

    /// Live read timeout in milliseconds (0 blocks until a packet arrives)
    #[clap(long)]
    timeout_ms: Option<u64>,

    /// Complete flows idle for this many seconds
    #[clap(long)]
    idle_timeout: Option<u64>,

    /// Seconds between idle-flow sweeps
    #[clap(long)]
    maintenance_interval: Option<u64>,

    /// Discard flows no detector claims instead of hex-dumping them
    #[clap(long)]
    no_raw: bool,

    /// Load configuration from a JSON file
    #[clap(short, long)]
    config_file: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[clap(long)]
    log_level: Option<String>,
}

impl Args {
    /// Command-line values take precedence over file and environment
    fn apply(&self, config: &mut AppConfig) {
        if let Some(interface) = &self.interface {
            config.capture.interface = Some(interface.clone());
            config.capture.file = None;
        }
        if let Some(file) = &self.file {
            config.capture.file = Some(file.clone());
            config.capture.interface = None;
        }
        if let Some(filter) = &self.filter {
            config.capture.filter = Some(filter.clone());
        }
        if let Some(snaplen) = self.snaplen {
            config.capture.snaplen = snaplen;
        }
        if self.no_promisc {
            config.capture.promiscuous = false;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.capture.timeout_ms = timeout_ms;
        }
        if let Some(idle_timeout) = self.idle_timeout {
            config.dispatch.idle_timeout_secs = idle_timeout;
        }
        if let Some(interval) = self.maintenance_interval {
            config.dispatch.maintenance_interval_secs = interval;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config_file {
        Some(path) => AppConfig::load(Some(path.as_path()))?,
        None => AppConfig::auto_load()?,
    };
    args.apply(&mut config);

    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    for warning in config.check_warnings() {
        warn!("{}", warning);
    }
    config.validate()?;
    log_config(&config);

    let mut dispatcher = Dispatcher::with_settings(config.capture, config.dispatch);
    dispatcher.register_detector(TlsDetector::new())?;
    dispatcher.register_detector(HttpDetector::new())?;
    dispatcher.register_detector(DnsDetector::new())?;
    if !args.no_raw {
        dispatcher.set_default_handler(RawHandler::factory())?;
    }

    dispatcher.start().await?;

    select! {
        _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
        _ = dispatcher.wait_finished() => info!("Capture finished"),
    }

    let result = dispatcher.stop().await;

    let stats = serde_json::to_string_pretty(&dispatcher.stats())
        .map_err(|e| DispatchError::Other(format!("failed to serialize stats: {}", e)))?;
    println!("{}", stats);

    result
}
