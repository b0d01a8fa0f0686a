//! peershare - Main entry point
//!
//! Runs either the tracker or a peer, depending on the subcommand.

use std::sync::Arc;

use anyhow::{Context, Result};
use peershare::{
    CliArgs, Command, DownloadReport, PeerConfig, PeerNode, ShareError, TrackerConfig, TrackerDirectory,
    TrackerService,
};
use tracing::{debug, error, info, warn};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at an unknown location"),
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    info!("peershare starting");
    debug!("CLI arguments: {:?}", args);

    match &args.command {
        Command::Tracker(tracker_args) => run_tracker(TrackerConfig::from_args(tracker_args)).await,
        Command::Peer(peer_args) => run_peer(PeerConfig::from_args(peer_args)).await,
    }
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level {:?}", level);
}

/// Serve the tracker until Ctrl-C
async fn run_tracker(config: TrackerConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let directory = Arc::new(TrackerDirectory::new());
    let service = TrackerService::bind(&config.listen, directory, config.service)
        .await
        .context("Failed to start tracker")?;

    println!("Tracker listening on {}", service.local_addr()?);
    println!("  Max connections: {}", config.service.max_connections);
    println!();

    tokio::select! {
        result = service.run() => {
            result.context("Tracker stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, stopping tracker");
        }
    }

    info!("peershare tracker finished");
    Ok(())
}

/// Run a peer until Ctrl-C, optionally fetching one file first
async fn run_peer(config: PeerConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let node = PeerNode::start(config.node_options())
        .await
        .context("Failed to start peer")?;

    println!("Peer Information:");
    println!("  Address: {}", node.address());
    println!("  Folder: {}", config.folder.display());
    println!("  Tracker: {}", config.tracker);
    println!("  Heartbeat: every {}s", config.heartbeat_interval.as_secs());
    println!("  Files served: {}", node.served_files().await.len());
    println!();

    if let Some(file_name) = &config.download {
        match node.download(file_name).await {
            Ok(report) => display_report(&report),
            Err(e) => {
                if e.downcast_ref::<ShareError>().map_or(false, ShareError::is_not_found) {
                    println!("No peer is serving {}", file_name);
                } else {
                    println!("Download of {} failed: {}", file_name, e);
                }
                error!("Download of {} failed: {:#}", file_name, e);
            }
        }
    }

    info!("Serving files, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    if let Err(e) = node.shutdown().await {
        warn!("Tracker was not told about shutdown: {}", e);
    }
    info!("peershare peer finished");
    Ok(())
}

/// Print the outcome of a download
fn display_report(report: &DownloadReport) {
    println!("Download Summary:");
    println!("  File: {}", report.file_name);
    println!("  Source: {}", report.source);
    println!("  Received: {} of {} bytes", report.received, report.expected_size);
    println!("  Expected md5: {}", report.expected_checksum);
    println!("  Actual md5: {}", report.actual_checksum);
    if report.is_intact() {
        println!("  Status: OK");
    } else {
        println!("  Status: CORRUPTED (file kept on disk)");
    }
    println!();
}
