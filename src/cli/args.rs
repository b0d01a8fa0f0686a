//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::peer::{DEFAULT_PEER_PORT, DEFAULT_READ_BUFFER_SIZE, DEFAULT_TRANSFER_CHUNK_SIZE};
use crate::tracker::DEFAULT_TRACKER_ADDR;

/// CLI arguments for the file sharing network
#[derive(Debug, Parser)]
#[command(name = "peershare")]
#[command(about = "Tracker-coordinated peer-to-peer file sharing", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Which role this process plays
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the tracker
    Tracker(TrackerArgs),
    /// Run a peer serving a folder
    Peer(PeerArgs),
}

#[derive(Debug, Clone, Args)]
pub struct TrackerArgs {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_TRACKER_ADDR)]
    pub listen: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Args)]
pub struct PeerArgs {
    /// Listening port for the file service
    #[arg(short, long, default_value_t = DEFAULT_PEER_PORT)]
    pub port: u16,

    /// Folder to serve; downloads are saved here too
    #[arg(short, long, value_name = "DIR")]
    pub folder: PathBuf,

    /// File to download after startup
    #[arg(short, long, value_name = "FILE")]
    pub download: Option<String>,

    /// Host name advertised to the tracker
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Tracker address
    #[arg(short, long, default_value = DEFAULT_TRACKER_ADDR)]
    pub tracker: String,

    /// Seconds between heartbeats
    #[arg(long, default_value_t = 600)]
    pub heartbeat_secs: u64,

    /// Bytes per write when sending a file
    #[arg(long, default_value_t = DEFAULT_TRANSFER_CHUNK_SIZE)]
    pub transfer_chunk_size: usize,

    /// Bytes per read when receiving a file
    #[arg(long, default_value_t = DEFAULT_READ_BUFFER_SIZE)]
    pub read_buffer_size: usize,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Limits shared by both roles
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Maximum number of connections handled at once
    #[arg(short, long, default_value_t = crate::listener::DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Read deadline in seconds (0 = none)
    #[arg(long, default_value_t = 0)]
    pub read_timeout_secs: u64,

    /// Write deadline in seconds (0 = none)
    #[arg(long, default_value_t = 0)]
    pub write_timeout_secs: u64,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
