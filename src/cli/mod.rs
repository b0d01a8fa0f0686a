//! CLI module
//!
//! Command-line interface for the tracker and peer roles.

pub mod args;
pub mod config;

pub use args::{CliArgs, Command, ConnectionArgs, PeerArgs, TrackerArgs};
pub use config::{PeerConfig, TrackerConfig};
