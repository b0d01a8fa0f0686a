//! CLI configuration module
//!
//! Turns parsed arguments into validated tracker and peer settings.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Semaphore;

use crate::cli::args::{ConnectionArgs, PeerArgs, TrackerArgs};
use crate::error::ShareError;
use crate::listener::ServiceOptions;
use crate::peer::NodeOptions;
use crate::protocol::Deadlines;

impl ConnectionArgs {
    /// Listener options these flags describe
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            max_connections: self.max_connections,
            deadlines: Deadlines::from_secs(self.read_timeout_secs, self.write_timeout_secs),
        }
    }
}

/// Configuration for the tracker role
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Address the tracker listens on
    pub listen: String,
    pub service: ServiceOptions,
}

impl TrackerConfig {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &TrackerArgs) -> Self {
        Self {
            listen: args.listen.clone(),
            service: args.connection.service_options(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_address(&self.listen, "listen")?;
        validate_service(&self.service)
    }
}

/// Configuration for the peer role
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Served folder, also the download destination
    pub folder: PathBuf,
    pub port: u16,
    pub host: String,
    pub tracker: String,
    /// File to fetch once the peer is up
    pub download: Option<String>,
    pub heartbeat_interval: Duration,
    pub transfer_chunk_size: usize,
    pub read_buffer_size: usize,
    pub service: ServiceOptions,
}

impl PeerConfig {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &PeerArgs) -> Self {
        Self {
            folder: args.folder.clone(),
            port: args.port,
            host: args.host.clone(),
            tracker: args.tracker.clone(),
            download: args.download.clone(),
            heartbeat_interval: Duration::from_secs(args.heartbeat_secs),
            transfer_chunk_size: args.transfer_chunk_size,
            read_buffer_size: args.read_buffer_size,
            service: args.connection.service_options(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ShareError::config_error_with_field("Port cannot be 0", "port").into());
        }
        if self.folder.as_os_str().is_empty() {
            return Err(ShareError::config_error_with_field("Folder cannot be empty", "folder").into());
        }
        if self.host.is_empty() {
            return Err(ShareError::config_error_with_field("Host cannot be empty", "host").into());
        }
        validate_address(&self.tracker, "tracker")?;

        if self.heartbeat_interval.is_zero() {
            return Err(
                ShareError::config_error_with_field("Heartbeat interval must be at least 1 second", "heartbeat_secs")
                    .into(),
            );
        }
        if self.transfer_chunk_size == 0 {
            return Err(
                ShareError::config_error_with_field("transfer_chunk_size must be at least 1", "transfer_chunk_size")
                    .into(),
            );
        }
        if self.read_buffer_size == 0 {
            return Err(
                ShareError::config_error_with_field("read_buffer_size must be at least 1", "read_buffer_size").into(),
            );
        }
        if matches!(&self.download, Some(name) if name.is_empty()) {
            return Err(ShareError::config_error_with_field("Download file name cannot be empty", "download").into());
        }

        validate_service(&self.service)
    }

    /// Options for starting a [`PeerNode`](crate::peer::PeerNode)
    pub fn node_options(&self) -> NodeOptions {
        NodeOptions {
            folder: self.folder.clone(),
            host: self.host.clone(),
            port: self.port,
            tracker_addr: self.tracker.clone(),
            heartbeat_interval: self.heartbeat_interval,
            transfer_chunk_size: self.transfer_chunk_size,
            read_buffer_size: self.read_buffer_size,
            service: self.service,
        }
    }
}

fn validate_address(addr: &str, field: &str) -> Result<()> {
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ShareError::config_error_with_field(format!("Invalid address '{}', expected host:port", addr), field)
            .into()),
    }
}

fn validate_service(service: &ServiceOptions) -> Result<()> {
    if service.max_connections == 0 {
        return Err(ShareError::config_error_with_field("max_connections must be at least 1", "max_connections").into());
    }
    if service.max_connections > Semaphore::MAX_PERMITS {
        return Err(ShareError::config_error_with_field(
            format!("max_connections cannot exceed {}", Semaphore::MAX_PERMITS),
            "max_connections",
        )
        .into());
    }
    Ok(())
}
