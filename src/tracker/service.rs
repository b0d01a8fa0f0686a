//! Tracker service
//!
//! TCP front end of the [`TrackerDirectory`]. Each connection carries at
//! most one control message; only location queries get a reply.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::ShareError;
use crate::listener::{ConnectionListener, ServiceOptions};
use crate::protocol::{ControlMessage, ControlStream, Deadlines, PeerAddress};
use crate::tracker::directory::TrackerDirectory;

/// Well-known tracker address peers use by default
pub const DEFAULT_TRACKER_ADDR: &str = "localhost:27001";

/// The tracker's listener plus the directory it serves
pub struct TrackerService {
    listener: ConnectionListener,
    directory: Arc<TrackerDirectory>,
    options: ServiceOptions,
}

impl TrackerService {
    /// Bind the tracker listener
    pub async fn bind(addr: &str, directory: Arc<TrackerDirectory>, options: ServiceOptions) -> Result<Self> {
        let listener = ConnectionListener::bind(addr, "tracker", options.max_connections).await?;
        Ok(Self {
            listener,
            directory,
            options,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn directory(&self) -> Arc<TrackerDirectory> {
        self.directory.clone()
    }

    /// Serve connections until accepting fails
    pub async fn run(self) -> Result<()> {
        let directory = self.directory;
        let deadlines = self.options.deadlines;
        self.listener
            .serve(move |stream, peer| handle_connection(directory.clone(), stream, peer, deadlines))
            .await
    }
}

/// Read one control message from `stream` and apply it to `directory`
pub async fn handle_connection(
    directory: Arc<TrackerDirectory>,
    stream: TcpStream,
    peer: SocketAddr,
    deadlines: Deadlines,
) -> Result<()> {
    let mut conn = ControlStream::new(stream, peer.to_string(), deadlines);
    let request = conn.read_control().await?;
    debug!("Tracker request from {}: {:?}", peer, request);

    match request {
        ControlMessage::Deactivate(address) => {
            directory.deregister(&address).await;
        }
        ControlMessage::ServedFiles { address, files } => {
            directory.register(address, files).await;
        }
        ControlMessage::FileLocation { file_name } => {
            let answer = directory.locate(&file_name).await.unwrap_or_else(PeerAddress::empty);
            if answer.is_empty() {
                info!("No peer serves {} (asked by {})", file_name, peer);
            } else {
                info!("{} is served by {} (asked by {})", file_name, answer, peer);
            }
            conn.write_frame(&answer).await?;
        }
        other => {
            warn!("Unsupported request {} from {}", other.kind(), peer);
            return Err(ShareError::protocol_error_with_source("Unsupported request for tracker", other.kind()).into());
        }
    }
    Ok(())
}
