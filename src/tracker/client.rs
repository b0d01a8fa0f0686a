//! Tracker client
//!
//! Peer-side calls into the tracker. Every call is its own connection.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::error::ShareError;
use crate::protocol::{ControlMessage, ControlStream, Deadlines, PeerAddress};

/// Talks to one tracker address
#[derive(Debug, Clone)]
pub struct TrackerClient {
    tracker_addr: String,
    deadlines: Deadlines,
}

impl TrackerClient {
    pub fn new(tracker_addr: impl Into<String>, deadlines: Deadlines) -> Self {
        Self {
            tracker_addr: tracker_addr.into(),
            deadlines,
        }
    }

    pub fn tracker_addr(&self) -> &str {
        &self.tracker_addr
    }

    async fn send(&self, message: &ControlMessage) -> Result<ControlStream<tokio::net::TcpStream>> {
        let mut conn = ControlStream::connect(&self.tracker_addr, self.deadlines).await?;
        conn.write_control(message).await?;
        Ok(conn)
    }

    /// Replace the tracker's view of the files `address` serves.
    ///
    /// Fire-and-forget: success means the line was written.
    pub async fn publish(&self, address: &PeerAddress, files: Vec<String>) -> Result<()> {
        debug!("Publishing {} files for {} to {}", files.len(), address, self.tracker_addr);
        self.send(&ControlMessage::ServedFiles {
            address: address.clone(),
            files,
        })
        .await?;
        Ok(())
    }

    /// Tell the tracker `address` is going away
    pub async fn deactivate(&self, address: &PeerAddress) -> Result<()> {
        info!("Deactivating {} at tracker {}", address, self.tracker_addr);
        self.send(&ControlMessage::Deactivate(address.clone())).await?;
        Ok(())
    }

    /// Ask which peer serves `file_name`; `None` when nobody does
    pub async fn locate(&self, file_name: &str) -> Result<Option<PeerAddress>> {
        let mut conn = self
            .send(&ControlMessage::FileLocation {
                file_name: file_name.to_string(),
            })
            .await?;

        let answer: PeerAddress = conn
            .read_frame()
            .await
            .map_err(|e| {
                warn!("Error getting the location of {} from the tracker: {}", file_name, e);
                e
            })?;
        info!("Tracker answered {} for {}", answer, file_name);

        Ok((!answer.is_empty()).then_some(answer))
    }

    /// Like [`locate`](Self::locate), but a missing file is an error
    pub async fn resolve(&self, file_name: &str) -> Result<PeerAddress> {
        match self.locate(file_name).await? {
            Some(address) => Ok(address),
            None => Err(ShareError::not_found(file_name).into()),
        }
    }
}
