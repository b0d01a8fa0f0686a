//! Heartbeat publisher
//!
//! Pushes the peer's served file list to the tracker on a fixed period.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::peer::files::ServedFiles;
use crate::protocol::PeerAddress;
use crate::storage::FileStore;
use crate::tracker::TrackerClient;

/// Ten minutes between registrations
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Shortest period accepted; a zero interval would never yield
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic `ServedFiles` sender for one peer
pub struct HeartbeatPublisher<S> {
    client: TrackerClient,
    address: PeerAddress,
    files: ServedFiles,
    period: Duration,
    rescan: Option<Arc<S>>,
}

impl<S: FileStore> HeartbeatPublisher<S> {
    /// Periods shorter than [`MIN_HEARTBEAT_INTERVAL`] are raised to it
    pub fn new(client: TrackerClient, address: PeerAddress, files: ServedFiles, period: Duration) -> Self {
        Self {
            client,
            address,
            files,
            period: period.max(MIN_HEARTBEAT_INTERVAL),
            rescan: None,
        }
    }

    /// Re-enumerate `store` before every publish
    pub fn with_rescan(mut self, store: Arc<S>) -> Self {
        self.rescan = Some(store);
        self
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Send the current list once. Used at startup and on every tick.
    pub async fn publish_once(&self) -> Result<()> {
        if let Some(store) = &self.rescan {
            // a failed rescan keeps advertising the previous list
            if let Err(e) = self.files.refresh(store.as_ref()).await {
                warn!("Rescan before heartbeat failed: {}", e);
            }
        }

        let files = self.files.snapshot().await;
        debug!("List of files served by {}: {:?}", self.address, files);
        self.client.publish(&self.address, files).await
    }

    /// Publish every period, forever. The first publish happens one period
    /// from now; failures are logged and retried only on the next tick.
    pub async fn run(self) {
        info!("Heartbeat for {} every {:?}", self.address, self.period);
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.publish_once().await {
                Ok(()) => debug!("Heartbeat sent to {}", self.client.tracker_addr()),
                Err(e) => warn!("Heartbeat to {} failed: {}", self.client.tracker_addr(), e),
            }
        }
    }
}
