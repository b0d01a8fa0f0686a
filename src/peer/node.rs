//! Peer node
//!
//! Wires the file service, heartbeat and download client together for one
//! served folder.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::ShareError;
use crate::listener::ServiceOptions;
use crate::peer::download::{DownloadClient, DownloadReport, DEFAULT_READ_BUFFER_SIZE};
use crate::peer::files::ServedFiles;
use crate::peer::heartbeat::{HeartbeatPublisher, DEFAULT_HEARTBEAT_INTERVAL};
use crate::peer::server::{FileService, DEFAULT_TRANSFER_CHUNK_SIZE};
use crate::protocol::PeerAddress;
use crate::storage::DirectoryStore;
use crate::tracker::{TrackerClient, DEFAULT_TRACKER_ADDR};

/// Default port for the file service
pub const DEFAULT_PEER_PORT: u16 = 8080;

/// Everything a peer needs to start
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Folder whose files are served and where downloads land
    pub folder: PathBuf,
    /// Host name advertised to the tracker
    pub host: String,
    /// Listen port; 0 picks a free one
    pub port: u16,
    pub tracker_addr: String,
    pub heartbeat_interval: Duration,
    pub transfer_chunk_size: usize,
    pub read_buffer_size: usize,
    pub service: ServiceOptions,
}

impl NodeOptions {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            host: "localhost".to_string(),
            port: DEFAULT_PEER_PORT,
            tracker_addr: DEFAULT_TRACKER_ADDR.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            transfer_chunk_size: DEFAULT_TRANSFER_CHUNK_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            service: ServiceOptions::default(),
        }
    }

    /// Wildcard address the file service binds
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let addr = format!("0.0.0.0:{}", self.port)
            .parse::<SocketAddr>()
            .map_err(ShareError::from)?;
        Ok(addr)
    }
}

/// A running peer
pub struct PeerNode {
    address: PeerAddress,
    listen_addr: SocketAddr,
    store: Arc<DirectoryStore>,
    files: ServedFiles,
    tracker: TrackerClient,
    downloader: DownloadClient<DirectoryStore>,
    service_task: JoinHandle<Result<()>>,
    heartbeat_task: JoinHandle<()>,
}

impl PeerNode {
    /// Scan the folder, start serving, register with the tracker and start
    /// the heartbeat.
    ///
    /// An unreadable folder or an unbindable port fails startup; an
    /// unreachable tracker does not.
    pub async fn start(options: NodeOptions) -> Result<Self> {
        let store = Arc::new(DirectoryStore::new(options.folder.clone()));
        let files = ServedFiles::new();
        let count = files
            .refresh(store.as_ref())
            .await
            .with_context(|| format!("Unable to read served folder {}", options.folder.display()))?;
        info!("Serving {} files from {}", count, options.folder.display());

        let bind_addr = options.bind_addr()?.to_string();
        let service = FileService::bind(&bind_addr, store.clone(), options.transfer_chunk_size, options.service).await?;
        let listen_addr = service.local_addr()?;
        let address = PeerAddress::new(options.host.clone(), listen_addr.port().to_string());
        info!("Peer {} listening on {}", address, listen_addr);

        let service_task = tokio::spawn(service.run());

        let tracker = TrackerClient::new(options.tracker_addr.clone(), options.service.deadlines);
        let heartbeat = HeartbeatPublisher::new(
            tracker.clone(),
            address.clone(),
            files.clone(),
            options.heartbeat_interval,
        )
        .with_rescan(store.clone());
        if let Err(e) = heartbeat.publish_once().await {
            warn!("Initial registration with {} failed: {}", options.tracker_addr, e);
        }
        let heartbeat_task = tokio::spawn(heartbeat.run());

        let downloader = DownloadClient::new(
            tracker.clone(),
            store.clone(),
            options.read_buffer_size,
            options.service.deadlines,
        );

        Ok(Self {
            address,
            listen_addr,
            store,
            files,
            tracker,
            downloader,
            service_task,
            heartbeat_task,
        })
    }

    /// Address advertised to the tracker
    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub async fn served_files(&self) -> Vec<String> {
        self.files.snapshot().await
    }

    /// Download `file_name` into the served folder.
    ///
    /// The new file is added to the local list right away and reaches the
    /// tracker with the next heartbeat.
    pub async fn download(&self, file_name: &str) -> Result<DownloadReport> {
        let report = self.downloader.download(file_name).await?;
        if let Err(e) = self.files.refresh(self.store.as_ref()).await {
            warn!("Rescan after downloading {} failed: {}", file_name, e);
        }
        Ok(report)
    }

    /// Deregister from the tracker and stop serving
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down peer {}", self.address);
        let result = self.tracker.deactivate(&self.address).await;
        if let Err(e) = &result {
            warn!("Deactivation of {} failed: {}", self.address, e);
        }
        self.heartbeat_task.abort();
        self.service_task.abort();
        result
    }
}
