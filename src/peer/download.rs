//! Download client
//!
//! Locates a file through the tracker, pulls it from the serving peer into
//! the local store and checks it against the advertised digest.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::error::ShareError;
use crate::protocol::{ControlMessage, ControlStream, Deadlines, FileProperties, PeerAddress};
use crate::storage::FileStore;
use crate::tracker::TrackerClient;

/// Bytes per read while receiving a file
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Outcome of one completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub file_name: String,
    pub source: PeerAddress,
    pub expected_size: u64,
    pub received: u64,
    pub expected_checksum: String,
    pub actual_checksum: String,
}

impl DownloadReport {
    /// Every announced byte arrived and the digests agree
    pub fn is_intact(&self) -> bool {
        self.received == self.expected_size && self.expected_checksum == self.actual_checksum
    }

    /// Turn a damaged transfer into an [`ShareError::IntegrityError`]
    pub fn into_verified(self) -> Result<Self> {
        if self.is_intact() {
            Ok(self)
        } else {
            Err(ShareError::integrity_error(self.file_name, self.expected_checksum, self.actual_checksum).into())
        }
    }
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {}: {}/{} bytes, md5 {}",
            self.file_name,
            self.source,
            self.received,
            self.expected_size,
            if self.is_intact() { "ok" } else { "MISMATCH" }
        )
    }
}

/// Fetches files into a [`FileStore`]
pub struct DownloadClient<S> {
    tracker: TrackerClient,
    store: Arc<S>,
    read_buffer_size: usize,
    deadlines: Deadlines,
}

impl<S: FileStore> DownloadClient<S> {
    pub fn new(tracker: TrackerClient, store: Arc<S>, read_buffer_size: usize, deadlines: Deadlines) -> Self {
        Self {
            tracker,
            store,
            read_buffer_size,
            deadlines,
        }
    }

    /// Locate `file_name` and download it.
    ///
    /// Fails with [`ShareError::NotFound`] before contacting any peer when
    /// the tracker knows no location. A damaged transfer still returns a
    /// report; check [`DownloadReport::is_intact`].
    pub async fn download(&self, file_name: &str) -> Result<DownloadReport> {
        let source = self.tracker.resolve(file_name).await.map_err(|e| {
            if e.downcast_ref::<ShareError>().map_or(false, ShareError::is_not_found) {
                warn!("Tracker has no location for {}", file_name);
            }
            e
        })?;
        self.fetch_from(&source, file_name).await
    }

    /// Download `file_name` directly from `source`
    pub async fn fetch_from(&self, source: &PeerAddress, file_name: &str) -> Result<DownloadReport> {
        let addr = source.canonical();
        info!("Downloading {} from {}", file_name, addr);

        let mut conn = ControlStream::connect(&addr, self.deadlines).await?;
        conn.write_control(&ControlMessage::Download {
            file_name: file_name.to_string(),
        })
        .await?;

        let properties: FileProperties = conn.read_frame().await.map_err(|e| {
            warn!("No file header from {} for {}: {}", addr, file_name, e);
            e
        })?;
        debug!("Header for {}: {:?}", file_name, properties);

        let mut file = self.store.create(file_name).await?;
        let transfer = conn.read_payload(properties.size, &mut file, self.read_buffer_size).await?;
        drop(file);
        if !transfer.is_complete() {
            warn!(
                "Transfer of {} ended early: {} of {} bytes",
                file_name, transfer.received, transfer.expected
            );
        }

        let actual_checksum = self.store.checksum(file_name).await?;
        let report = DownloadReport {
            file_name: file_name.to_string(),
            source: source.clone(),
            expected_size: properties.size,
            received: transfer.received,
            expected_checksum: properties.checksum,
            actual_checksum,
        };

        if report.is_intact() {
            info!("Download completed: {}", report);
        } else {
            warn!(
                "Downloaded file is corrupted: {} (expected md5 {}, got {})",
                file_name, report.expected_checksum, report.actual_checksum
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{start_tracker, wait_for_peers};
    use crate::listener::ServiceOptions;
    use crate::peer::server::FileService;
    use crate::storage::{md5_hex, DirectoryStore};
    use rand::RngCore;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answers one download with `header` followed by `body`, whatever was asked
    async fn fake_peer(header: FileProperties, body: Vec<u8>) -> (PeerAddress, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let mut conn = ControlStream::new(stream, peer.to_string(), Deadlines::none());
            conn.read_control().await.unwrap();
            conn.write_frame(&header).await.unwrap();
            let mut stream = conn.into_inner();
            stream.write_all(&body).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        (PeerAddress::new("127.0.0.1", port.to_string()), handle)
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    #[tokio::test]
    async fn test_download_through_tracker() {
        let (tracker_addr, directory, tracker) = start_tracker().await;

        let serving_dir = TempDir::new().unwrap();
        let data = random_bytes(10_000);
        std::fs::write(serving_dir.path().join("payload.bin"), &data).unwrap();
        let service = FileService::bind(
            "127.0.0.1:0",
            Arc::new(DirectoryStore::new(serving_dir.path())),
            1024,
            ServiceOptions::default(),
        )
        .await
        .unwrap();
        let serving = PeerAddress::new("127.0.0.1", service.local_addr().unwrap().port().to_string());
        let server = tokio::spawn(service.run());

        let tracker_client = TrackerClient::new(tracker_addr, Deadlines::none());
        tracker_client.publish(&serving, vec!["payload.bin".to_string()]).await.unwrap();
        wait_for_peers(&directory, 1).await;

        let target_dir = TempDir::new().unwrap();
        let client = DownloadClient::new(
            tracker_client,
            Arc::new(DirectoryStore::new(target_dir.path())),
            DEFAULT_READ_BUFFER_SIZE,
            Deadlines::none(),
        );
        let report = client.download("payload.bin").await.unwrap();

        assert!(report.is_intact());
        assert_eq!(report.source, serving);
        assert_eq!(report.expected_checksum, md5_hex(&data));
        assert_eq!(std::fs::read(target_dir.path().join("payload.bin")).unwrap(), data);
        assert!(report.into_verified().is_ok());

        server.abort();
        tracker.abort();
    }

    #[tokio::test]
    async fn test_corrupted_payload_is_reported() {
        let data = random_bytes(4096);
        let mut tampered = data.clone();
        tampered[100] ^= 0xff;

        let header = FileProperties {
            size: data.len() as u64,
            checksum: md5_hex(&data),
        };
        let (source, peer) = fake_peer(header, tampered.clone()).await;

        let target_dir = TempDir::new().unwrap();
        let client = DownloadClient::new(
            TrackerClient::new("127.0.0.1:1", Deadlines::none()),
            Arc::new(DirectoryStore::new(target_dir.path())),
            300,
            Deadlines::none(),
        );
        let report = client.fetch_from(&source, "tampered.bin").await.unwrap();
        peer.await.unwrap();

        assert_eq!(report.received, data.len() as u64);
        assert!(!report.is_intact());
        assert_eq!(report.actual_checksum, md5_hex(&tampered));
        // the damaged file stays on disk
        assert_eq!(std::fs::read(target_dir.path().join("tampered.bin")).unwrap(), tampered);

        let err = report.into_verified().unwrap_err();
        assert!(err.downcast_ref::<ShareError>().unwrap().is_integrity_error());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_reported() {
        let data = random_bytes(2048);
        let header = FileProperties {
            size: data.len() as u64,
            checksum: md5_hex(&data),
        };
        let (source, peer) = fake_peer(header, data[..1000].to_vec()).await;

        let target_dir = TempDir::new().unwrap();
        let client = DownloadClient::new(
            TrackerClient::new("127.0.0.1:1", Deadlines::none()),
            Arc::new(DirectoryStore::new(target_dir.path())),
            DEFAULT_READ_BUFFER_SIZE,
            Deadlines::none(),
        );
        let report = client.fetch_from(&source, "short.bin").await.unwrap();
        peer.await.unwrap();

        assert_eq!(report.received, 1000);
        assert_eq!(report.expected_size, 2048);
        assert!(!report.is_intact());
    }

    #[tokio::test]
    async fn test_unknown_file_is_not_found() {
        let (tracker_addr, _directory, tracker) = start_tracker().await;
        let target_dir = TempDir::new().unwrap();
        let client = DownloadClient::new(
            TrackerClient::new(tracker_addr, Deadlines::none()),
            Arc::new(DirectoryStore::new(target_dir.path())),
            DEFAULT_READ_BUFFER_SIZE,
            Deadlines::none(),
        );

        let err = client.download("nobody-has-this").await.unwrap_err();
        assert!(err.downcast_ref::<ShareError>().unwrap().is_not_found());
        assert!(!target_dir.path().join("nobody-has-this").exists());
        tracker.abort();
    }

    #[test]
    fn test_report_display() {
        let report = DownloadReport {
            file_name: "a".to_string(),
            source: PeerAddress::new("h", "1"),
            expected_size: 3,
            received: 3,
            expected_checksum: "x".to_string(),
            actual_checksum: "x".to_string(),
        };
        assert_eq!(report.to_string(), "a from h:1: 3/3 bytes, md5 ok");
    }
}
