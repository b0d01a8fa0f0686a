//! Peer side
//!
//! Serving files, keeping the tracker informed and downloading from other
//! peers.

pub mod download;
pub mod files;
pub mod heartbeat;
pub mod node;
pub mod server;

pub use download::{DownloadClient, DownloadReport, DEFAULT_READ_BUFFER_SIZE};
pub use files::ServedFiles;
pub use heartbeat::{HeartbeatPublisher, DEFAULT_HEARTBEAT_INTERVAL, MIN_HEARTBEAT_INTERVAL};
pub use node::{NodeOptions, PeerNode, DEFAULT_PEER_PORT};
pub use server::{serve_download, FileService, DEFAULT_TRANSFER_CHUNK_SIZE};
