//! peershare
//!
//! Tracker-coordinated peer-to-peer file sharing: a tracker maps file names
//! to peers, peers serve a folder over TCP and download from each other with
//! md5 verification.

pub mod cli;
pub mod error;
pub mod listener;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::ShareError;

pub use cli::{CliArgs, Command, PeerConfig, TrackerConfig};
pub use listener::{ConnectionListener, ServiceOptions};
pub use peer::{DownloadClient, DownloadReport, FileService, HeartbeatPublisher, NodeOptions, PeerNode, ServedFiles};
pub use protocol::{ControlMessage, ControlStream, Deadlines, FileProperties, PeerAddress};
pub use storage::{DirectoryStore, FileStore};
pub use tracker::{TrackerClient, TrackerDirectory, TrackerService};
