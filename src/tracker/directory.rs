//! Tracker directory
//!
//! In-memory index from peer address to the files that peer serves.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use crate::protocol::PeerAddress;

#[derive(Debug, Default)]
struct DirectoryState {
    /// Peer address -> files it currently claims to serve
    file_hosts: HashMap<PeerAddress, Vec<String>>,
    /// Addresses seen registering while they had no entry
    active_peers: HashSet<PeerAddress>,
}

/// Authoritative, non-persistent file location index.
///
/// Every operation holds one exclusive lock for its whole read-modify-write
/// body and never across network I/O. Nothing here fails: a lookup that
/// finds nothing is `None`.
#[derive(Debug, Default)]
pub struct TrackerDirectory {
    state: Mutex<DirectoryState>,
}

impl TrackerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the file list served by `address`.
    ///
    /// An address with no prior entry is also recorded as active. Active
    /// bookkeeping is never cleared, not even by [`deregister`](Self::deregister).
    pub async fn register(&self, address: PeerAddress, files: Vec<String>) {
        let mut state = self.state.lock().await;
        if state.file_hosts.remove(&address).is_none() {
            debug!("First registration from {}", address);
            state.active_peers.insert(address.clone());
        }
        info!("{} serves {} files", address, files.len());
        trace!("Files served by {}: {:?}", address, files);
        state.file_hosts.insert(address, files);
    }

    /// Drop the entry for `address`. Returns whether one existed.
    pub async fn deregister(&self, address: &PeerAddress) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.file_hosts.remove(address).is_some();
        if removed {
            info!("Deregistered {}", address);
        } else {
            debug!("Deregister for unknown peer {}", address);
        }
        removed
    }

    /// Find a peer serving `file_name`.
    ///
    /// Scans every entry; when several peers serve the same name the last
    /// one met in iteration order wins. No preference is promised.
    pub async fn locate(&self, file_name: &str) -> Option<PeerAddress> {
        let state = self.state.lock().await;
        let mut found = None;
        for (address, files) in state.file_hosts.iter() {
            if files.iter().any(|f| f == file_name) {
                found = Some(address);
            }
        }
        debug!("Locate {} -> {:?}", file_name, found.map(|a| a.to_string()));
        found.cloned()
    }

    /// Snapshot of the files registered for `address`
    pub async fn files_for(&self, address: &PeerAddress) -> Option<Vec<String>> {
        self.state.lock().await.file_hosts.get(address).cloned()
    }

    /// Number of addresses with a directory entry
    pub async fn peer_count(&self) -> usize {
        self.state.lock().await.file_hosts.len()
    }

    pub async fn is_active(&self, address: &PeerAddress) -> bool {
        self.state.lock().await.active_peers.contains(address)
    }

    /// Addresses ever recorded as active, sorted by canonical form
    pub async fn active_peers(&self) -> Vec<PeerAddress> {
        let state = self.state.lock().await;
        let mut peers: Vec<PeerAddress> = state.active_peers.iter().cloned().collect();
        peers.sort_by_key(|a| a.canonical());
        peers
    }
}
