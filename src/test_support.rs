//! Shared fixtures for tests that need a live tracker

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::listener::ServiceOptions;
use crate::tracker::{TrackerDirectory, TrackerService};

/// Tracker on an ephemeral local port, already serving
pub(crate) async fn start_tracker() -> (String, Arc<TrackerDirectory>, JoinHandle<Result<()>>) {
    let directory = Arc::new(TrackerDirectory::new());
    let service = TrackerService::bind("127.0.0.1:0", directory.clone(), ServiceOptions::default())
        .await
        .unwrap();
    let addr = service.local_addr().unwrap().to_string();
    (addr, directory, tokio::spawn(service.run()))
}

/// Poll until the directory holds `count` entries
pub(crate) async fn wait_for_peers(directory: &TrackerDirectory, count: usize) {
    for _ in 0..200 {
        if directory.peer_count().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("tracker never reached {} peers", count);
}

/// A local address nothing is listening on
pub(crate) async fn unused_addr() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}
