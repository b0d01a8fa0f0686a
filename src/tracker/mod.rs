//! Tracker module
//!
//! The central file-location index and its TCP service.

pub mod client;
pub mod directory;
pub mod service;

// Re-export main types
pub use client::TrackerClient;
pub use directory::TrackerDirectory;
pub use service::{TrackerService, DEFAULT_TRACKER_ADDR};
