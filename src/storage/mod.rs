//! Storage module
//!
//! Local served-folder access and content digests.

pub mod digest;
pub mod store;

// Re-export digest helpers
pub use digest::{file_properties, md5_hex, md5_stream};

// Re-export store types
pub use store::{DirectoryStore, FileStore};
