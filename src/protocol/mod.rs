//! Control protocol module
//!
//! Line-delimited JSON control messages and the raw payload phase that
//! follows a download header.

pub mod message;
pub mod wire;

// Re-export main types
pub use message::{ControlMessage, FileProperties, PeerAddress};
pub use wire::{encode_control, encode_frame, ControlStream, Deadlines, PayloadTransfer, MAX_LINE_LENGTH};
