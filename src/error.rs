//! Error types for the file sharing network
//!
//! This module defines the error taxonomy shared by the tracker, the peer
//! file service and the download client.

use std::fmt;

/// Error type for tracker and peer operations
#[derive(Debug, Clone)]
pub enum ShareError {
    /// Malformed or undecodable control line
    ProtocolError {
        message: String,
        source: Option<String>,
    },

    /// Dial, accept, read or write failures
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Local file open/create/read/write failures
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// No peer in the tracker directory serves the file
    NotFound {
        file_name: String,
    },

    /// Downloaded content does not match the announced digest
    IntegrityError {
        file_name: String,
        expected: String,
        actual: String,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl ShareError {
    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        ShareError::ProtocolError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ProtocolError with source
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::ProtocolError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        ShareError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address
    pub fn network_error_with_address(message: impl Into<String>, address: impl Into<String>) -> Self {
        ShareError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new StorageError with path
    pub fn storage_error_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        ShareError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new NotFound error
    pub fn not_found(file_name: impl Into<String>) -> Self {
        ShareError::NotFound {
            file_name: file_name.into(),
        }
    }

    /// Create a new IntegrityError
    pub fn integrity_error(
        file_name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        ShareError::IntegrityError {
            file_name: file_name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        ShareError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// True when the tracker had no location for the requested file
    pub fn is_not_found(&self) -> bool {
        matches!(self, ShareError::NotFound { .. })
    }

    /// True for digest mismatches
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, ShareError::IntegrityError { .. })
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            ShareError::ProtocolError { source, .. }
            | ShareError::NetworkError { source, .. }
            | ShareError::StorageError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareError::ProtocolError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Protocol error: {} (source: {})", message, src)
                } else {
                    write!(f, "Protocol error: {}", message)
                }
            }
            ShareError::NetworkError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
            ShareError::StorageError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Storage error: {}", message),
                }
            }
            ShareError::NotFound { file_name } => {
                write!(f, "File not found in tracker directory: {}", file_name)
            }
            ShareError::IntegrityError { file_name, expected, actual } => {
                write!(
                    f,
                    "Integrity error: {} is corrupted (expected md5 {}, got {})",
                    file_name, expected, actual
                )
            }
            ShareError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for ShareError {}

impl From<std::io::Error> for ShareError {
    fn from(err: std::io::Error) -> Self {
        ShareError::network_error_full(err.to_string(), "unknown".to_string(), err.kind().to_string())
    }
}

impl From<serde_json::Error> for ShareError {
    fn from(err: serde_json::Error) -> Self {
        ShareError::protocol_error_with_source("Failed to decode control message", err.to_string())
    }
}

impl From<std::net::AddrParseError> for ShareError {
    fn from(err: std::net::AddrParseError) -> Self {
        ShareError::network_error_full("Failed to parse address", "unknown".to_string(), err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ShareError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        ShareError::network_error("Operation timed out")
    }
}
