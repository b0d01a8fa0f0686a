//! Control messages
//!
//! Every control message is one line of JSON. Requests carry a `Type`
//! discriminator; replies (peer address, file properties) are untagged.

use std::fmt;
use std::hash::{Hash, Hasher};

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, trace};

use crate::error::ShareError;

/// Network address of a peer's file service.
///
/// Serialized as `{"NodeIP": .., "NodePort": ..}`. Two addresses are equal
/// when their canonical `host:port` strings are equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerAddress {
    #[serde(rename = "NodeIP", default)]
    pub host: String,
    #[serde(rename = "NodePort", default)]
    pub port: String,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }

    /// The zero address the tracker answers with when no peer serves a file
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty() && self.port.is_empty()
    }

    /// Canonical `host:port` form, used as the directory key and for dialing
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl PartialEq for PeerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for PeerAddress {}

impl Hash for PeerAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

/// Transfer header sent by the serving peer before the raw file bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperties {
    #[serde(rename = "Size")]
    pub size: u64,
    /// Lowercase hex md5 of the whole file
    #[serde(rename = "Md5sum")]
    pub checksum: String,
}

/// Typed request carried by one control line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Peer going offline; tracker drops its directory entry
    Deactivate(PeerAddress),
    /// Full replacement of the files a peer serves
    ServedFiles {
        address: PeerAddress,
        files: Vec<String>,
    },
    /// Ask the tracker which peer serves a file
    FileLocation { file_name: String },
    /// Ask a peer to stream a file
    Download { file_name: String },
}

// Only the discriminator. Older peers send it as `ReqType`.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Type", alias = "ReqType")]
    kind: String,
}

#[derive(Serialize, Deserialize)]
struct ServedFilesBody {
    #[serde(flatten)]
    address: PeerAddress,
    #[serde(rename = "Files", default, deserialize_with = "null_as_empty")]
    files: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct FileNameBody {
    #[serde(rename = "FileName")]
    file_name: String,
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "Type")]
    kind: &'a str,
    #[serde(flatten)]
    body: T,
}

// A peer with nothing to serve may send `"Files": null`.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn decode_body<T: DeserializeOwned>(line: &str) -> std::result::Result<T, ShareError> {
    serde_json::from_str(line).map_err(ShareError::from)
}

impl ControlMessage {
    pub const DEACTIVATE: &'static str = "Deactivate";
    pub const SERVED_FILES: &'static str = "ServedFiles";
    pub const FILE_LOCATION: &'static str = "FileLocation";
    pub const DOWNLOAD: &'static str = "Download";

    /// The `Type` tag of this message
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Deactivate(_) => Self::DEACTIVATE,
            ControlMessage::ServedFiles { .. } => Self::SERVED_FILES,
            ControlMessage::FileLocation { .. } => Self::FILE_LOCATION,
            ControlMessage::Download { .. } => Self::DOWNLOAD,
        }
    }

    /// Serialize to a JSON object (no trailing newline)
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let kind = self.kind();
        let encoded = match self {
            ControlMessage::Deactivate(address) => serde_json::to_vec(&Tagged { kind, body: address }),
            ControlMessage::ServedFiles { address, files } => serde_json::to_vec(&Tagged {
                kind,
                body: ServedFilesBody {
                    address: address.clone(),
                    files: files.clone(),
                },
            }),
            ControlMessage::FileLocation { file_name } | ControlMessage::Download { file_name } => {
                serde_json::to_vec(&Tagged {
                    kind,
                    body: FileNameBody {
                        file_name: file_name.clone(),
                    },
                })
            }
        }
        .map_err(|e| ShareError::protocol_error_with_source("Failed to encode control message", e.to_string()))?;

        trace!("Encoded {} message ({} bytes)", kind, encoded.len());
        Ok(encoded)
    }

    /// Decode one control line.
    ///
    /// The discriminator is read first; the line is then decoded again
    /// against the shape that tag implies. Unknown tags are protocol errors.
    pub fn decode(line: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(line).map_err(|e| {
            ShareError::protocol_error_with_source("Control message has no readable Type", e.to_string())
        })?;
        debug!("Decoding {} control message", envelope.kind);

        let message = match envelope.kind.as_str() {
            Self::DEACTIVATE => ControlMessage::Deactivate(decode_body(line)?),
            Self::SERVED_FILES => {
                let body: ServedFilesBody = decode_body(line)?;
                ControlMessage::ServedFiles {
                    address: body.address,
                    files: body.files,
                }
            }
            Self::FILE_LOCATION => ControlMessage::FileLocation {
                file_name: decode_body::<FileNameBody>(line)?.file_name,
            },
            Self::DOWNLOAD => ControlMessage::Download {
                file_name: decode_body::<FileNameBody>(line)?.file_name,
            },
            other => {
                return Err(ShareError::protocol_error_with_source("Unknown request type", other.to_string()).into());
            }
        };
        Ok(message)
    }
}
