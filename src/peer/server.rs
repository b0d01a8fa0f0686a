//! Peer file service
//!
//! Answers one download request per connection: a [`FileProperties`]
//! header line, then the raw file bytes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::error::ShareError;
use crate::listener::{ConnectionListener, ServiceOptions};
use crate::protocol::{ControlMessage, ControlStream, Deadlines, FileProperties};
use crate::storage::{file_properties, FileStore};

/// Bytes per write while streaming a file
pub const DEFAULT_TRANSFER_CHUNK_SIZE: usize = 1024;

/// TCP listener serving files out of a [`FileStore`]
pub struct FileService<S> {
    listener: ConnectionListener,
    store: Arc<S>,
    chunk_size: usize,
    options: ServiceOptions,
}

impl<S: FileStore> FileService<S> {
    pub async fn bind(addr: &str, store: Arc<S>, chunk_size: usize, options: ServiceOptions) -> Result<Self> {
        let listener = ConnectionListener::bind(addr, "file service", options.max_connections).await?;
        Ok(Self {
            listener,
            store,
            chunk_size,
            options,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve downloads until accepting fails
    pub async fn run(self) -> Result<()> {
        let store = self.store;
        let chunk_size = self.chunk_size;
        let deadlines = self.options.deadlines;

        self.listener
            .serve(move |stream, peer| {
                let store = store.clone();
                async move {
                    serve_download(store.as_ref(), stream, peer.to_string(), chunk_size, deadlines)
                        .await
                        .map(|_| ())
                }
            })
            .await
    }
}

/// Handle one download connection; returns the number of payload bytes sent.
///
/// Any failure (bad request, missing file) closes the connection without a
/// reply.
pub async fn serve_download<S, T>(
    store: &S,
    stream: T,
    peer: String,
    chunk_size: usize,
    deadlines: Deadlines,
) -> Result<u64>
where
    S: FileStore,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = ControlStream::new(stream, peer, deadlines);
    let file_name = match conn.read_control().await? {
        ControlMessage::Download { file_name } => file_name,
        other => {
            return Err(
                ShareError::protocol_error_with_source("Unsupported request for file service", other.kind()).into(),
            );
        }
    };
    debug!("File requested by {}: {}", conn.peer(), file_name);

    let mut file = store.open(&file_name).await.map_err(|e| {
        error!("Unable to open {} for {}: {}", file_name, conn.peer(), e);
        e
    })?;

    let properties: FileProperties = file_properties(&mut file).await?;
    conn.write_frame(&properties).await?;

    info!("Sending {} ({} bytes) to {}", file_name, properties.size, conn.peer());
    let sent = conn.write_payload(&mut file, chunk_size).await?;
    if sent != properties.size {
        warn!(
            "{} changed while being sent: announced {} bytes, sent {}",
            file_name, properties.size, sent
        );
    }
    info!("Completed sending {} to {}", file_name, conn.peer());
    Ok(sent)
}
