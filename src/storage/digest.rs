//! Content digests
//!
//! md5 over whole files, used for the transfer header and for verifying a
//! finished download.

use std::io::SeekFrom;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::trace;

use crate::error::ShareError;
use crate::protocol::FileProperties;

const DIGEST_BUFFER_SIZE: usize = 64 * 1024;

/// Lowercase hex md5 of an in-memory buffer
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

/// Digest everything `reader` yields, returning the hex md5 and the byte count
pub async fn md5_stream<R>(reader: &mut R) -> Result<(String, u64)>
where
    R: AsyncRead + Unpin,
{
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; DIGEST_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| ShareError::storage_error_full("Failed to read while digesting", "stream", e.to_string()))?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
        total += n as u64;
    }

    Ok((hex::encode(context.compute().0), total))
}

/// Compute the transfer header for a file, then rewind it to byte 0
pub async fn file_properties<F>(file: &mut F) -> Result<FileProperties>
where
    F: AsyncRead + AsyncSeek + Unpin,
{
    file.seek(SeekFrom::Start(0)).await?;
    let (checksum, size) = md5_stream(file).await?;
    file.seek(SeekFrom::Start(0)).await.map_err(|e| {
        ShareError::storage_error_full("Failed to rewind file after digest", "stream", e.to_string())
    })?;

    trace!("Computed properties: {} bytes, md5 {}", size, checksum);
    Ok(FileProperties { size, checksum })
}
