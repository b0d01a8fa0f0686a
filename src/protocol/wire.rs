//! Wire framing
//!
//! A connection starts in the control phase: newline-terminated JSON lines.
//! A download then switches to the payload phase, where exactly `size` raw
//! bytes follow the header with no delimiter. Both phases read through the
//! same buffered reader, so payload bytes that arrive together with the
//! header line are never lost.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::message::ControlMessage;
use crate::error::ShareError;

/// Longest control line accepted, newline included
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Optional deadlines for blocking socket operations.
///
/// `None` waits forever. Deadlines never change the bytes on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadlines {
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl Deadlines {
    /// No deadlines at all
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from second counts where 0 means "no deadline"
    pub fn from_secs(read_secs: u64, write_secs: u64) -> Self {
        let to_duration = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
        Self {
            connect: to_duration(read_secs),
            read: to_duration(read_secs),
            write: to_duration(write_secs),
        }
    }
}

/// Await an I/O future, failing with a network timeout after `deadline`
pub async fn with_deadline<F, T>(deadline: Option<Duration>, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    let outcome = match deadline {
        Some(limit) => timeout(limit, fut).await.map_err(|elapsed| {
            warn!("{} timed out after {:?}", operation, limit);
            ShareError::from(elapsed).with_context(format!("{} after {:?}", operation, limit))
        })?,
        None => fut.await,
    };
    outcome.map_err(|e| {
        ShareError::network_error_full(format!("{} failed", operation), "unknown", e.to_string()).into()
    })
}

/// Serialize a value as one control frame: JSON followed by `\n`
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Bytes> {
    let json = serde_json::to_vec(value)
        .map_err(|e| ShareError::protocol_error_with_source("Failed to encode control frame", e.to_string()))?;
    let mut frame = BytesMut::with_capacity(json.len() + 1);
    frame.put_slice(&json);
    frame.put_u8(b'\n');
    Ok(frame.freeze())
}

/// Encode a request as a control frame
pub fn encode_control(message: &ControlMessage) -> Result<Bytes> {
    let json = message.to_json()?;
    let mut frame = BytesMut::with_capacity(json.len() + 1);
    frame.put_slice(&json);
    frame.put_u8(b'\n');
    Ok(frame.freeze())
}

/// Outcome of the payload phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadTransfer {
    /// Bytes the header announced
    pub expected: u64,
    /// Bytes actually copied before the stream ended
    pub received: u64,
}

impl PayloadTransfer {
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }
}

/// A connection speaking the line-framed control protocol
pub struct ControlStream<S> {
    inner: BufReader<S>,
    peer: String,
    deadlines: Deadlines,
}

impl ControlStream<TcpStream> {
    /// Dial `addr` (a `host:port` string) within the connect deadline
    pub async fn connect(addr: &str, deadlines: Deadlines) -> Result<Self> {
        let stream = match deadlines.connect {
            Some(limit) => timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| {
                    warn!("Connection timeout to {}", addr);
                    ShareError::network_error_with_address("Connection timeout", addr)
                })?,
            None => TcpStream::connect(addr).await,
        }
        .map_err(|e| ShareError::network_error_full("Failed to connect", addr, e.to_string()))?;

        debug!("Connected to {}", addr);
        Ok(Self::new(stream, addr, deadlines))
    }
}

impl<S> ControlStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: impl Into<String>, deadlines: Deadlines) -> Self {
        Self {
            inner: BufReader::new(stream),
            peer: peer.into(),
            deadlines,
        }
    }

    /// Remote end, for log messages
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Read one control line without its terminating newline
    pub async fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let limit = (MAX_LINE_LENGTH + 1) as u64;
        let read = with_deadline(
            self.deadlines.read,
            "Reading control line",
            (&mut self.inner).take(limit).read_until(b'\n', &mut buf),
        )
        .await?;

        if read == 0 {
            return Err(ShareError::protocol_error_with_source(
                "Connection closed before a control line arrived",
                self.peer.clone(),
            )
            .into());
        }
        if buf.last() != Some(&b'\n') {
            let reason = if buf.len() > MAX_LINE_LENGTH {
                "Control line exceeds maximum length"
            } else {
                "Control line is not newline-terminated"
            };
            return Err(ShareError::protocol_error_with_source(reason, self.peer.clone()).into());
        }
        buf.pop();

        let line = String::from_utf8(buf).map_err(|e| {
            ShareError::protocol_error_with_source("Control line is not valid UTF-8", e.to_string())
        })?;
        trace!("Read control line from {}: {}", self.peer, line);
        Ok(line)
    }

    /// Read one control line and decode it as a typed request
    pub async fn read_control(&mut self) -> Result<ControlMessage> {
        let line = self.read_line().await?;
        ControlMessage::decode(&line)
    }

    /// Read one control line and decode it as an untagged reply
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<T> {
        let line = self.read_line().await?;
        let value = serde_json::from_str(&line).map_err(ShareError::from)?;
        Ok(value)
    }

    /// Write a typed request as one control line
    pub async fn write_control(&mut self, message: &ControlMessage) -> Result<()> {
        let frame = encode_control(message)?;
        debug!("Sending {} to {}", message.kind(), self.peer);
        self.write_raw(&frame).await
    }

    /// Write an untagged reply as one control line
    pub async fn write_frame<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let frame = encode_frame(value)?;
        self.write_raw(&frame).await
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.inner.get_mut();
        with_deadline(self.deadlines.write, "Writing to connection", async {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await
    }

    /// Stream `source` to the connection until end of file.
    ///
    /// Each write carries exactly the bytes read, never a padded chunk.
    pub async fn write_payload<R>(&mut self, source: &mut R, chunk_size: usize) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut sent = 0u64;
        loop {
            let n = source.read(&mut buf).await.map_err(|e| {
                ShareError::storage_error_full("Failed to read file for transfer", self.peer.clone(), e.to_string())
            })?;
            if n == 0 {
                break;
            }
            self.write_raw(&buf[..n]).await?;
            sent += n as u64;
        }
        trace!("Sent {} payload bytes to {}", sent, self.peer);
        Ok(sent)
    }

    /// Copy exactly `size` payload bytes into `sink`.
    ///
    /// Reads are at most `chunk_size` bytes and the last one asks for only
    /// what remains, so nothing past the payload is consumed. A stream that
    /// ends early is reported through [`PayloadTransfer::is_complete`].
    pub async fn read_payload<W>(&mut self, size: u64, sink: &mut W, chunk_size: usize) -> Result<PayloadTransfer>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut received = 0u64;

        while received < size {
            let want = (size - received).min(buf.len() as u64) as usize;
            let n = with_deadline(self.deadlines.read, "Reading payload", self.inner.read(&mut buf[..want])).await?;
            if n == 0 {
                warn!("{} closed the connection after {} of {} bytes", self.peer, received, size);
                break;
            }
            sink.write_all(&buf[..n]).await.map_err(|e| {
                ShareError::storage_error_full("Failed to write downloaded bytes", self.peer.clone(), e.to_string())
            })?;
            received += n as u64;
        }
        sink.flush().await?;

        Ok(PayloadTransfer {
            expected: size,
            received,
        })
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{FileProperties, PeerAddress};
    use tokio::io::duplex;

    #[test]
    fn test_encode_frame_is_newline_terminated() {
        let frame = encode_frame(&PeerAddress::new("localhost", "8080")).unwrap();
        assert_eq!(&frame[..], &b"{\"NodeIP\":\"localhost\",\"NodePort\":\"8080\"}\n"[..]);
        assert_eq!(frame.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn test_deadlines_from_secs() {
        let deadlines = Deadlines::from_secs(0, 5);
        assert_eq!(deadlines.read, None);
        assert_eq!(deadlines.write, Some(Duration::from_secs(5)));
        assert_eq!(Deadlines::none(), Deadlines::default());
    }

    #[tokio::test]
    async fn test_control_then_payload_on_one_stream() {
        let (client, mut server) = duplex(4096);
        let payload = b"raw bytes that follow the header".to_vec();

        // header and payload land in the reader's buffer together
        let header = FileProperties {
            size: payload.len() as u64,
            checksum: "c".to_string(),
        };
        let mut wire = encode_frame(&header).unwrap().to_vec();
        wire.extend_from_slice(&payload);
        wire.extend_from_slice(b"trailing garbage");
        server.write_all(&wire).await.unwrap();

        let mut stream = ControlStream::new(client, "test", Deadlines::none());
        let got: FileProperties = stream.read_frame().await.unwrap();
        assert_eq!(got, header);

        let mut sink = Vec::new();
        let transfer = stream.read_payload(got.size, &mut sink, 7).await.unwrap();
        assert!(transfer.is_complete());
        assert_eq!(sink, payload);
    }

    #[tokio::test]
    async fn test_read_payload_reports_short_stream() {
        let (client, mut server) = duplex(1024);
        server.write_all(b"12345").await.unwrap();
        drop(server);

        let mut stream = ControlStream::new(client, "test", Deadlines::none());
        let mut sink = Vec::new();
        let transfer = stream.read_payload(10, &mut sink, 4).await.unwrap();
        assert!(!transfer.is_complete());
        assert_eq!(transfer.received, 5);
        assert_eq!(sink, b"12345");
    }

    #[tokio::test]
    async fn test_read_control_message() {
        let (client, mut server) = duplex(1024);
        server
            .write_all(b"{\"Type\":\"FileLocation\",\"FileName\":\"a.txt\"}\n")
            .await
            .unwrap();

        let mut stream = ControlStream::new(client, "test", Deadlines::none());
        let msg = stream.read_control().await.unwrap();
        assert_eq!(msg, ControlMessage::FileLocation { file_name: "a.txt".to_string() });
    }

    #[tokio::test]
    async fn test_unterminated_line_is_protocol_error() {
        let (client, mut server) = duplex(1024);
        server.write_all(b"{\"Type\":\"Deactivate\"}").await.unwrap();
        drop(server);

        let mut stream = ControlStream::new(client, "test", Deadlines::none());
        let err = stream.read_line().await.unwrap_err();
        let share_err = err.downcast_ref::<ShareError>().unwrap();
        assert!(matches!(share_err, ShareError::ProtocolError { .. }));
    }

    #[tokio::test]
    async fn test_overlong_line_is_rejected() {
        let (client, mut server) = duplex(MAX_LINE_LENGTH * 2 + 16);
        let long = vec![b'a'; MAX_LINE_LENGTH + 10];
        server.write_all(&long).await.unwrap();
        server.write_all(b"\n").await.unwrap();

        let mut stream = ControlStream::new(client, "test", Deadlines::none());
        let err = stream.read_line().await.unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }

    #[tokio::test]
    async fn test_read_deadline_expires() {
        let (client, _server) = duplex(64);
        let deadlines = Deadlines {
            read: Some(Duration::from_millis(50)),
            ..Deadlines::none()
        };

        let mut stream = ControlStream::new(client, "silent", deadlines);
        let err = stream.read_line().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("Reading control line"));
        let share_err = err.downcast_ref::<ShareError>().unwrap();
        assert!(matches!(share_err, ShareError::NetworkError { .. }));
    }

    #[tokio::test]
    async fn test_write_payload_sends_exact_bytes() {
        let (client, server) = duplex(4096);
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut sender = ControlStream::new(client, "test", Deadlines::none());
        let sent = sender.write_payload(&mut &data[..], 64).await.unwrap();
        assert_eq!(sent, 1000);
        drop(sender);

        let mut received = Vec::new();
        let mut server = server;
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, data);
    }
}
