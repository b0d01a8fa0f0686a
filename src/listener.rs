//! Connection listener
//!
//! Accept loop shared by the tracker and the peer file service: every
//! accepted connection runs on its own task, and a semaphore caps how many
//! are in flight at once.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::ShareError;
use crate::protocol::Deadlines;

/// Default cap on concurrently handled connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Per-listener tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Connections handled at once; the accept loop waits for a free slot
    pub max_connections: usize,
    /// Deadlines applied to every read and write on accepted connections
    pub deadlines: Deadlines,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            deadlines: Deadlines::none(),
        }
    }
}

/// A bound TCP listener with an admission limit
pub struct ConnectionListener {
    listener: TcpListener,
    slots: Arc<Semaphore>,
    name: &'static str,
}

impl ConnectionListener {
    /// Bind `addr`; `name` only labels log lines
    pub async fn bind(addr: &str, name: &'static str, max_connections: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("{}: failed to bind {}: {}", name, addr, e);
            ShareError::network_error_full("Failed to bind listener", addr, e.to_string())
        })?;
        info!("{} listening on {}", name, listener.local_addr()?);

        Ok(Self {
            listener,
            slots: Arc::new(Semaphore::new(max_connections.clamp(1, Semaphore::MAX_PERMITS))),
            name,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept forever, running `handler` on a fresh task per connection.
    ///
    /// Returns only when accepting fails.
    pub async fn serve<H, Fut>(self, handler: H) -> Result<()>
    where
        H: Fn(TcpStream, SocketAddr) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = self.name;
        info!("{}: started receiving requests", name);

        loop {
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ShareError::network_error_full("Admission limit closed", name, e.to_string()))?;

            let (stream, peer) = self.listener.accept().await.map_err(|e| {
                error!("{}: accept failed: {}", name, e);
                ShareError::network_error_full("Failed to accept connection", name, e.to_string())
            })?;
            debug!("{}: accepted connection from {}", name, peer);

            let task = handler(stream, peer);
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = task.await {
                    log_connection_error(name, peer, &e);
                }
            });
        }
    }
}

fn log_connection_error(name: &str, peer: SocketAddr, err: &anyhow::Error) {
    match err.downcast_ref::<ShareError>() {
        Some(ShareError::ProtocolError { .. }) => warn!("{}: dropped connection from {}: {}", name, peer, err),
        _ => error!("{}: connection from {} failed: {}", name, peer, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port() {
        let listener = ConnectionListener::bind("127.0.0.1:0", "test", 4).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_fails() {
        let first = ConnectionListener::bind("127.0.0.1:0", "test", 4).await.unwrap();
        let addr = first.local_addr().unwrap().to_string();
        assert!(ConnectionListener::bind(&addr, "test", 4).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_clamps_oversized_limit() {
        let listener = ConnectionListener::bind("127.0.0.1:0", "test", usize::MAX).await.unwrap();
        assert_eq!(listener.slots.available_permits(), Semaphore::MAX_PERMITS);

        let listener = ConnectionListener::bind("127.0.0.1:0", "test", 0).await.unwrap();
        assert_eq!(listener.slots.available_permits(), 1);
    }

    async fn wait_for_count(counter: &AtomicUsize, count: usize) {
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("counter never reached {}", count);
    }

    #[tokio::test]
    async fn test_admission_limit_holds_back_second_connection() {
        let listener = ConnectionListener::bind("127.0.0.1:0", "test", 1).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let (counter, gate) = (started.clone(), release.clone());
        let server = tokio::spawn(listener.serve(move |_stream, _| {
            let counter = counter.clone();
            let gate = gate.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok::<(), anyhow::Error>(())
            }
        }));

        let _first = TcpStream::connect(addr).await.unwrap();
        wait_for_count(&started, 1).await;

        // queued in the backlog while the only slot is taken
        let _second = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        release.notify_one();
        wait_for_count(&started, 2).await;

        release.notify_one();
        server.abort();
    }

    #[tokio::test]
    async fn test_each_connection_gets_a_task() {
        let listener = ConnectionListener::bind("127.0.0.1:0", "test", 8).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handled = Arc::new(AtomicUsize::new(0));

        let counter = handled.clone();
        let server = tokio::spawn(listener.serve(move |mut stream, _| {
            let counter = counter.clone();
            async move {
                stream.write_all(b"ok").await?;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        }));

        for _ in 0..5 {
            let mut conn = TcpStream::connect(addr).await.unwrap();
            let mut buf = [0u8; 2];
            conn.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ok");
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handled.load(Ordering::SeqCst), 5);
        server.abort();
    }
}
