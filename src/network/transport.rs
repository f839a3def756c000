//! Deadline-bounded TCP transport.
//!
//! Every operation races its I/O future against a timer. When the timer wins the
//! socket is dropped, which aborts the pending I/O, and [`DaqError::Timeout`] is
//! returned. The transport is then disconnected and must be reconnected before use.
//! A peer reset or end-of-stream also closes the socket before the error propagates.
//! Any operation on a closed transport fails immediately with [`DaqError::NotConnected`].
//!
//! `connect` reports a refused or unreachable peer as [`DaqError::Connection`]. A
//! handshake that does not complete in time is a [`DaqError::Timeout`] with operation
//! `"connect"`, like every other deadline, and also leaves the transport disconnected.

use crate::error::{AppResult, DaqError};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// TCP connection wrapper where every operation is bounded by a timeout.
#[derive(Debug, Default)]
pub struct Transport {
    stream: Option<BufReader<TcpStream>>,
    peer: Option<String>,
}

/// Race `io` against a `timeout` timer.
async fn race<F, T>(operation: &'static str, timeout: Duration, io: F) -> AppResult<io::Result<T>>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::select! {
        biased;
        result = io => Ok(result),
        _ = tokio::time::sleep(timeout) => Err(DaqError::Timeout { operation, timeout }),
    }
}

impl Transport {
    /// Disconnected transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection to `address:port`.
    ///
    /// A previous connection is closed first. On failure the transport stays
    /// disconnected.
    pub async fn connect(&mut self, address: &str, port: u16, timeout: Duration) -> AppResult<()> {
        if self.stream.is_some() {
            self.disconnect().await;
        }
        let peer = format!("{}:{}", address, port);
        let stream = match race("connect", timeout, TcpStream::connect((address, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(DaqError::Connection {
                    address: peer,
                    source,
                })
            }
            Err(err) => {
                tracing::warn!(peer = %peer, ?timeout, "Connect timed out");
                return Err(err);
            }
        };

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        tracing::info!(peer = %peer, "Connected");
        self.stream = Some(BufReader::new(stream));
        self.peer = Some(peer);
        Ok(())
    }

    /// Orderly shutdown then close. Calling it on a closed transport does nothing.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.get_mut().shutdown().await {
                tracing::debug!(error = %e, "Shutdown failed, closing anyway");
            }
            tracing::info!(peer = ?self.peer, "Disconnected");
        }
    }

    /// Whether a socket is open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Remote `host:port` of the last successful connection.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Local socket address.
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        let stream = self.stream.as_ref().ok_or(DaqError::NotConnected)?;
        Ok(stream.get_ref().local_addr()?)
    }

    /// Fill `buffer` completely.
    pub async fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> AppResult<()> {
        let stream = self.stream.as_mut().ok_or(DaqError::NotConnected)?;
        let outcome = race("read", timeout, stream.read_exact(buffer)).await;
        self.settle(outcome).map(|_| ())
    }

    /// Append bytes up to and including `delimiter` to `buffer`.
    ///
    /// Returns the number of bytes appended.
    pub async fn read_until(
        &mut self,
        delimiter: u8,
        buffer: &mut Vec<u8>,
        timeout: Duration,
    ) -> AppResult<usize> {
        let stream = self.stream.as_mut().ok_or(DaqError::NotConnected)?;
        let outcome = race("read_until", timeout, stream.read_until(delimiter, buffer)).await;
        match self.settle(outcome)? {
            0 => {
                self.stream = None;
                Err(DaqError::ConnectionClosed)
            }
            n => Ok(n),
        }
    }

    /// Send all of `buffer`.
    pub async fn write(&mut self, buffer: &[u8], timeout: Duration) -> AppResult<()> {
        let stream = self.stream.as_mut().ok_or(DaqError::NotConnected)?.get_mut();
        let io = async {
            stream.write_all(buffer).await?;
            stream.flush().await
        };
        let outcome = race("write", timeout, io).await;
        self.settle(outcome)
    }

    /// Discard input that is already buffered or waiting on the socket.
    ///
    /// Never blocks. Returns the number of discarded bytes.
    pub fn flush_input(&mut self) -> AppResult<usize> {
        let stream = self.stream.as_mut().ok_or(DaqError::NotConnected)?;
        let mut flushed = stream.buffer().len();
        stream.consume(flushed);

        let mut discard = [0u8; 256];
        loop {
            match stream.get_ref().try_read(&mut discard) {
                Ok(0) => break,
                Ok(n) => flushed += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(self.fail(e)),
            }
        }
        if flushed > 0 {
            tracing::debug!(bytes = flushed, "Flushed stale input");
        }
        Ok(flushed)
    }

    /// Close the socket after a timed-out or failed operation.
    fn settle<T>(&mut self, outcome: AppResult<io::Result<T>>) -> AppResult<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.fail(e)),
            Err(err) => {
                tracing::warn!(peer = ?self.peer, error = %err, "Deadline expired, socket closed");
                self.stream = None;
                Err(err)
            }
        }
    }

    fn fail(&mut self, error: io::Error) -> DaqError {
        self.stream = None;
        match error.kind() {
            io::ErrorKind::UnexpectedEof => DaqError::ConnectionClosed,
            _ => DaqError::Io(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_closed_transport_fails_immediately() {
        let mut transport = Transport::new();
        let mut buf = [0u8; 4];
        let err = transport
            .read(&mut buf, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DaqError::NotConnected));
        assert!(matches!(
            transport.write(b"x", Duration::from_secs(5)).await,
            Err(DaqError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_read_timeout_closes_socket() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(socket);
        });

        let mut transport = Transport::new();
        transport
            .connect("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        let mut buf = [0u8; 8];
        let started = std::time::Instant::now();
        let err = transport
            .read(&mut buf, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(!transport.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_until_includes_delimiter() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"HELLO\nrest").await.unwrap();
            socket
        });

        let mut transport = Transport::new();
        transport
            .connect("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        let mut line = Vec::new();
        let n = transport
            .read_until(b'\n', &mut line, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(n, 6);
        assert_eq!(line, b"HELLO\n");
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut transport = Transport::new();
        transport
            .connect("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        server.await.unwrap();
        let mut buf = [0u8; 4];
        let err = transport
            .read(&mut buf, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DaqError::ConnectionClosed | DaqError::Io(_)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused_stays_disconnected() {
        let (listener, port) = listener().await;
        drop(listener);
        let mut transport = Transport::new();
        let err = transport
            .connect("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, DaqError::Connection { .. }));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_deadline_when_backlog_is_full() {
        // Nothing accepts, so once the backlog is full further handshakes stall.
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let port = listener.local_addr().unwrap().port();

        let timeout = Duration::from_millis(100);
        let mut held = Vec::new();
        let mut timed_out = false;
        for _ in 0..16 {
            let mut transport = Transport::new();
            let started = std::time::Instant::now();
            match transport.connect("127.0.0.1", port, timeout).await {
                Ok(()) => held.push(transport),
                Err(err) => {
                    assert!(err.is_timeout(), "unexpected error: {err}");
                    assert!(started.elapsed() < timeout + Duration::from_millis(200));
                    assert!(!transport.is_connected());
                    timed_out = true;
                    break;
                }
            }
        }
        assert!(timed_out);
        drop(listener);
    }

    #[tokio::test]
    async fn test_write_timeout_closes_socket() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // Never read, so the socket buffers fill up.
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(socket);
        });

        let mut transport = Transport::new();
        transport
            .connect("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        let payload = vec![0u8; 64 * 1024 * 1024];
        let started = std::time::Instant::now();
        let err = transport
            .write(&payload, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(!transport.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (listener, port) = listener().await;
        let _server = tokio::spawn(async move { listener.accept().await });
        let mut transport = Transport::new();
        transport
            .connect("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        transport.disconnect().await;
        transport.disconnect().await;
        assert!(!transport.is_connected());
    }
}
