//! Line-oriented command/query session over a [`Transport`].
//!
//! Commands are written with a doubled CR LF termination. Replies are read line by
//! line; blank lines are skipped and the termination bytes stripped. Queries are
//! strictly request-then-response, and the session does not retry.

use super::transport::Transport;
use crate::error::{AppResult, DaqError};
use std::time::Duration;
use tokio::time::Instant;

/// Line termination used by the command protocol.
pub const TERMINATION: &str = "\r\n";

/// Default timeout for command round trips.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Replies that mean the base station rejected a request.
pub const ERROR_REPLIES: [&str; 2] = ["INVALID COMMAND", "CANNOT COMPLETE"];

/// Whether `reply` is a protocol-level rejection.
pub fn is_error_reply(reply: &str) -> bool {
    ERROR_REPLIES.iter().any(|e| reply.contains(e))
}

/// Request/response command layer over a deadline transport.
#[derive(Debug, Default)]
pub struct ProtocolSession {
    transport: Transport,
    version: String,
}

impl ProtocolSession {
    /// Disconnected session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect and read the protocol version banner.
    pub async fn connect(&mut self, address: &str, port: u16, timeout: Duration) -> AppResult<()> {
        self.transport.connect(address, port, timeout).await?;
        self.version = self.read_line(timeout).await?;
        tracing::info!(version = %self.version, "Protocol session established");
        Ok(())
    }

    /// Close the session. Calling it twice is harmless.
    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await;
    }

    /// Whether the underlying transport is open.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Version banner read at connect time.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Send `text` and return the reply line.
    ///
    /// Fails with [`DaqError::Protocol`] when the base station rejects the request.
    pub async fn query(&mut self, text: &str, timeout: Duration) -> AppResult<String> {
        self.transport.flush_input()?;
        self.send(text, timeout).await?;
        let reply = self.read_line(timeout).await?;
        tracing::debug!(query = %text, reply = %reply, "Query");
        if is_error_reply(&reply) {
            return Err(DaqError::Protocol {
                command: text.to_string(),
                response: reply,
            });
        }
        Ok(reply)
    }

    /// Write `text` with termination without waiting for a reply.
    pub async fn send(&mut self, text: &str, timeout: Duration) -> AppResult<()> {
        let message = format!("{}{}{}", text, TERMINATION, TERMINATION);
        self.transport.write(message.as_bytes(), timeout).await
    }

    /// Send `text` and compare the reply with `expected`.
    ///
    /// An empty `expected` writes the command and returns without reading.
    pub async fn command(
        &mut self,
        text: &str,
        expected: &str,
        timeout: Duration,
    ) -> AppResult<bool> {
        if expected.is_empty() {
            self.transport.flush_input()?;
            self.send(text, timeout).await?;
            tracing::debug!(command = %text, "Command sent");
            return Ok(true);
        }
        let reply = self.query(text, timeout).await?;
        Ok(reply == expected)
    }

    /// Read up to `max_attempts` lines until one contains `target`.
    pub async fn wait_for(
        &mut self,
        target: &str,
        timeout: Duration,
        max_attempts: usize,
    ) -> AppResult<bool> {
        for attempt in 0..max_attempts {
            let line = self.read_line(timeout).await?;
            tracing::debug!(attempt, line = %line, target, "Waiting for event");
            if line.contains(target) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Read the next non-blank line without its termination.
    ///
    /// `timeout` bounds the whole call, skipped blank lines included.
    pub async fn read_line(&mut self, timeout: Duration) -> AppResult<String> {
        let deadline = Instant::now() + timeout;
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.transport.read_until(b'\n', &mut buffer, remaining).await?;
            let line = String::from_utf8_lossy(&buffer);
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.trim().is_empty() {
                return Ok(line.to_string());
            }
        }
    }

    /// Underlying transport.
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }
}
