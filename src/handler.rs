//! Connection handler: one acknowledgment per received message.

use crate::error::ConnectionError;
use crate::framing::receive_message;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Per-connection settings, fixed for the lifetime of the server.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Acknowledgment sent after every message.
    pub response: Bytes,
    pub chunk_size: usize,
    pub read_timeout: Option<Duration>,
}

/// Counters for one client session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub messages: u64,
    pub bytes: u64,
}

/// Serve one connection until the peer stops sending.
///
/// Undecodable messages and failed writes are returned to the caller, which
/// owns the stream and closes it.
pub async fn handle_connection<S>(
    stream: &mut S,
    settings: &HandlerSettings,
) -> Result<SessionStats, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stats = SessionStats::default();

    loop {
        let received = receive_message(stream, settings.chunk_size, settings.read_timeout).await;
        if received.message.is_empty() {
            debug!(termination = ?received.termination, "No data, ending session");
            break;
        }

        let text = std::str::from_utf8(&received.message).map_err(ConnectionError::Decode)?;
        info!(bytes = received.message.len(), data = %text, "Received data");

        stream
            .write_all(&settings.response)
            .await
            .map_err(ConnectionError::Write)?;

        stats.messages += 1;
        stats.bytes += received.message.len() as u64;
    }

    Ok(stats)
}
