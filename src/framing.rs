//! Message framing for a stream with no length prefix or delimiter.
//!
//! A message is assembled from fixed-size chunk reads. A read that returns
//! fewer bytes than the chunk size ends the message, as does end of stream
//! or a failed read.
//!
//! ## Known limitation
//!
//! A short read is taken to mean "message complete". A message whose length
//! is an exact multiple of the chunk size therefore does not complete after
//! its last full chunk: the receive keeps waiting until the peer sends more
//! (which is appended to the same message) or closes the stream. Clients must
//! avoid exact multiples or accept the extra round trip. Switching to an
//! explicit length prefix would change the wire contract.
//!
//! ```text
//! Reading --(short read | EOF | read error | timeout)--> Done
//! Reading --(full chunk)--> Reading
//! ```

use crate::error::ReceiveError;
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

/// Default bytes requested per read.
pub const CHUNK_SIZE: usize = 1024;

/// Largest accepted chunk size (16 MiB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Current state of a message receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Waiting for the next chunk.
    Reading,
    /// Message complete; no further chunks are accepted.
    Done,
}

/// Why a message receive finished.
#[derive(Debug)]
pub enum Termination {
    /// A chunk shorter than the chunk size arrived.
    ShortRead,
    /// The peer closed (or half-closed) the stream.
    Eof,
    /// A read failed or timed out; the buffer holds what arrived before.
    Aborted(ReceiveError),
}

/// Accumulates chunks and applies the short-read rule.
///
/// Holds no socket, so the boundary behavior can be driven directly.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    chunk_size: usize,
    state: FrameState,
}

impl MessageAssembler {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
            state: FrameState::Reading,
        }
    }

    /// Feed the bytes returned by one read.
    ///
    /// Returns `Some` once the message is complete. An empty chunk is end
    /// of stream.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Option<Termination> {
        debug_assert_eq!(self.state(), FrameState::Reading, "chunk pushed after Done");

        if chunk.is_empty() {
            self.state = FrameState::Done;
            return Some(Termination::Eof);
        }

        self.buffer.extend_from_slice(chunk);

        if chunk.len() < self.chunk_size {
            self.state = FrameState::Done;
            Some(Termination::ShortRead)
        } else {
            None
        }
    }

    /// Stop on a failed read, keeping what has accumulated.
    pub fn abort(&mut self, err: ReceiveError) -> Termination {
        self.state = FrameState::Done;
        Termination::Aborted(err)
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_message(self) -> Bytes {
        self.buffer.freeze()
    }
}

/// Result of one message receive.
#[derive(Debug)]
pub struct Received {
    /// The assembled message. Empty means the peer is gone.
    pub message: Bytes,
    pub termination: Termination,
}

/// Read one message from `reader` using chunks of `chunk_size` bytes.
///
/// Never fails: read errors and timeouts end the message early and are
/// reported through [`Termination::Aborted`].
pub async fn receive_message<R>(
    reader: &mut R,
    chunk_size: usize,
    read_timeout: Option<Duration>,
) -> Received
where
    R: AsyncRead + Unpin,
{
    let mut assembler = MessageAssembler::new(chunk_size);
    let mut chunk = vec![0u8; chunk_size];

    let termination = loop {
        let result = match read_timeout {
            Some(limit) => match tokio::time::timeout(limit, reader.read(&mut chunk)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::from(io::ErrorKind::TimedOut)),
            },
            None => reader.read(&mut chunk).await,
        };

        match result {
            Ok(n) => {
                trace!(n, buffered = assembler.len() + n, "Read chunk");
                if let Some(termination) = assembler.push_chunk(&chunk[..n]) {
                    break termination;
                }
            }
            Err(e) => {
                let err = ReceiveError::from(e);
                if !err.is_clean() {
                    warn!(
                        error = %err,
                        partial = !assembler.is_empty(),
                        "Data reception error"
                    );
                }
                break assembler.abort(err);
            }
        }
    };

    Received {
        message: assembler.into_message(),
        termination,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_short_chunk_completes_message() {
        let mut assembler = MessageAssembler::new(CHUNK_SIZE);
        assert_eq!(assembler.state(), FrameState::Reading);

        let done = assembler.push_chunk(b"hello");
        assert!(matches!(done, Some(Termination::ShortRead)));
        assert_eq!(assembler.state(), FrameState::Done);
        assert_eq!(assembler.into_message(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_full_chunks_keep_reading() {
        let mut assembler = MessageAssembler::new(CHUNK_SIZE);

        assert!(assembler.push_chunk(&[b'a'; CHUNK_SIZE]).is_none());
        assert!(assembler.push_chunk(&[b'b'; CHUNK_SIZE]).is_none());
        assert_eq!(assembler.state(), FrameState::Reading);

        let done = assembler.push_chunk(&[b'c'; 452]);
        assert!(matches!(done, Some(Termination::ShortRead)));
        assert_eq!(assembler.len(), 2500);
    }

    #[test]
    fn test_exact_multiple_waits_for_more() {
        let mut assembler = MessageAssembler::new(CHUNK_SIZE);

        assert!(assembler.push_chunk(&[0u8; CHUNK_SIZE]).is_none());
        assert_eq!(assembler.state(), FrameState::Reading);

        // Only end of stream finishes it
        assert!(matches!(assembler.push_chunk(&[]), Some(Termination::Eof)));
        assert_eq!(assembler.into_message().len(), CHUNK_SIZE);
    }

    #[test]
    fn test_empty_first_chunk_is_eof() {
        let mut assembler = MessageAssembler::new(CHUNK_SIZE);
        assert!(assembler.is_empty());
        assert!(matches!(assembler.push_chunk(&[]), Some(Termination::Eof)));
        assert!(assembler.into_message().is_empty());
    }

    #[tokio::test]
    async fn test_receive_short_message() {
        let mut stream = tokio_test::io::Builder::new().read(b"ping").build();

        let received = receive_message(&mut stream, CHUNK_SIZE, None).await;
        assert_eq!(&received.message[..], b"ping");
        assert!(matches!(received.termination, Termination::ShortRead));
    }

    #[tokio::test]
    async fn test_receive_multi_chunk_message() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[1u8; CHUNK_SIZE])
            .read(&[2u8; CHUNK_SIZE])
            .read(&[3u8; 452])
            .build();

        let received = receive_message(&mut stream, CHUNK_SIZE, None).await;
        assert_eq!(received.message.len(), 2500);
        assert_eq!(received.message[0], 1);
        assert_eq!(received.message[CHUNK_SIZE], 2);
        assert_eq!(received.message[2499], 3);
    }

    #[tokio::test]
    async fn test_receive_eof_returns_empty() {
        let mut stream = tokio_test::io::Builder::new().build();

        let received = receive_message(&mut stream, CHUNK_SIZE, None).await;
        assert!(received.message.is_empty());
        assert!(matches!(received.termination, Termination::Eof));
    }

    #[tokio::test]
    async fn test_receive_error_keeps_partial_message() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[7u8; CHUNK_SIZE])
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();

        let received = receive_message(&mut stream, CHUNK_SIZE, None).await;
        assert_eq!(received.message.len(), CHUNK_SIZE);
        assert!(matches!(
            received.termination,
            Termination::Aborted(ReceiveError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_exact_multiple_blocks_until_more_data() {
        let (mut client, mut server) = tokio::io::duplex(4 * CHUNK_SIZE);
        client.write_all(&[9u8; CHUNK_SIZE]).await.unwrap();

        let receive = receive_message(&mut server, CHUNK_SIZE, None);
        tokio::pin!(receive);

        let pending = tokio::time::timeout(Duration::from_millis(100), &mut receive).await;
        assert!(pending.is_err(), "receive completed on an exact multiple");

        client.write_all(b"tail").await.unwrap();
        let received = receive.await;
        assert_eq!(received.message.len(), CHUNK_SIZE + 4);
        assert!(received.message.ends_with(b"tail"));
    }

    #[tokio::test]
    async fn test_timeout_ends_message_cleanly() {
        let (mut client, mut server) = tokio::io::duplex(4 * CHUNK_SIZE);
        client.write_all(&[5u8; CHUNK_SIZE]).await.unwrap();

        let received =
            receive_message(&mut server, CHUNK_SIZE, Some(Duration::from_millis(50))).await;
        assert_eq!(received.message.len(), CHUNK_SIZE);
        match received.termination {
            Termination::Aborted(err) => assert!(err.is_clean()),
            other => panic!("unexpected: {:?}", other),
        }
        drop(client);
    }
}
