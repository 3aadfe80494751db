//! Error types for the listener, the connection handler and message receive.
//!
//! Only `BindError` is fatal. `ConnectionError` ends a single connection and
//! `ReceiveError` never leaves the framing layer.

use std::io;
use std::str::Utf8Error;

/// Failure to set up the listening socket. The server must not start.
#[derive(Debug)]
pub enum BindError {
    /// The host/port pair could not be resolved.
    Resolve { addr: String, source: io::Error },
    /// Resolution succeeded but produced no usable address.
    NoAddress(String),
    /// Socket creation, option setting, bind or listen failed.
    Socket { addr: String, source: io::Error },
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindError::Resolve { addr, source } => {
                write!(f, "Failed to resolve '{addr}': {source}")
            }
            BindError::NoAddress(addr) => write!(f, "No address found for '{addr}'"),
            BindError::Socket { addr, source } => {
                write!(f, "Failed to bind '{addr}': {source}")
            }
        }
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BindError::Resolve { source, .. } | BindError::Socket { source, .. } => Some(source),
            BindError::NoAddress(_) => None,
        }
    }
}

/// Why a single message receive stopped early.
#[derive(Debug)]
pub enum ReceiveError {
    TimedOut,
    WouldBlock,
    Io(io::Error),
}

impl ReceiveError {
    /// Timeouts and would-block end a message the same way a short read does.
    pub fn is_clean(&self) -> bool {
        matches!(self, ReceiveError::TimedOut | ReceiveError::WouldBlock)
    }
}

impl From<io::Error> for ReceiveError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut => ReceiveError::TimedOut,
            io::ErrorKind::WouldBlock => ReceiveError::WouldBlock,
            _ => ReceiveError::Io(e),
        }
    }
}

impl std::fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiveError::TimedOut => write!(f, "read timed out"),
            ReceiveError::WouldBlock => write!(f, "read would block"),
            ReceiveError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ReceiveError {}

/// Failure while serving one client. Logged by the listener, which then
/// closes that connection and keeps accepting.
#[derive(Debug)]
pub enum ConnectionError {
    /// The received message was not valid UTF-8.
    Decode(Utf8Error),
    /// Sending the acknowledgment failed.
    Write(io::Error),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Decode(e) => write!(f, "Failed to decode message: {e}"),
            ConnectionError::Write(e) => write!(f, "Failed to send response: {e}"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Decode(e) => Some(e),
            ConnectionError::Write(e) => Some(e),
        }
    }
}
