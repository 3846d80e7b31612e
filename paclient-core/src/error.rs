//! Client error taxonomy.
//!
//! Mirrors the failure taxonomy from the design: transient transport errors,
//! setup failures, protocol violations, user input errors, and fatal errors
//! each get their own variant so callers can match on the class they care
//! about rather than string-matching a message.

use std::io;
use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Main error type for the audio-server client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error on the server socket, a pipe, or a mapped region.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Server sent or was sent a record that violates the wire protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Caller supplied parameters outside their valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A stream id referenced by a command is not present in the client's list.
    #[error("no such stream: {0}")]
    NoSuchStream(u64),

    /// A command that requires a live connection was issued while disconnected.
    #[error("not connected")]
    NotConnected,

    /// Mapping or unmapping a shared-memory region failed.
    #[error("shared memory error: {0}")]
    SharedMemory(String),

    /// Spawning the control worker or an audio worker failed.
    #[error("worker spawn failed: {0}")]
    WorkerSpawn(String),

    /// The command or reply channel was dropped (worker exited already).
    #[error("worker channel closed")]
    ChannelClosed,

    /// A synchronous call exceeded its configured deadline.
    #[error("operation timed out")]
    TimedOut,
}

impl ClientError {
    /// True for errors that the connection state machine recovers from on
    /// its own (transient transport failures that just re-arm WAIT_FOR_SOCKET).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::WouldBlock
            ),
            Self::NotConnected => true,
            _ => false,
        }
    }

    /// True for errors that must be propagated to the caller and make the
    /// client handle itself unusable (command pipe broken, worker dead at
    /// startup). Destruction remains safe regardless.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::WorkerSpawn(_))
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn shared_memory(msg: impl Into<String>) -> Self {
        Self::SharedMemory(msg.into())
    }
}
