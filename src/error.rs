//! Error types for the ftx client and server.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Every fault the protocol engine can report.
///
/// Transport faults are fatal to a session; protocol and local policy faults are
/// surfaced as results and the session still runs its acknowledge/drain sequence.
#[derive(Debug, Error)]
pub enum FtError {
    /// Tag longer than 8 bytes or payload that does not fit a u16 frame length.
    #[error("cannot encode frame: {0}")]
    Encoding(String),

    /// Peer closed the connection before a full frame arrived.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Any other I/O fault while sending or receiving.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("connect {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("bind data port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("listen on data port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("accept on data port {port}: {source}")]
    Accept {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// A specific tag was required and something else arrived.
    #[error("unexpected tag {found:?} (expected {expected})")]
    UnexpectedTag { expected: &'static str, found: String },

    /// The data stream broke its own grammar, e.g. a stray tag inside a listing.
    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("file \"{}\" already exists", .0.display())]
    DestinationExists(PathBuf),

    #[error("refusing server-declared destination {0:?}")]
    UnsafeDestination(String),

    /// Local filesystem failure while writing a received file.
    #[error("{}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FtError {
    /// Transport-layer faults terminate the session; everything else is recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FtError::ConnectionClosed
                | FtError::Transport(_)
                | FtError::Connect { .. }
                | FtError::Bind { .. }
                | FtError::Listen { .. }
                | FtError::Accept { .. }
        )
    }
}

impl From<io::Error> for FtError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FtError::ConnectionClosed
        } else {
            FtError::Transport(e)
        }
    }
}

/// Session phase a fault was detected in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Handshake,
    DataSetup,
    DataTransfer,
    Acknowledge,
    Drain,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Connect => "connect",
            Phase::Handshake => "handshake",
            Phase::DataSetup => "data setup",
            Phase::DataTransfer => "data transfer",
            Phase::Acknowledge => "acknowledge",
            Phase::Drain => "drain",
        };
        f.write_str(s)
    }
}

/// A fault that ended the session, together with the phase that produced it.
///
/// Usually `source.is_fatal()` holds. The exception is a frame that failed to
/// decode on the control connection (handshake or drain): the stream cannot be
/// reframed after it, so a `MalformedStream` there ends the session too.
#[derive(Debug, Error)]
#[error("{phase} failed: {source}")]
pub struct SessionError {
    pub phase: Phase,
    #[source]
    pub source: FtError,
}

impl SessionError {
    pub fn new(phase: Phase, source: FtError) -> Self {
        Self { phase, source }
    }
}

/// Result type alias using FtError.
pub type Result<T> = std::result::Result<T, FtError>;
