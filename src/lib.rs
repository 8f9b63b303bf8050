//! ftx: client for a two-connection file transfer protocol
//!
//! A long-lived control connection carries commands and status; for each
//! request the client listens on an announced port and the server connects
//! back to stream a listing or a file.

pub mod cli;
pub mod control;
pub mod data;
pub mod error;
pub mod log;
pub mod logger;
pub mod net;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod server;
pub mod session;

#[cfg(test)]
mod test_util;

pub use error::{FtError, Phase, SessionError};
pub use session::{run_session, Command, SessionConfig, SessionReport, TransferOutcome};
