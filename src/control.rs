//! Control channel: command handshake, acknowledgement and status drain.

use crate::error::{FtError, Result};
use crate::protocol::tag;
use crate::protocol_core::{read_frame, write_frame, Frame};
use crate::session::Command;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

/// Server's answer to the command phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Any reply other than ERROR. Carries the reply tag for logging.
    Accepted(String),
    Rejected(String),
}

/// Owns the long-lived control connection.
pub struct ControlChannel<S = TcpStream> {
    stream: S,
}

impl ControlChannel<TcpStream> {
    /// Open the control connection. Suspends until the TCP connect completes.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let connect_err = |source| FtError::Connect {
            addr: addr.clone(),
            source,
        };
        let addrs = (host, port).to_socket_addrs().map_err(connect_err)?;
        let mut last = None;
        for a in addrs {
            match TcpStream::connect(a) {
                Ok(stream) => {
                    crate::net::tune_socket(&stream);
                    return Ok(Self { stream });
                }
                Err(e) => last = Some(e),
            }
        }
        Err(connect_err(last.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
        })))
    }

    pub fn peer_addr(&self) -> String {
        self.stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

impl<S: Read + Write> ControlChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// DPORT <port>, then LIST or GET <filename>.
    pub fn send_command(&mut self, command: &Command, data_port: u16) -> Result<()> {
        write_frame(&mut self.stream, tag::DPORT, data_port.to_string().as_bytes())?;
        match command {
            Command::List => write_frame(&mut self.stream, tag::LIST, b""),
            Command::Get(name) => write_frame(&mut self.stream, tag::GET, name.as_bytes()),
        }
    }

    /// Suspends until one reply frame arrives.
    pub fn await_handshake_reply(&mut self) -> Result<HandshakeOutcome> {
        let reply = read_frame(&mut self.stream)?;
        if reply.is(tag::ERROR) {
            Ok(HandshakeOutcome::Rejected(reply.text()))
        } else {
            Ok(HandshakeOutcome::Accepted(reply.tag))
        }
    }

    pub fn send_ack(&mut self) -> Result<()> {
        write_frame(&mut self.stream, tag::ACK, b"")
    }

    /// Stream of trailing ERROR messages, ending at CLOSE.
    ///
    /// No timeout: each step suspends until the next frame arrives or the
    /// connection fails. Frames other than ERROR and CLOSE are skipped.
    pub fn drain_until_close(&mut self) -> Drain<'_, S> {
        Drain {
            stream: &mut self.stream,
            finished: false,
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

pub struct Drain<'a, S> {
    stream: &'a mut S,
    finished: bool,
}

impl<S: Read> Iterator for Drain<'_, S> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let frame: Frame = match read_frame(self.stream) {
                Ok(f) => f,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            if frame.is(tag::CLOSE) {
                self.finished = true;
            } else if frame.is(tag::ERROR) {
                return Some(Ok(frame.text()));
            }
        }
        None
    }
}
