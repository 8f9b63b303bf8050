//! Data channel: the client listens, the server connects back, payload streams in.

use crate::error::{FtError, Result};
use crate::protocol::{tag, LISTEN_BACKLOG};
use crate::net::tune_socket;
use crate::protocol_core::{confine_name, read_frame, wire_name, Frame};
use socket2::{Domain, Protocol, Socket, Type};
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};

/// Where the orchestrator gets its data connection from.
pub trait DataListener {
    type Stream: Read + Write;

    /// Bind the announced port and suspend until exactly one peer connects.
    /// Returns the channel and a printable peer address.
    fn accept_one(&mut self, port: u16) -> Result<(DataChannel<Self::Stream>, String)>;
}

/// Listens on all IPv4 interfaces with address reuse enabled.
pub struct TcpDataListener;

impl DataListener for TcpDataListener {
    type Stream = TcpStream;

    fn accept_one(&mut self, port: u16) -> Result<(DataChannel<TcpStream>, String)> {
        DataChannel::listen_and_accept_one(port)
    }
}

/// Outcome of a completed file branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileReceipt {
    /// Name the server declared in the FILE frame, unaltered.
    pub declared_name: OsString,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Owns the accepted data connection.
#[derive(Debug)]
pub struct DataChannel<S = TcpStream> {
    stream: S,
}

impl DataChannel<TcpStream> {
    pub fn listen_and_accept_one(port: u16) -> Result<(Self, String)> {
        let bind_err = |source| FtError::Bind { port, source };
        let socket =
            Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| FtError::Listen { port, source })?;

        let (conn, peer) = socket
            .accept()
            .map_err(|source| FtError::Accept { port, source })?;
        // listening socket closes when `socket` drops here
        let stream: TcpStream = conn.into();
        tune_socket(&stream);
        let peer = peer
            .as_socket()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok((Self { stream }, peer))
    }
}

impl<S: Read> DataChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Suspends until the next frame arrives.
    pub fn next_frame(&mut self) -> Result<Frame> {
        read_frame(&mut self.stream)
    }

    /// Names from a run of FNAME frames, starting with `first`, up to DONE.
    /// Nothing past DONE is read.
    pub fn consume_listing(&mut self, first: Frame) -> Listing<'_, S> {
        Listing {
            stream: &mut self.stream,
            current: Some(first),
            finished: false,
        }
    }

    /// Receive the file announced by `first` (a FILE frame carrying the
    /// destination name) into `dest_dir`.
    ///
    /// Every following frame's payload is appended, including the payload of
    /// the terminating DONE frame. Refuses to touch an existing file; in that
    /// case no further frames are read.
    pub fn consume_file(
        &mut self,
        first: Frame,
        dest_dir: &Path,
        mut progress: impl FnMut(u64),
    ) -> Result<FileReceipt> {
        if !first.is(tag::FILE) {
            return Err(FtError::UnexpectedTag {
                expected: tag::FILE,
                found: first.tag,
            });
        }
        let declared_name = wire_name(&first.payload)?;
        let path = confine_name(dest_dir, &declared_name)?;
        if path.symlink_metadata().is_ok() {
            return Err(FtError::DestinationExists(path));
        }
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(FtError::DestinationExists(path))
            }
            Err(source) => return Err(FtError::LocalIo { path, source }),
        };
        let local_err = |source| FtError::LocalIo {
            path: path.clone(),
            source,
        };
        let mut out = BufWriter::new(file);

        let mut bytes = 0u64;
        loop {
            let frame = read_frame(&mut self.stream)?;
            out.write_all(&frame.payload).map_err(local_err)?;
            bytes += frame.payload.len() as u64;
            progress(bytes);
            if frame.is(tag::DONE) {
                break;
            }
        }
        out.flush().map_err(local_err)?;

        Ok(FileReceipt {
            declared_name,
            path,
            bytes,
        })
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Lazy, single-pass sequence of listed names.
pub struct Listing<'a, S> {
    stream: &'a mut S,
    current: Option<Frame>,
    finished: bool,
}

impl<S: Read> Iterator for Listing<'_, S> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let frame = match self.current.take() {
            Some(f) => f,
            None => match read_frame(self.stream) {
                Ok(f) => f,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            },
        };
        if frame.is(tag::FNAME) {
            Some(Ok(frame.text()))
        } else if frame.is(tag::DONE) {
            self.finished = true;
            None
        } else {
            self.finished = true;
            Some(Err(FtError::MalformedStream(format!(
                "tag {:?} inside a file listing",
                frame.tag
            ))))
        }
    }
}
