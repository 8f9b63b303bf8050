//! In-memory stand-ins for sockets, shared by unit tests.

use crate::protocol_core::{read_frame, Frame};
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the other side of the script looked like when a write happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteMark {
    /// Script bytes already read.
    pub consumed: u64,
    /// Value of the watched flag, false when nothing is watched.
    pub flagged: bool,
}

/// Reads from a fixed script, records everything written.
pub struct Duplex {
    input: Cursor<Vec<u8>>,
    pub output: Vec<u8>,
    marks: Vec<WriteMark>,
    watch: Option<Arc<AtomicBool>>,
}

impl Duplex {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input: Cursor::new(input),
            output: Vec::new(),
            marks: Vec::new(),
            watch: None,
        }
    }

    /// Sample `flag` at every write.
    pub fn watching(mut self, flag: Arc<AtomicBool>) -> Self {
        self.watch = Some(flag);
        self
    }

    /// One mark per write call, in order.
    pub fn marks(&self) -> &[WriteMark] {
        &self.marks
    }

    /// Decode everything written so far.
    pub fn written_frames(&self) -> Vec<Frame> {
        let mut r = Cursor::new(&self.output[..]);
        let mut frames = Vec::new();
        while (r.position() as usize) < self.output.len() {
            frames.push(read_frame(&mut r).expect("well-formed output"));
        }
        frames
    }
}

impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.marks.push(WriteMark {
            consumed: self.input.position(),
            flagged: self
                .watch
                .as_ref()
                .is_some_and(|f| f.load(Ordering::SeqCst)),
        });
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Scripted stream that raises a flag when dropped.
pub struct DropFlag<S> {
    inner: S,
    dropped: Arc<AtomicBool>,
}

impl<S> DropFlag<S> {
    pub fn new(inner: S, dropped: Arc<AtomicBool>) -> Self {
        Self { inner, dropped }
    }
}

impl<S> Drop for DropFlag<S> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl<S: Read> Read for DropFlag<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: Write> Write for DropFlag<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
