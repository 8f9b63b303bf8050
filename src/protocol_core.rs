//! Frame codec shared by the client channels and the reference server
//!
//! Wire layout (all integers big-endian):
//! LENGTH (2) | TAG (8, NUL-padded) | PAYLOAD (LENGTH - 10)

use crate::error::{FtError, Result};
use crate::protocol::{HEADER_LEN, MAX_PAYLOAD, TAG_LEN};
use std::ffi::{OsStr, OsString};
use std::io::{ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

/// One decoded frame. The tag has its trailing NULs stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub tag: String,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    /// Payload as text, for names and status messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Build frame header (10 bytes)
pub fn build_frame_header(tag: &str, payload_len: usize) -> Result<[u8; HEADER_LEN]> {
    let tag_bytes = tag.as_bytes();
    if tag_bytes.len() > TAG_LEN {
        return Err(FtError::Encoding(format!(
            "tag {:?} is {} bytes (max {})",
            tag,
            tag_bytes.len(),
            TAG_LEN
        )));
    }
    if payload_len > MAX_PAYLOAD {
        return Err(FtError::Encoding(format!(
            "payload too large: {} bytes (max: {})",
            payload_len, MAX_PAYLOAD
        )));
    }
    let total = (HEADER_LEN + payload_len) as u16;

    let mut header = [0u8; HEADER_LEN];
    header[0..2].copy_from_slice(&total.to_be_bytes());
    header[2..2 + tag_bytes.len()].copy_from_slice(tag_bytes);
    Ok(header)
}

/// Parse frame header
/// Returns: (tag, payload_length)
pub fn parse_frame_header(header: &[u8; HEADER_LEN]) -> Result<(String, usize)> {
    let total = u16::from_be_bytes([header[0], header[1]]) as usize;
    if total < HEADER_LEN {
        return Err(FtError::MalformedStream(format!(
            "frame length {} is shorter than the {}-byte header",
            total, HEADER_LEN
        )));
    }
    let raw_tag = &header[2..HEADER_LEN];
    let end = raw_tag
        .iter()
        .rposition(|&b| b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    let tag = String::from_utf8_lossy(&raw_tag[..end]).into_owned();
    Ok((tag, total - HEADER_LEN))
}

pub fn encode(tag: &str, payload: &[u8]) -> Result<Vec<u8>> {
    let header = build_frame_header(tag, payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

pub fn write_frame<W: Write + ?Sized>(w: &mut W, tag: &str, payload: &[u8]) -> Result<()> {
    let buf = encode(tag, payload)?;
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

/// Fill `buf` completely, looping over short reads.
fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => return Err(FtError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Decode one frame. Blocks until the whole frame has arrived.
pub fn read_frame<R: Read + ?Sized>(r: &mut R) -> Result<Frame> {
    let mut hdr = [0u8; HEADER_LEN];
    read_full(r, &mut hdr)?;
    let (tag, len) = parse_frame_header(&hdr)?;
    let mut payload = vec![0u8; len];
    read_full(r, &mut payload)?;
    Ok(Frame { tag, payload })
}

/// File name carried in a FILE payload, byte for byte.
///
/// Unix file names are arbitrary bytes, so nothing is re-encoded. Elsewhere a
/// name that is not UTF-8 cannot be represented and is refused.
pub fn wire_name(payload: &[u8]) -> Result<OsString> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Ok(OsStr::from_bytes(payload).to_os_string())
    }
    #[cfg(not(unix))]
    {
        std::str::from_utf8(payload).map(OsString::from).map_err(|_| {
            FtError::UnsafeDestination(String::from_utf8_lossy(payload).into_owned())
        })
    }
}

/// Resolve a peer-supplied file name to a path directly inside `root`.
/// Rejects absolute paths, parent directory components, root/prefix
/// components, nested directories and NUL bytes.
pub fn confine_name(root: &Path, name: &OsStr) -> Result<PathBuf> {
    use Component::{CurDir, Normal, ParentDir, Prefix, RootDir};

    let refuse = || FtError::UnsafeDestination(name.to_string_lossy().into_owned());
    if name.is_empty() || name.to_string_lossy().contains('\0') {
        return Err(refuse());
    }

    let mut safe: Option<&OsStr> = None;
    for component in Path::new(name).components() {
        match component {
            CurDir => {}
            Normal(s) => {
                if safe.is_some() {
                    return Err(refuse());
                }
                #[cfg(windows)]
                if s.to_string_lossy().contains(':') {
                    return Err(refuse());
                }
                safe = Some(s);
            }
            ParentDir | RootDir | Prefix(_) => return Err(refuse()),
        }
    }
    match safe {
        Some(s) => Ok(root.join(s)),
        None => Err(refuse()),
    }
}
