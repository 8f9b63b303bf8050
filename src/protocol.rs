//! Shared protocol constants for the ftx framed transport

// Frame header: LENGTH (2, big-endian) | TAG (8, NUL-padded ASCII)
pub const LENGTH_FIELD: usize = 2;
pub const TAG_LEN: usize = 8;
pub const HEADER_LEN: usize = LENGTH_FIELD + TAG_LEN;

// The length field counts the whole frame, header included
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;
pub const MAX_PAYLOAD: usize = MAX_FRAME_LEN - HEADER_LEN;

// Backlog for the client's data listener
pub const LISTEN_BACKLOG: i32 = 5;

// Chunk size the reference server uses for file contents
pub const SERVER_CHUNK: usize = 512;

// Attempts the reference server makes to reach the client's data port
pub const DATA_CONNECT_ATTEMPTS: u32 = 10;

// Tag vocabulary. Tags are compared after trailing NULs are stripped.
pub mod tag {
    // control, client -> server
    pub const DPORT: &str = "DPORT";
    pub const LIST: &str = "LIST";
    pub const GET: &str = "GET";
    pub const ACK: &str = "ACK";

    // control, server -> client
    pub const ERROR: &str = "ERROR";
    pub const CLOSE: &str = "CLOSE";
    // Any non-ERROR reply accepts the command; this is what the reference server sends.
    pub const OKAY: &str = "OKAY";

    // data, server -> client
    pub const FNAME: &str = "FNAME";
    pub const FILE: &str = "FILE";
    pub const DONE: &str = "DONE";
}
