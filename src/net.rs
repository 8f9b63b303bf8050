//! Socket helpers shared by the control channel, the data channel and the server.

use socket2::SockRef;
use std::net::TcpStream;

// Socket tuning: disable Nagle and keep idle connections probed. No timeouts.
pub fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    let _ = SockRef::from(stream).set_keepalive(true);
}
