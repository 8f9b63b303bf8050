//! Reference server: serves one control connection at a time from a root directory.

use crate::net::tune_socket;
use crate::protocol::{tag, DATA_CONNECT_ATTEMPTS, SERVER_CHUNK};
use crate::protocol_core::{read_frame, write_frame, Frame};
use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

pub fn serve(bind: &str, port: u16, root: &Path) -> Result<()> {
    let listener =
        TcpListener::bind((bind, port)).with_context(|| format!("bind {}:{}", bind, port))?;
    eprintln!("ftxd listening on {}:{} root={}", bind, port, root.display());
    serve_on(listener, root)
}

/// Accept loop over an already-bound listener. Never returns on its own.
pub fn serve_on(listener: TcpListener, root: &Path) -> Result<()> {
    for conn in listener.incoming() {
        match conn {
            Ok(mut stream) => {
                tune_socket(&stream);
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                eprintln!("control connection from {}", peer);
                if let Err(e) = handle_conn(&mut stream, root) {
                    eprintln!(
                        "connection error during handling (possible client disconnect): {:#}",
                        e
                    );
                }
            }
            Err(e) => {
                eprintln!("accept error: {}", e);
            }
        }
    }
    Ok(())
}

fn handle_conn(control: &mut TcpStream, root: &Path) -> Result<()> {
    let dport = read_frame(control)?;
    if !dport.is(tag::DPORT) {
        write_frame(control, tag::ERROR, b"Error: expected DPORT")?;
        bail!("expected DPORT, got {:?}", dport.tag);
    }
    let data_port: u16 = dport
        .text()
        .trim()
        .parse()
        .with_context(|| format!("bad data port {:?}", dport.text()))?;

    let cmd = read_frame(control)?;
    if !cmd.is(tag::LIST) && !cmd.is(tag::GET) {
        write_frame(control, tag::ERROR, b"Error: command must be LIST or GET")?;
        bail!("unknown command {:?}", cmd.tag);
    }
    write_frame(control, tag::OKAY, b"")?;

    let client = SocketAddr::new(control.peer_addr()?.ip(), data_port);
    let mut data = connect_back(client)?;
    eprintln!("data connection established with {}", client);

    if let Err(e) = send_payload(control, &mut data, root, &cmd) {
        // The client may abandon the data connection, e.g. after refusing the
        // file. The control side still closes in order.
        eprintln!("data connection lost: {:#}", e);
        write_frame(control, tag::ERROR, b"Error: data connection lost")?;
    }
    drop(data);
    write_frame(control, tag::CLOSE, b"")?;

    let ack = read_frame(control)?;
    if !ack.is(tag::ACK) {
        eprintln!("expected ACK, got {:?}", ack.tag);
    }
    eprintln!("data connection closed");
    Ok(())
}

/// Everything that goes over the data connection, ending with DONE. Lookup
/// failures are reported on the control connection.
fn send_payload(
    control: &mut TcpStream,
    data: &mut TcpStream,
    root: &Path,
    cmd: &Frame,
) -> Result<()> {
    let names = list_files(root)?;
    if cmd.is(tag::LIST) {
        for name in &names {
            write_frame(data, tag::FNAME, name.as_bytes())?;
        }
    } else {
        let name = cmd.text();
        if !names.contains(&name) {
            write_frame(control, tag::ERROR, b"Error: File not found")?;
        } else {
            match File::open(root.join(&name)) {
                Ok(mut f) => {
                    write_frame(data, tag::FILE, name.as_bytes())?;
                    send_chunks(&mut f, data)?;
                }
                Err(e) => {
                    eprintln!("open {}: {}", name, e);
                    write_frame(control, tag::ERROR, b"Error: cannot open file")?;
                }
            }
        }
    }
    write_frame(data, tag::DONE, b"")?;
    Ok(())
}

fn connect_back(addr: SocketAddr) -> Result<TcpStream> {
    let mut last = None;
    for _ in 0..DATA_CONNECT_ATTEMPTS {
        match TcpStream::connect(addr) {
            Ok(s) => {
                tune_socket(&s);
                return Ok(s);
            }
            Err(e) => {
                last = Some(e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
    match last {
        Some(e) => Err(e).with_context(|| format!("connect {}", addr)),
        None => bail!("connect {}: no attempts made", addr),
    }
}

fn send_chunks<R: Read>(src: &mut R, data: &mut TcpStream) -> Result<()> {
    let mut buf = [0u8; SERVER_CHUNK];
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        write_frame(data, tag::FILE, &buf[..n])?;
    }
}

/// Names of the non-directory entries directly under `root`, sorted.
pub fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("cannot open {}", root.display()))? {
        let entry = entry?;
        let is_dir = fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false);
        if is_dir {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
