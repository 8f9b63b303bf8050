use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Observer for session milestones. Every method defaults to a no-op.
pub trait Logger: Send + Sync {
    fn control_connected(&self, _addr: &str) {}
    fn handshake_accepted(&self, _reply_tag: &str) {}
    fn handshake_rejected(&self, _msg: &str) {}
    fn data_connected(&self, _peer: &str) {}
    fn listing_started(&self) {}
    fn listing_entry(&self, _name: &str) {}
    fn file_started(&self, _name: &str) {}
    fn file_progress(&self, _bytes: u64) {}
    fn file_done(&self, _path: &Path, _bytes: u64) {}
    fn transfer_failed(&self, _msg: &str) {}
    fn server_error(&self, _msg: &str) {}
    fn closed(&self, _ok: bool) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Forwards every event to each wrapped logger in order.
pub struct Tee(pub Vec<Box<dyn Logger>>);

impl Logger for Tee {
    fn control_connected(&self, addr: &str) {
        self.0.iter().for_each(|l| l.control_connected(addr));
    }
    fn handshake_accepted(&self, reply_tag: &str) {
        self.0.iter().for_each(|l| l.handshake_accepted(reply_tag));
    }
    fn handshake_rejected(&self, msg: &str) {
        self.0.iter().for_each(|l| l.handshake_rejected(msg));
    }
    fn data_connected(&self, peer: &str) {
        self.0.iter().for_each(|l| l.data_connected(peer));
    }
    fn listing_started(&self) {
        self.0.iter().for_each(|l| l.listing_started());
    }
    fn listing_entry(&self, name: &str) {
        self.0.iter().for_each(|l| l.listing_entry(name));
    }
    fn file_started(&self, name: &str) {
        self.0.iter().for_each(|l| l.file_started(name));
    }
    fn file_progress(&self, bytes: u64) {
        self.0.iter().for_each(|l| l.file_progress(bytes));
    }
    fn file_done(&self, path: &Path, bytes: u64) {
        self.0.iter().for_each(|l| l.file_done(path, bytes));
    }
    fn transfer_failed(&self, msg: &str) {
        self.0.iter().for_each(|l| l.transfer_failed(msg));
    }
    fn server_error(&self, msg: &str) {
        self.0.iter().for_each(|l| l.server_error(msg));
    }
    fn closed(&self, ok: bool) {
        self.0.iter().for_each(|l| l.closed(ok));
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn control_connected(&self, addr: &str) {
        self.line(&format!("CONTROL addr={}", addr));
    }
    fn handshake_accepted(&self, reply_tag: &str) {
        self.line(&format!("ACCEPTED reply={}", reply_tag));
    }
    fn handshake_rejected(&self, msg: &str) {
        self.line(&format!("REJECTED msg={}", msg));
    }
    fn data_connected(&self, peer: &str) {
        self.line(&format!("DATA peer={}", peer));
    }
    fn listing_entry(&self, name: &str) {
        self.line(&format!("FNAME name={}", name));
    }
    fn file_started(&self, name: &str) {
        self.line(&format!("FILE name={}", name));
    }
    fn file_done(&self, path: &Path, bytes: u64) {
        self.line(&format!("RECEIVED path={} bytes={}", path.display(), bytes));
    }
    fn transfer_failed(&self, msg: &str) {
        self.line(&format!("TRANSFER_FAILED msg={}", msg));
    }
    fn server_error(&self, msg: &str) {
        self.line(&format!("ERROR msg={}", msg));
    }
    fn closed(&self, ok: bool) {
        self.line(&format!("CLOSED ok={ok}"));
    }
}
