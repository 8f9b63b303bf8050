use crate::session::{SessionConfig, SessionReport, TransferOutcome};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Rejected,
    Failed,
    Aborted,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub session_id: String,
    pub host: String,
    pub control_port: u16,
    pub data_port: u16,
    pub command: String,
    pub filename: Option<String>,
    pub destination: Option<PathBuf>,
    pub status: TransferStatus,
    pub bytes_received: u64,
    pub listed: usize,
    pub server_errors: Vec<String>,
    pub error: Option<String>,
}

impl TransferLogEntry {
    /// Entry for a session that reached Closed (possibly rejected or with a failed transfer).
    pub fn from_report(config: &SessionConfig, report: &SessionReport) -> Self {
        let mut entry = Self::base(config);
        entry.bytes_received = report.bytes_received();
        entry.listed = report.listed().len();
        entry.server_errors = report.server_errors.clone();
        if let Some(msg) = &report.rejected {
            entry.status = TransferStatus::Rejected;
            entry.error = Some(msg.clone());
        } else {
            match &report.transfer {
                Some(TransferOutcome::Received(r)) => entry.destination = Some(r.path.clone()),
                Some(TransferOutcome::Failed(e)) => {
                    entry.status = TransferStatus::Failed;
                    entry.error = Some(e.to_string());
                }
                _ => {}
            }
            if !report.server_errors.is_empty() {
                entry.status = TransferStatus::Failed;
            }
        }
        entry
    }

    /// Entry for a session ended by a fatal fault.
    pub fn aborted(config: &SessionConfig, error: &str) -> Self {
        let mut entry = Self::base(config);
        entry.status = TransferStatus::Aborted;
        entry.error = Some(error.to_string());
        entry
    }

    fn base(config: &SessionConfig) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            session_id: uuid::Uuid::new_v4().to_string(),
            host: config.host.clone(),
            control_port: config.control_port,
            data_port: config.data_port,
            command: config.command.name().to_string(),
            filename: config.command.filename().map(str::to_string),
            destination: None,
            status: TransferStatus::Completed,
            bytes_received: 0,
            listed: 0,
            server_errors: Vec::new(),
            error: None,
        }
    }
}

/// Append-only JSON-lines journal of sessions.
pub struct TransferLog {
    log_file_path: PathBuf,
}

impl TransferLog {
    pub fn new(path: &Path) -> Self {
        TransferLog {
            log_file_path: path.to_path_buf(),
        }
    }

    pub fn add_entry(&self, entry: &TransferLogEntry) -> Result<()> {
        if let Some(parent) = self.log_file_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open transfer journal")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

}
