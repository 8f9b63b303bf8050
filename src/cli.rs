//! Command-line surface for the ftx client and the ftxd server

use crate::session::{Command, SessionConfig};
use anyhow::{bail, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Fetch a directory listing or a file from an ftxd server.
///
/// Usage: ftx <HOST> <PORT> -l <DATA_PORT>
///        ftx <HOST> <PORT> -g <FILENAME> <DATA_PORT>
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
#[command(group(ArgGroup::new("command").required(true).args(["list", "get"])))]
pub struct Args {
    /// Server host name or address
    pub host: String,

    /// Server control port
    pub port: u16,

    /// Port this client listens on for the server's data connection
    pub data_port: u16,

    /// List the files the server offers
    #[arg(short = 'l')]
    pub list: bool,

    /// Transfer FILENAME from the server
    #[arg(short = 'g', value_name = "FILENAME")]
    pub get: Option<String>,

    /// Directory received files are written into
    #[arg(long, default_value = ".")]
    pub dest_dir: PathBuf,

    /// Append timestamped session events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Append one JSON line per session to this file
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Checks clap cannot express, then freeze into a session configuration.
    pub fn into_config(self) -> Result<SessionConfig> {
        if self.port == self.data_port {
            bail!("Server port and data port cannot be the same!");
        }
        let command = match self.get {
            Some(name) if name.is_empty() => bail!("Filename for -g cannot be empty"),
            Some(name) => Command::Get(name),
            None => Command::List,
        };
        Ok(SessionConfig {
            host: self.host,
            control_port: self.port,
            data_port: self.data_port,
            command,
            dest_dir: self.dest_dir,
        })
    }
}

/// Reference server options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "Reference server for the ftx protocol")]
pub struct ServerOpts {
    /// Control port to listen on
    pub port: u16,

    /// Directory whose files are listed and served
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,
}
