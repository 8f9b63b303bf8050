//! Console reporting for the client
//!
//! Milestones print as plain lines; while a file streams in, a spinner at the
//! bottom shows the running byte count.

use crate::logger::Logger;
use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const PREFIX: &str = "ftx:";

pub struct ConsoleReporter {
    host: String,
    quiet: bool,
    spinner: Mutex<Option<(ProgressBar, Instant)>>,
}

impl ConsoleReporter {
    pub fn new(host: &str, quiet: bool) -> Self {
        Self {
            host: host.to_string(),
            quiet,
            spinner: Mutex::new(None),
        }
    }

    fn say(&self, msg: &str) {
        if !self.quiet {
            self.suspend(|| println!("{} {}", PREFIX, msg));
        }
    }

    fn warn(&self, msg: &str) {
        self.suspend(|| {
            eprintln!("{} {}", PREFIX, msg.with(Color::Red));
        });
    }

    fn suspend<F: FnOnce()>(&self, f: F) {
        match self.spinner.lock().ok().as_deref() {
            Some(Some((bar, _))) => bar.suspend(f),
            _ => f(),
        }
    }

    fn start_spinner(&self, name: &str) {
        if self.quiet {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(format!("receiving {}", name));
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some((spinner, Instant::now()));
        }
    }

    fn stop_spinner(&self) -> Option<Duration> {
        let taken = self.spinner.lock().ok().and_then(|mut slot| slot.take());
        taken.map(|(bar, started)| {
            bar.finish_and_clear();
            started.elapsed()
        })
    }
}

impl Logger for ConsoleReporter {
    fn control_connected(&self, _addr: &str) {
        self.say(&format!("Control connection established with \"{}\"", self.host));
    }

    fn handshake_rejected(&self, msg: &str) {
        self.warn(msg);
    }

    fn data_connected(&self, _peer: &str) {
        self.say(&format!("Data connection established with \"{}\"", self.host));
    }

    fn listing_started(&self) {
        self.say(&format!("List of files on \"{}\"", self.host));
    }

    fn listing_entry(&self, name: &str) {
        if !self.quiet {
            println!("  {}", name);
        }
    }

    fn file_started(&self, name: &str) {
        self.start_spinner(name);
    }

    fn file_progress(&self, bytes: u64) {
        if let Ok(slot) = self.spinner.lock() {
            if let Some((bar, started)) = slot.as_ref() {
                let secs = started.elapsed().as_secs_f64();
                let rate = if secs > 0.1 {
                    format!(" @ {:.1} MB/s", bytes as f64 / secs / 1_048_576.0)
                } else {
                    String::new()
                };
                bar.set_message(format!("{} bytes{}", bytes, rate));
            }
        }
    }

    fn file_done(&self, path: &Path, bytes: u64) {
        let elapsed = self.stop_spinner().unwrap_or_default();
        self.say(&format!(
            "{} file transfer completed! {} ({} bytes in {:.1}s)",
            "Success,".with(Color::Green).bold(),
            path.display(),
            bytes,
            elapsed.as_secs_f64()
        ));
    }

    fn transfer_failed(&self, msg: &str) {
        self.stop_spinner();
        self.warn(msg);
    }

    fn server_error(&self, msg: &str) {
        self.warn(msg);
    }

    fn closed(&self, _ok: bool) {
        self.stop_spinner();
        self.say("File transfer connections closed, have a nice day!");
    }
}
