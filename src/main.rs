//! ftx - request a listing or a file from an ftxd server
//!
//! One process runs exactly one session:
//! control connect -> DPORT + command -> reverse data connection -> ACK -> drain -> close

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use ftx::cli::Args;
use ftx::log::{TransferLog, TransferLogEntry};
use ftx::logger::{Logger, Tee, TextLogger};
use ftx::progress::ConsoleReporter;
use ftx::run_session;

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let args = Args::parse();
    let quiet = args.quiet;
    let log_file = args.log_file.clone();
    let journal = args.journal.clone().map(|p| TransferLog::new(&p));

    let config = match args.into_config() {
        Ok(c) => c,
        Err(e) => Args::command()
            .error(ErrorKind::ArgumentConflict, e.to_string())
            .exit(),
    };

    let mut observers: Vec<Box<dyn Logger>> =
        vec![Box::new(ConsoleReporter::new(&config.host, quiet))];
    if let Some(ref p) = log_file {
        match TextLogger::new(p) {
            Ok(l) => observers.push(Box::new(l)),
            Err(e) => eprintln!("ftx: cannot open log file {}: {}", p.display(), e),
        }
    }
    let logger = Tee(observers);

    let result = run_session(&config, &logger);

    if let Some(ref journal) = journal {
        let entry = match &result {
            Ok(report) => TransferLogEntry::from_report(&config, report),
            Err(e) => TransferLogEntry::aborted(&config, &e.to_string()),
        };
        if let Err(e) = journal.add_entry(&entry) {
            eprintln!("ftx: journal: {:#}", e);
        }
    }

    // Recoverable faults were already reported; the session closed cleanly.
    result.with_context(|| {
        format!(
            "session with {}:{} aborted",
            config.host, config.control_port
        )
    })?;
    Ok(())
}
