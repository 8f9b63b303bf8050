use anyhow::{Context, Result};
use clap::Parser;

use ftx::cli::ServerOpts;

fn main() -> Result<()> {
    let opts = ServerOpts::parse();

    // Validate root directory exists and is a directory
    if !opts.root.is_dir() {
        anyhow::bail!("Error: Root path is not a directory: {}", opts.root.display());
    }
    let canonical_root = std::fs::canonicalize(&opts.root)
        .with_context(|| format!("Failed to canonicalize root path: {}", opts.root.display()))?;

    ctrlc::set_handler(move || {
        eprintln!("\nftxd: Server closed, have a nice day!");
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    ftx::server::serve(&opts.bind, opts.port, &canonical_root)
}
