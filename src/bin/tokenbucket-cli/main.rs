//! tokenbucket-cli - run token bucket commands against an in-process store.
//!
//! Commands are the same argument vectors a host would deliver: the command
//! name followed by its arguments, separated by whitespace.
//!
//! # Usage
//!
//! ```bash
//! # One command
//! tokenbucket-cli tokenbucket.set api 10 1 10
//!
//! # A session on stdin; the store lives for the whole session
//! printf 'tokenbucket.set api 10 1\ntokenbucket.get api 1\n' | tokenbucket-cli
//!
//! # A script file, JSON replies
//! tokenbucket-cli --script limits.txt --json
//! ```

mod cli;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Initialize tracing subscriber with environment-based filtering.
///
/// - `quiet`: Suppress all logging output (for scripting)
/// - `verbose`: Enable debug-level logging
fn init_tracing(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.global.is_quiet, cli.global.is_verbose);

    cli.run().await
}
