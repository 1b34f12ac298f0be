//! CLI argument parsing and the command loop.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use tokenbucket::BucketOperations;
use tokenbucket::COMMAND_TABLE;
use tokenbucket::DeterministicHostStore;
use tokenbucket::EngineConfig;
use tokenbucket::SystemTimeProvider;
use tokenbucket::TokenBucketEngine;
use tokenbucket::constants::MODULE_NAME;
use tokenbucket::constants::MODULE_VERSION;
use tokenbucket::dispatch;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tracing::debug;
use tracing::info;

use crate::output::OutputFormat;
use crate::output::print_output;

/// Token bucket commands against an in-process store.
#[derive(Parser)]
#[command(name = "tokenbucket-cli")]
#[command(version)]
#[command(about = "Run token bucket commands against an in-process store")]
#[command(long_about = "Runs tokenbucket.set, tokenbucket.info and tokenbucket.get against an \
    in-memory store. With a command on the command line, runs it once; otherwise reads one \
    command per line from --script or stdin.")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    /// Command and arguments to run once, e.g. `tokenbucket.get api 1`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Options shared by every mode.
#[derive(Args, Clone)]
pub struct GlobalOptions {
    /// TOML configuration file.
    ///
    /// TOKENBUCKET_* environment variables override values from the file.
    #[arg(long, env = "TOKENBUCKET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Read commands from this file instead of stdin.
    #[arg(long, conflicts_with = "command")]
    pub script: Option<PathBuf>,

    /// Output JSON instead of human-readable format.
    #[arg(long = "json", conflicts_with = "is_resp")]
    pub is_json: bool,

    /// Output replies in wire encoding.
    #[arg(long = "resp")]
    pub is_resp: bool,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    pub is_verbose: bool,

    /// Suppress all logging output.
    #[arg(short = 'q', long = "quiet")]
    pub is_quiet: bool,
}

impl GlobalOptions {
    fn output_format(&self) -> OutputFormat {
        if self.is_json {
            OutputFormat::Json
        } else if self.is_resp {
            OutputFormat::Resp
        } else {
            OutputFormat::Human
        }
    }
}

impl Cli {
    /// Build the engine and run the requested command or session.
    pub async fn run(self) -> Result<()> {
        let config = EngineConfig::load(self.global.config.as_deref()).context("failed to load configuration")?;
        debug!(?config, "configuration loaded");
        debug!(
            module = MODULE_NAME,
            version = MODULE_VERSION,
            commands = COMMAND_TABLE.len(),
            "token bucket module loaded"
        );

        let store = DeterministicHostStore::with_max_key_size(config.max_name_size);
        let engine = TokenBucketEngine::from_config(store, SystemTimeProvider, &config);
        let format = self.global.output_format();

        if !self.command.is_empty() {
            let reply = dispatch(&engine, self.command.as_slice());
            print_output(&reply, format);
            return Ok(());
        }

        let stats = match &self.global.script {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open script {}", path.display()))?;
                run_session(&engine, BufReader::new(file), format).await?
            }
            None => run_session(&engine, BufReader::new(tokio::io::stdin()), format).await?,
        };
        info!(commands = stats.commands, errors = stats.errors, "session finished");
        Ok(())
    }
}

/// Counts for one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SessionStats {
    commands: usize,
    errors: usize,
}

/// Run one command per line until EOF.
///
/// Blank lines and lines starting with `#` are skipped.
async fn run_session<R>(engine: &dyn BucketOperations, reader: R, format: OutputFormat) -> Result<SessionStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = SessionStats::default();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("failed to read command")? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let argv: Vec<&str> = line.split_whitespace().collect();
        let reply = dispatch(engine, &argv);
        stats.commands += 1;
        if reply.is_error() {
            stats.errors += 1;
        }
        print_output(&reply, format);
    }
    Ok(stats)
}
