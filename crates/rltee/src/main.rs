//! rltee: record interactive input lines to a file.
//!
//! Reads lines with a line editor (or plainly from a pipe), keeps an optional
//! history file, and writes every accepted line to OUTPUT.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rlrelay_core::logging::{self, Verbosity};
use rlrelay_core::{config, line_source, ConfigOverrides, ExitOutcome, RelayConfig, Session, SessionMode};
use tracing::{debug, error};

const TOOL: &str = "rltee";

/// rltee: record interactive input lines to a file
#[derive(Parser, Debug)]
#[command(name = "rltee", version, about = "Record interactive input lines to a file")]
struct Cli {
    /// Output file ("-" for stdout)
    output: PathBuf,

    /// Config file (default: <config dir>/rltee/rltee.toml, then ./rltee.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// History file
    #[arg(short = 'H', long)]
    history: Option<PathBuf>,

    /// Buffer output instead of flushing every line
    #[arg(short, long)]
    buffered: bool,

    /// Write to a temp file and move it into place on success
    #[arg(short, long)]
    temp: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Debug output
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Quiet
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(outcome) => outcome.code(),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("rltee: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<ExitOutcome> {
    let verbosity = cli.verbosity();
    let overrides = ConfigOverrides {
        output: Some(cli.output),
        history: cli.history,
        prompt: None,
        buffered: cli.buffered,
        temp: cli.temp,
    };

    let resolved = RelayConfig::resolve(TOOL, cli.config.as_deref(), overrides);
    logging::init(
        verbosity,
        resolved.as_ref().ok().and_then(|c| c.log_level.as_deref()),
    );
    let config = resolved.context("failed to load configuration")?;

    if verbosity == Verbosity::Debug {
        if let Some(path) = config::locate(TOOL, cli.config.as_deref()) {
            debug!(path = %path.display(), "using config file");
        }
        debug!(config = %serde_json::to_string(&config)?, "resolved config");
    }

    let source = line_source::open_stdin(&config).context("failed to start line reader")?;
    let outcome = Session::new(&config, SessionMode::Record)
        .run(source, rlrelay_core::termination_requested())
        .await?;
    Ok(outcome)
}
