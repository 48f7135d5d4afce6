//! rlexec: feed interactive input lines to a command.
//!
//! Every accepted line is written to COMMAND's stdin; COMMAND's stdout is
//! teed into OUTPUT and rlexec exits with COMMAND's exit status. Without a
//! command it behaves like rltee.

mod cli;

use anyhow::{Context, Result};
use cli::Invocation;
use rlrelay_core::logging::{self, Verbosity};
use rlrelay_core::{config, line_source, ExitOutcome, ProcessRunner, RelayConfig, Session, SessionMode};
use tracing::{debug, error};

const TOOL: &str = "rlexec";

#[tokio::main]
async fn main() {
    let invocation = match Invocation::parse_from(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(e) => e.exit(),
    };

    let code = match run(invocation).await {
        Ok(outcome) => outcome.code(),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("rlexec: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(invocation: Invocation) -> Result<ExitOutcome> {
    let verbosity = invocation.verbosity();
    let overrides = invocation.overrides();
    let resolved = overrides.and_then(|overrides| {
        RelayConfig::resolve(TOOL, invocation.cli.config.as_deref(), overrides)
            .context("failed to load configuration")
    });
    logging::init(
        verbosity,
        resolved.as_ref().ok().and_then(|c| c.log_level.as_deref()),
    );
    let config = resolved?;

    if verbosity == Verbosity::Debug {
        if let Some(path) = config::locate(TOOL, invocation.cli.config.as_deref()) {
            debug!(path = %path.display(), "using config file");
        }
        debug!(config = %serde_json::to_string(&config)?, "resolved config");
    }

    let mode = match invocation.command.split_first() {
        Some((name, args)) => SessionMode::Execute(ProcessRunner::new(name.clone(), args.to_vec())),
        None => SessionMode::Record,
    };
    debug!(?mode, "session mode");

    let source = line_source::open_stdin(&config).context("failed to start line reader")?;
    let outcome = Session::new(&config, mode)
        .run(source, rlrelay_core::termination_requested())
        .await?;
    Ok(outcome)
}
