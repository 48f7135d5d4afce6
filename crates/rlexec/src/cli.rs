//! Command-line parsing.
//!
//! Accepted forms:
//!
//! ```text
//! rlexec [OPTIONS] [OUTPUT] -- COMMAND [ARGS...]
//! rlexec [OPTIONS] COMMAND [ARGS...]
//! rlexec [OPTIONS]                      (record mode)
//! ```
//!
//! Everything after the first `--` is the command, untouched by clap.

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use rlrelay_core::logging::Verbosity;
use rlrelay_core::ConfigOverrides;

/// rlexec: feed interactive input lines to a command
#[derive(Parser, Debug)]
#[command(
    name = "rlexec",
    version,
    about = "Feed interactive input lines to a command and tee its output to a file",
    override_usage = "rlexec [OPTIONS] [OUTPUT] -- COMMAND [ARGS]...\n       rlexec [OPTIONS] COMMAND [ARGS]..."
)]
pub struct Cli {
    /// Config file (default: <config dir>/rlexec/rlexec.toml, then ./rlexec.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output file ("-" for stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// History file
    #[arg(short = 'H', long)]
    pub history: Option<PathBuf>,

    /// Prompt
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Buffer output instead of flushing every write
    #[arg(short = 'r', long)]
    pub buffered: bool,

    /// Write to a temp file and move it into place on success
    #[arg(short, long)]
    pub temp: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Debug output
    #[arg(long)]
    pub debug: bool,

    /// OUTPUT when followed by `--`, otherwise COMMAND [ARGS...]
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

/// A fully parsed invocation.
#[derive(Debug)]
pub struct Invocation {
    pub cli: Cli,
    /// Command and arguments; empty means record mode.
    pub command: Vec<String>,
}

impl Invocation {
    /// Parse raw process arguments (program name first).
    pub fn parse_from<I>(raw: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = OsString>,
    {
        let (head, tail) = split_at_separator(raw.into_iter().collect());
        let cli = Cli::try_parse_from(head)?;
        Ok(Self::from_parts(cli, tail))
    }

    fn from_parts(mut cli: Cli, tail: Option<Vec<String>>) -> Self {
        match tail {
            Some(command) => Self { cli, command },
            None => {
                let command = std::mem::take(&mut cli.args);
                Self { cli, command }
            }
        }
    }

    /// OUTPUT may come from `-o` or from the positional before `--`, not both.
    pub fn overrides(&self) -> Result<ConfigOverrides> {
        let positional = match self.cli.args.as_slice() {
            [] => None,
            [output] => Some(PathBuf::from(output)),
            [_, extra, ..] => bail!("unexpected argument '{extra}' before '--'"),
        };
        if positional.is_some() && self.cli.output.is_some() {
            bail!("output given both as argument and with --output");
        }

        Ok(ConfigOverrides {
            output: positional.or_else(|| self.cli.output.clone()),
            history: self.cli.history.clone(),
            prompt: self.cli.prompt.clone(),
            buffered: self.cli.buffered,
            temp: self.cli.temp,
        })
    }

    pub fn verbosity(&self) -> Verbosity {
        if self.cli.debug {
            Verbosity::Debug
        } else if self.cli.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Quiet
        }
    }
}

/// Split at the first bare `--`. The tail, if any, is returned as strings.
fn split_at_separator(raw: Vec<OsString>) -> (Vec<OsString>, Option<Vec<String>>) {
    match raw.iter().position(|arg| arg == "--") {
        Some(pos) => {
            let tail = raw[pos + 1..]
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            (raw[..pos].to_vec(), Some(tail))
        }
        None => (raw, None),
    }
}
