//! Tracing subscriber setup shared by the binaries.
//!
//! Logs always go to stderr; stdout may be the capture destination.

use tracing_subscriber::EnvFilter;

/// Verbosity requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    Verbose,
    Debug,
}

/// Filter directive for the given inputs.
///
/// A configured `log_level` wins over the command-line verbosity. `RUST_LOG`,
/// when set, wins over both (see [`init`]).
pub fn filter_directive(verbosity: Verbosity, log_level: Option<&str>) -> String {
    let level = match (log_level, verbosity) {
        (Some(level), _) if !level.trim().is_empty() => level.trim().to_ascii_lowercase(),
        (_, Verbosity::Debug) => "debug".to_string(),
        (_, Verbosity::Verbose) => "info".to_string(),
        (_, Verbosity::Quiet) => "warn".to_string(),
    };
    format!("warn,rlrelay_core={level},rltee={level},rlexec={level}")
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbosity: Verbosity, log_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity, log_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity == Verbosity::Debug)
        .try_init();
}
