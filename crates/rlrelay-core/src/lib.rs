//! rlrelay-core: line-capture-and-relay engine.
//!
//! Reads interactive input line by line, keeps a flat history log, and relays
//! every accepted line either straight into an output file (`rltee`) or into
//! a child process's stdin while teeing the child's stdout into the output
//! file (`rlexec`).
//!
//! # Quick Start
//!
//! ```no_run
//! use rlrelay_core::{line_source, RelayConfig, Session, SessionMode};
//!
//! # async fn example() -> rlrelay_core::RelayResult<()> {
//! let config = RelayConfig {
//!     output: Some("/tmp/out.txt".into()),
//!     ..Default::default()
//! };
//! let source = line_source::open_stdin(&config)?;
//! let outcome = Session::new(&config, SessionMode::Record)
//!     .run(source, std::future::pending())
//!     .await?;
//! std::process::exit(outcome.code());
//! # }
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod line_source;
pub mod logging;
pub mod runner;
pub mod session;
pub mod sink;

// Re-export commonly used items at crate root.
pub use config::{ConfigOverrides, RelayConfig};
pub use error::{HistoryError, ReadError, RelayError, RelayResult};
pub use history::HistoryStore;
pub use line_source::{EditorSource, LineEvent, LineSource, PipedSource};
pub use runner::{ExitOutcome, ProcessRunner, RunningProcess, ABORTED_EXIT_CODE};
pub use session::{Session, SessionMode};
pub use sink::{Buffering, Destination, OutputSink, SinkOptions, Staging};

/// Resolves when the process is asked to terminate (SIGTERM or SIGHUP on
/// Unix). Never resolves elsewhere.
#[cfg(unix)]
pub async fn termination_requested() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut term), Ok(mut hup)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) else {
        tracing::warn!("cannot install termination handlers");
        return std::future::pending().await;
    };
    tokio::select! {
        _ = term.recv() => tracing::info!("SIGTERM received"),
        _ = hup.recv() => tracing::info!("SIGHUP received"),
    }
}

#[cfg(not(unix))]
pub async fn termination_requested() {
    std::future::pending::<()>().await
}
