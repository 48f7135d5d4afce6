use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the relay engine.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("config error: {0}")]
    Config(String),

    #[error("cannot open output {}", path.display())]
    OpenSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot start '{name}'")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to forward line")]
    Forward(#[source] std::io::Error),

    #[error("failed to write output")]
    Sink(#[source] std::io::Error),

    #[error("cannot commit output to {}", path.display())]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot initialize line reader: {0}")]
    LineReader(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A non-EOF failure from a line source. The session treats it as end of input.
#[derive(Debug, Error)]
#[error("read error: {0}")]
pub struct ReadError(pub String);

/// A failure to read or append the history log. Never fatal, only logged,
/// so the io error is part of the message.
#[derive(Debug, Error)]
#[error("history {}: {cause}", path.display())]
pub struct HistoryError {
    pub path: PathBuf,
    pub cause: std::io::Error,
}

pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn io_cause_is_reported_once_in_the_chain() {
        let err = RelayError::Forward(IoError::new(ErrorKind::BrokenPipe, "pipe gone"));
        assert_eq!(err.to_string(), "failed to forward line");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("pipe gone"));

        let err = RelayError::OpenSink {
            path: PathBuf::from("/no/such/out"),
            source: IoError::new(ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.to_string(), "cannot open output /no/such/out");
        assert!(err.source().is_some());
    }

    #[test]
    fn bare_io_error_is_transparent() {
        let err = RelayError::from(IoError::other("disk full"));
        assert_eq!(err.to_string(), "disk full");
        assert!(err.source().is_none());
    }

    #[test]
    fn history_error_carries_its_cause_inline() {
        let err = HistoryError {
            path: PathBuf::from("hist"),
            cause: IoError::new(ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "history hist: denied");
    }
}
