//! Interactive line input.
//!
//! A [`LineSource`] yields one logical line at a time. Ctrl-C is reported as
//! [`LineEvent::Interrupted`] and is resumable: the caller simply asks for the
//! next line again. Accepted lines are handed back via
//! [`LineSource::remember`] so the source can persist them to its history.

use std::io::{self, BufRead, BufReader, Stdin};

use crossterm::tty::IsTty;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::error::{HistoryError, ReadError, RelayError, RelayResult};
use crate::history::HistoryStore;

/// Outcome of one blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete line, terminator stripped.
    Line(String),
    /// The user pressed Ctrl-C; reading may continue.
    Interrupted,
    /// The input stream is closed.
    EndOfInput,
}

/// A blocking, line-at-a-time input source that owns a history store.
pub trait LineSource: Send {
    /// Block until a line, an interrupt or end of input.
    fn next_line(&mut self) -> Result<LineEvent, ReadError>;

    /// Record an accepted line in history.
    fn remember(&mut self, line: &str) -> Result<(), HistoryError>;
}

/// Open the source appropriate for the current stdin: a line editor on a
/// terminal, a plain line reader otherwise.
pub fn open_stdin(config: &RelayConfig) -> RelayResult<Box<dyn LineSource>> {
    let history = HistoryStore::new(config.history.clone());
    if io::stdin().is_tty() {
        let source = EditorSource::new(config.prompt.clone(), history, config.history_limit)?;
        Ok(Box::new(source))
    } else {
        debug!("stdin is not a terminal, reading lines without editing");
        Ok(Box::new(PipedSource::stdin(history)))
    }
}

/// Terminal line editor with prompt and history recall.
pub struct EditorSource {
    editor: DefaultEditor,
    prompt: String,
    history: HistoryStore,
}

impl EditorSource {
    /// Create the editor and preload the last `history_limit` entries.
    pub fn new(prompt: String, history: HistoryStore, history_limit: usize) -> RelayResult<Self> {
        let config = Config::builder()
            .max_history_size(history_limit)
            .map_err(|e| RelayError::LineReader(e.to_string()))?
            .auto_add_history(false)
            .build();
        let mut editor =
            DefaultEditor::with_config(config).map_err(|e| RelayError::LineReader(e.to_string()))?;

        match history.load(history_limit) {
            Ok(entries) => {
                for entry in entries {
                    // Only fails on a broken in-memory history.
                    let _ = editor.add_history_entry(entry);
                }
            }
            Err(e) => warn!(error = %e, "history not loaded"),
        }

        Ok(Self {
            editor,
            prompt,
            history,
        })
    }
}

impl LineSource for EditorSource {
    fn next_line(&mut self) -> Result<LineEvent, ReadError> {
        match self.editor.readline(&self.prompt) {
            Ok(line) => Ok(LineEvent::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(LineEvent::Interrupted),
            Err(ReadlineError::Eof) => Ok(LineEvent::EndOfInput),
            Err(e) => Err(ReadError(e.to_string())),
        }
    }

    fn remember(&mut self, line: &str) -> Result<(), HistoryError> {
        if !line.trim().is_empty() {
            let _ = self.editor.add_history_entry(line);
        }
        self.history.append(line)
    }
}

/// Plain line reader for non-interactive input.
pub struct PipedSource<R> {
    reader: R,
    history: HistoryStore,
    buf: String,
}

impl PipedSource<BufReader<Stdin>> {
    pub fn stdin(history: HistoryStore) -> Self {
        Self::new(BufReader::new(io::stdin()), history)
    }
}

impl<R: BufRead + Send> PipedSource<R> {
    pub fn new(reader: R, history: HistoryStore) -> Self {
        Self {
            reader,
            history,
            buf: String::new(),
        }
    }
}

impl<R: BufRead + Send> LineSource for PipedSource<R> {
    fn next_line(&mut self) -> Result<LineEvent, ReadError> {
        self.buf.clear();
        let n = self
            .reader
            .read_line(&mut self.buf)
            .map_err(|e| ReadError(e.to_string()))?;
        if n == 0 {
            return Ok(LineEvent::EndOfInput);
        }

        let line = self
            .buf
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(self.buf.as_str());
        Ok(LineEvent::Line(line.to_string()))
    }

    fn remember(&mut self, line: &str) -> Result<(), HistoryError> {
        self.history.append(line)
    }
}
