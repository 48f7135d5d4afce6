//! Shared helpers for session tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rlrelay_core::{HistoryError, HistoryStore, LineEvent, LineSource, ReadError, RelayConfig};

/// One scripted step of input.
pub enum Step {
    Line(&'static str),
    Interrupt,
    Fail(&'static str),
    /// Sleep, then continue with the next step.
    Pause(Duration),
    /// Sleep, then report end of input.
    Stall(Duration),
}

/// Line source that replays a fixed script, then reports end of input.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    history: HistoryStore,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            history: HistoryStore::disabled(),
        }
    }

    pub fn lines(lines: &[&'static str]) -> Self {
        Self::new(lines.iter().map(|&l| Step::Line(l)).collect())
    }

    pub fn with_history(mut self, path: impl Into<PathBuf>) -> Self {
        self.history = HistoryStore::new(Some(path.into()));
        self
    }

    pub fn boxed(self) -> Box<dyn LineSource> {
        Box::new(self)
    }
}

impl LineSource for ScriptedSource {
    fn next_line(&mut self) -> Result<LineEvent, ReadError> {
        loop {
            return match self.steps.pop_front() {
                None => Ok(LineEvent::EndOfInput),
                Some(Step::Line(line)) => Ok(LineEvent::Line(line.to_string())),
                Some(Step::Interrupt) => Ok(LineEvent::Interrupted),
                Some(Step::Fail(msg)) => Err(ReadError(msg.to_string())),
                Some(Step::Pause(d)) => {
                    std::thread::sleep(d);
                    continue;
                }
                Some(Step::Stall(d)) => {
                    std::thread::sleep(d);
                    Ok(LineEvent::EndOfInput)
                }
            };
        }
    }

    fn remember(&mut self, line: &str) -> Result<(), HistoryError> {
        self.history.append(line)
    }
}

/// Config writing to `path` with the given flags.
pub fn config_for(path: &Path, buffered: bool, temp: bool) -> RelayConfig {
    RelayConfig {
        output: Some(path.to_path_buf()),
        buffered,
        temp,
        ..Default::default()
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
