//! Session controller.
//!
//! Drives one pass over a [`LineSource`]:
//!
//! ```text
//! Idle -> Reading -> Relaying | Forwarding -> Finalizing -> Done
//! ```
//!
//! In record mode each accepted line goes to the output sink. In execute
//! mode it goes to the child's stdin while the child's stdout drains into the
//! sink. The sink is finalized exactly once on every exit path: committed
//! after a clean end, discarded (staged) or kept as-is (direct) after a
//! failure or termination request.

use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{ReadError, RelayError, RelayResult};
use crate::line_source::{LineEvent, LineSource};
use crate::runner::{ExitOutcome, ProcessRunner, RunningProcess};
use crate::sink::OutputSink;

/// How long a broken pipe waits for the child to be reaped before it counts
/// as a forwarding error.
const EXIT_GRACE: Duration = Duration::from_millis(100);

/// Which personality the session runs as.
#[derive(Debug, Clone)]
pub enum SessionMode {
    /// Lines go straight to the output sink.
    Record,
    /// Lines go to this command's stdin; its stdout goes to the sink.
    Execute(ProcessRunner),
}

/// Why the read loop stopped.
#[derive(Debug)]
enum LoopExit {
    EndOfInput,
    ChildExited,
    Cancelled,
    Failed(RelayError),
}

/// Where accepted lines are forwarded.
enum Target {
    Sink(OutputSink),
    Child(RunningProcess),
}

impl Target {
    async fn forward(&mut self, line: &str) -> RelayResult<()> {
        match self {
            Target::Sink(sink) => sink.write_line(line),
            Target::Child(child) => child.feed(line).await,
        }
    }

    /// Resolve when the child terminates. Never resolves in record mode.
    async fn child_exit(&mut self) {
        match self {
            Target::Sink(_) => std::future::pending::<()>().await,
            Target::Child(child) => child.exited().await,
        }
    }

    /// Whether a forwarding error only means the child is already gone.
    async fn lost_to_exit(&mut self, error: &RelayError) -> bool {
        match (self, error) {
            (Target::Child(child), RelayError::Forward(e))
                if e.kind() == ErrorKind::BrokenPipe =>
            {
                child.exits_within(EXIT_GRACE).await
            }
            _ => false,
        }
    }
}

/// Hands the blocking line source to the blocking pool for each read and
/// takes it back afterwards. History for the previous line is written on the
/// same trip, off the async worker.
struct Reader {
    source: Option<Box<dyn LineSource>>,
    pending: Option<String>,
}

impl Reader {
    fn new(source: Box<dyn LineSource>) -> Self {
        Self {
            source: Some(source),
            pending: None,
        }
    }

    fn remember(&mut self, line: String) {
        self.pending = Some(line);
    }

    /// Save a line still waiting for its history write.
    fn flush_history(&mut self) {
        if let (Some(source), Some(line)) = (self.source.as_mut(), self.pending.take()) {
            if let Err(e) = source.remember(&line) {
                warn!(error = %e, "failed to save history");
            }
        }
    }

    async fn next(&mut self) -> Result<LineEvent, ReadError> {
        let Some(mut source) = self.source.take() else {
            return Ok(LineEvent::EndOfInput);
        };
        let pending = self.pending.take();

        let joined = tokio::task::spawn_blocking(move || {
            if let Some(line) = pending {
                if let Err(e) = source.remember(&line) {
                    warn!(error = %e, "failed to save history");
                }
            }
            let event = source.next_line();
            (source, event)
        })
        .await;

        match joined {
            Ok((source, event)) => {
                self.source = Some(source);
                event
            }
            Err(e) => Err(ReadError(format!("line reader task failed: {e}"))),
        }
    }
}

/// One run of the relay engine.
pub struct Session<'a> {
    config: &'a RelayConfig,
    mode: SessionMode,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a RelayConfig, mode: SessionMode) -> Self {
        Self { config, mode }
    }

    /// Run the session to completion.
    ///
    /// `shutdown` resolves on an external termination request; the child is
    /// then killed and the outcome is [`ExitOutcome::Aborted`].
    ///
    /// Setup errors (sink cannot be opened, child cannot be spawned) and
    /// forwarding errors are returned as `Err` after the sink is finalized.
    pub async fn run<F>(
        self,
        source: Box<dyn LineSource>,
        shutdown: F,
    ) -> RelayResult<ExitOutcome>
    where
        F: Future<Output = ()>,
    {
        let sink = OutputSink::open(&self.config.sink_options())?;

        let mut target = match &self.mode {
            SessionMode::Record => {
                info!(destination = ?self.config.destination(), "recording");
                Target::Sink(sink)
            }
            SessionMode::Execute(runner) => match runner.start(sink) {
                Ok(child) => Target::Child(child),
                Err(failure) => {
                    finalize(failure.sink, false);
                    return Err(failure.error);
                }
            },
        };

        tokio::pin!(shutdown);
        let mut reader = Reader::new(source);
        let exit = pump(&mut reader, &mut target, &mut shutdown).await;
        reader.flush_history();
        debug!(?exit, "read loop finished");

        match target {
            Target::Sink(sink) => match exit {
                LoopExit::EndOfInput | LoopExit::ChildExited => {
                    sink.finish(true)?;
                    Ok(ExitOutcome::Normal(0))
                }
                LoopExit::Cancelled => {
                    finalize(sink, false);
                    Ok(ExitOutcome::Aborted("terminated".into()))
                }
                LoopExit::Failed(e) => {
                    finalize(sink, false);
                    Err(e)
                }
            },
            Target::Child(child) => match exit {
                LoopExit::EndOfInput | LoopExit::ChildExited => {
                    let finished = child.wait().await?;
                    match finished.status {
                        Ok(outcome) => {
                            finished.sink.finish(true)?;
                            Ok(outcome)
                        }
                        Err(e) => {
                            finalize(finished.sink, false);
                            Err(e)
                        }
                    }
                }
                LoopExit::Cancelled => {
                    stop(child).await;
                    Ok(ExitOutcome::Aborted("terminated".into()))
                }
                LoopExit::Failed(e) => {
                    stop(child).await;
                    Err(e)
                }
            },
        }
    }
}

/// The read/forward loop shared by both modes.
async fn pump<F>(
    reader: &mut Reader,
    target: &mut Target,
    shutdown: &mut std::pin::Pin<&mut F>,
) -> LoopExit
where
    F: Future<Output = ()>,
{
    loop {
        let event = tokio::select! {
            event = reader.next() => event,
            () = target.child_exit() => {
                debug!("child exited while waiting for input");
                break LoopExit::ChildExited;
            }
            () = shutdown.as_mut() => break LoopExit::Cancelled,
        };

        let line = match event {
            Ok(LineEvent::Line(line)) => line,
            Ok(LineEvent::Interrupted) => {
                debug!("interrupted, awaiting next line");
                continue;
            }
            Ok(LineEvent::EndOfInput) => break LoopExit::EndOfInput,
            Err(e) => {
                info!(error = %e, "ending input");
                break LoopExit::EndOfInput;
            }
        };

        if let Target::Child(child) = target {
            if child.has_exited() {
                debug!("child exited before end of input");
                break LoopExit::ChildExited;
            }
        }

        let forwarded = tokio::select! {
            result = target.forward(&line) => result,
            () = shutdown.as_mut() => break LoopExit::Cancelled,
        };
        let error = match forwarded {
            Ok(()) => {
                reader.remember(line);
                continue;
            }
            Err(e) => e,
        };
        if target.lost_to_exit(&error).await {
            debug!("child exited while a line was being forwarded");
            break LoopExit::ChildExited;
        }
        break LoopExit::Failed(error);
    }
}

/// Kill the child and discard or keep its output like any failure path.
async fn stop(child: RunningProcess) {
    match child.kill().await {
        Ok(sink) => finalize(sink, false),
        Err(e) => warn!(error = ?e, "output lost while stopping child"),
    }
}

/// Finalize a sink on a failure path, where a finalize error must not mask
/// the original one.
fn finalize(sink: OutputSink, commit: bool) {
    if let Err(e) = sink.finish(commit) {
        warn!(error = ?e, "failed to finalize output");
    }
}
