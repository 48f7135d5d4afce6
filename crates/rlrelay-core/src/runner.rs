//! Child process lifecycle.
//!
//! The child gets a pipe for stdin, a pipe for stdout, and our own stderr.
//! Stdout is read by an async task and handed in chunks to a blocking writer
//! that owns the [`OutputSink`], so a slow destination never stalls a runtime
//! worker. The process is spawned
//! with kill-on-drop, so tearing the session down before [`RunningProcess::wait`]
//! terminates it.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RelayError, RelayResult};
use crate::sink::OutputSink;

/// Exit code reported when the session is torn down by a termination request.
pub const ABORTED_EXIT_CODE: i32 = 143;

/// How long `kill` waits for the output drain after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Output chunks in flight between the stdout reader and the sink writer.
const DRAIN_CHUNKS: usize = 16;

type Chunk = std::io::Result<Vec<u8>>;

/// Resolved termination result of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The child (or record session) finished with this code.
    Normal(i32),
    /// The child ended without a numeric code, e.g. killed by a signal.
    Unknown,
    /// The session was torn down before it could finish.
    Aborted(String),
}

impl ExitOutcome {
    /// Decode a platform exit status.
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitOutcome::Normal(code),
            None => {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    if let Some(signal) = status.signal() {
                        warn!(signal, "child terminated by signal, exit status unknown");
                    }
                }
                ExitOutcome::Unknown
            }
        }
    }

    /// The process exit code to report to the invoking shell.
    ///
    /// An unknown status maps to 0. This can make a signal-killed child look
    /// successful.
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Normal(code) => *code,
            ExitOutcome::Unknown => 0,
            ExitOutcome::Aborted(_) => ABORTED_EXIT_CODE,
        }
    }
}

/// A command to run, not yet started.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    name: String,
    args: Vec<String>,
}

/// Spawn failure. Carries the sink back so the caller can finalize it.
pub struct StartFailure {
    pub error: RelayError,
    pub sink: OutputSink,
}

/// A finished child together with the sink its output was drained into.
pub struct Finished {
    /// Exit outcome, or the first error hit while waiting or writing output.
    pub status: RelayResult<ExitOutcome>,
    pub sink: OutputSink,
}

type DrainHandle = JoinHandle<(OutputSink, RelayResult<u64>)>;

impl ProcessRunner {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Spawn the command with its stdout draining into `sink`.
    pub fn start(&self, sink: OutputSink) -> Result<RunningProcess, StartFailure> {
        debug!(command = %self.name, args = ?self.args, "spawning");

        let spawned = Command::new(&self.name)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                return Err(StartFailure {
                    error: RelayError::Spawn {
                        name: self.name.clone(),
                        source,
                    },
                    sink,
                })
            }
        };

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(StartFailure {
                    error: RelayError::Spawn {
                        name: self.name.clone(),
                        source: std::io::Error::other("child pipes unavailable"),
                    },
                    sink,
                })
            }
        };

        info!(command = %self.name, pid = ?child.id(), "child started");
        let (tx, rx) = mpsc::channel(DRAIN_CHUNKS);
        let reader = tokio::spawn(read_stdout(stdout, tx));
        let drain = tokio::task::spawn_blocking(move || write_output(rx, sink));

        Ok(RunningProcess {
            name: self.name.clone(),
            child,
            stdin: Some(stdin),
            reader,
            drain,
        })
    }
}

/// A started child process.
pub struct RunningProcess {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    reader: JoinHandle<()>,
    drain: DrainHandle,
}

impl RunningProcess {
    /// Write `line` plus a newline to the child's stdin.
    pub async fn feed(&mut self, line: &str) -> RelayResult<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            RelayError::Forward(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "child input already closed",
            ))
        })?;

        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        stdin.write_all(&data).await.map_err(RelayError::Forward)?;
        stdin.flush().await.map_err(RelayError::Forward)
    }

    /// Close the child's stdin, signaling end of input. Idempotent.
    pub fn close_input(&mut self) {
        if self.stdin.take().is_some() {
            debug!(command = %self.name, "child input closed");
        }
    }

    /// Whether the child has already terminated.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Resolve once the child has terminated. Cancel safe, so it can race
    /// other futures in `select!`; the status is kept for [`Self::wait`].
    pub async fn exited(&mut self) {
        // A wait error resolves too; `wait` reports it.
        let _ = self.child.wait().await;
    }

    /// Whether the child terminates within `grace`.
    pub async fn exits_within(&mut self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.exited()).await.is_ok()
    }

    /// Close input, wait for the child to exit and for its output to be fully
    /// drained, then hand the sink back.
    pub async fn wait(mut self) -> RelayResult<Finished> {
        self.close_input();

        let waited = self.child.wait().await;
        let (sink, drained) = join_drain(self.drain).await?;

        let status = match (waited, drained) {
            (Err(e), _) => Err(RelayError::Io(e)),
            (Ok(_), Err(e)) => Err(e),
            (Ok(status), Ok(bytes)) => {
                let outcome = ExitOutcome::from_status(status);
                info!(command = %self.name, code = ?status.code(), bytes, "child exited");
                Ok(outcome)
            }
        };

        Ok(Finished { status, sink })
    }

    /// Terminate the child and hand the sink back.
    pub async fn kill(mut self) -> RelayResult<OutputSink> {
        self.close_input();
        if !self.has_exited() {
            match self.child.kill().await {
                Ok(()) => info!(command = %self.name, "child killed"),
                Err(e) => warn!(command = %self.name, error = %e, "failed to kill child"),
            }
        }

        // A surviving grandchild can hold stdout open; stop reading then.
        if tokio::time::timeout(DRAIN_GRACE, &mut self.reader).await.is_err() {
            warn!(command = %self.name, "child output still open after kill, dropping the rest");
            self.reader.abort();
        }
        join_drain(self.drain).await.map(|(sink, _)| sink)
    }
}

async fn join_drain(drain: DrainHandle) -> RelayResult<(OutputSink, RelayResult<u64>)> {
    drain
        .await
        .map_err(|e| RelayError::Io(std::io::Error::other(format!("output drain failed: {e}"))))
}

/// Forward child stdout in chunks until EOF, a read error, or the writer
/// going away.
async fn read_stdout(mut stdout: ChildStdout, tx: mpsc::Sender<Chunk>) {
    let mut buf = vec![0u8; 8192];
    loop {
        let chunk = match stdout.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) => Err(e),
        };
        let failed = chunk.is_err();
        if tx.send(chunk).await.is_err() || failed {
            return;
        }
    }
}

/// Write chunks into the sink on a blocking thread until the reader is done.
///
/// After a sink write error the remaining chunks are received and discarded
/// so the child never blocks on a full stdout pipe.
fn write_output(
    mut rx: mpsc::Receiver<Chunk>,
    mut sink: OutputSink,
) -> (OutputSink, RelayResult<u64>) {
    let mut total = 0u64;
    let mut failed: Option<RelayError> = None;

    while let Some(chunk) = rx.blocking_recv() {
        match chunk {
            Ok(_) if failed.is_some() => {}
            Ok(bytes) => match sink.write(&bytes) {
                Ok(()) => total += bytes.len() as u64,
                Err(e) => {
                    warn!(error = ?e, "output write failed, discarding remaining child output");
                    failed = Some(e);
                }
            },
            Err(e) => {
                failed.get_or_insert(RelayError::Io(e));
            }
        }
    }

    match failed {
        Some(e) => (sink, Err(e)),
        None => (sink, Ok(total)),
    }
}
