//! Output sink: where captured bytes go.
//!
//! A sink is opened once per session and consumed by [`OutputSink::finish`],
//! which either commits or discards what was written. Two independent axes
//! control its behavior:
//!
//! - [`Staging`]: write straight to the destination, or to a temp file in the
//!   same directory that is renamed over the destination on commit and
//!   deleted on discard.
//! - [`Buffering`]: batch writes, or flush after each one so the destination
//!   can be followed while the session runs.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{RelayError, RelayResult};

const TEMP_PREFIX: &str = ".rlrelay-";

/// Output destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
}

/// How the destination file is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staging {
    /// Open the destination immediately and write incrementally.
    Direct,
    /// Write to a temp file, rename into place only on commit.
    StagedTemp,
}

/// Whether writes are batched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buffering {
    Buffered,
    Unbuffered,
}

/// How to open a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOptions {
    pub destination: Destination,
    pub staging: Staging,
    pub buffering: Buffering,
}

enum Target {
    Stdout(io::Stdout),
    File(File),
    Staged { temp: NamedTempFile, dest: PathBuf },
}

impl Write for Target {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Target::Stdout(out) => out.write(buf),
            Target::File(file) => file.write(buf),
            Target::Staged { temp, .. } => temp.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Target::Stdout(out) => out.flush(),
            Target::File(file) => file.flush(),
            Target::Staged { temp, .. } => temp.flush(),
        }
    }
}

/// A writable, finalizable output destination.
pub struct OutputSink {
    writer: BufWriter<Target>,
    buffering: Buffering,
    written: u64,
}

impl OutputSink {
    /// Open the sink described by `opts`.
    ///
    /// For staged sinks nothing appears at the destination path until
    /// [`finish`](Self::finish) commits. Staging is ignored for stdout.
    pub fn open(opts: &SinkOptions) -> RelayResult<Self> {
        let target = match &opts.destination {
            Destination::Stdout => Target::Stdout(io::stdout()),
            Destination::File(path) => match opts.staging {
                Staging::Direct => {
                    let file = File::create(path).map_err(|source| RelayError::OpenSink {
                        path: path.clone(),
                        source,
                    })?;
                    Target::File(file)
                }
                Staging::StagedTemp => {
                    let temp = tempfile::Builder::new()
                        .prefix(TEMP_PREFIX)
                        .tempfile_in(parent_dir(path))
                        .map_err(|source| RelayError::OpenSink {
                            path: path.clone(),
                            source,
                        })?;
                    debug!(temp = %temp.path().display(), dest = %path.display(), "staging output");
                    Target::Staged {
                        temp,
                        dest: path.clone(),
                    }
                }
            },
        };

        debug!(destination = ?opts.destination, staging = ?opts.staging, buffering = ?opts.buffering, "output sink opened");
        Ok(Self {
            writer: BufWriter::new(target),
            buffering: opts.buffering,
            written: 0,
        })
    }

    /// Write raw bytes. Unbuffered sinks flush before returning.
    pub fn write(&mut self, bytes: &[u8]) -> RelayResult<()> {
        self.writer.write_all(bytes).map_err(RelayError::Sink)?;
        self.written += bytes.len() as u64;
        self.flush_if_unbuffered()
    }

    /// Write one line followed by a newline terminator.
    pub fn write_line(&mut self, line: &str) -> RelayResult<()> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .map_err(RelayError::Sink)?;
        self.written += line.len() as u64 + 1;
        self.flush_if_unbuffered()
    }

    /// Finalize the sink.
    ///
    /// With `commit = true` a staged temp file is atomically renamed over the
    /// destination; with `commit = false` it is deleted and the destination is
    /// left untouched. Direct and stdout sinks are flushed and closed either
    /// way, so partial output is kept.
    pub fn finish(self, commit: bool) -> RelayResult<()> {
        let written = self.written;
        let target = self
            .writer
            .into_inner()
            .map_err(|e| RelayError::Sink(e.into_error()))?;

        match target {
            Target::Stdout(_) | Target::File(_) => {
                debug!(bytes = written, "output closed");
                Ok(())
            }
            Target::Staged { temp, dest } if commit => {
                temp.as_file().sync_all().map_err(RelayError::Sink)?;
                temp.persist(&dest).map_err(|e| RelayError::Commit {
                    path: dest.clone(),
                    source: e.error,
                })?;
                info!(dest = %dest.display(), bytes = written, "output committed");
                Ok(())
            }
            Target::Staged { temp, dest } => {
                temp.close().map_err(RelayError::Io)?;
                info!(dest = %dest.display(), "staged output discarded");
                Ok(())
            }
        }
    }

    fn flush_if_unbuffered(&mut self) -> RelayResult<()> {
        if self.buffering == Buffering::Unbuffered {
            self.writer.flush().map_err(RelayError::Sink)?;
        }
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_opts(path: &Path, staging: Staging, buffering: Buffering) -> SinkOptions {
        SinkOptions {
            destination: Destination::File(path.to_path_buf()),
            staging,
            buffering,
        }
    }

    fn dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn direct_unbuffered_is_visible_before_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut sink =
            OutputSink::open(&file_opts(&path, Staging::Direct, Buffering::Unbuffered)).unwrap();

        sink.write_line("alpha").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "alpha\n");

        sink.write_line("beta").unwrap();
        sink.finish(true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "alpha\nbeta\n");
    }

    #[test]
    fn direct_buffered_lands_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut sink =
            OutputSink::open(&file_opts(&path, Staging::Direct, Buffering::Buffered)).unwrap();

        sink.write(b"raw bytes").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        sink.finish(true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "raw bytes");
    }

    #[test]
    fn direct_discard_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut sink =
            OutputSink::open(&file_opts(&path, Staging::Direct, Buffering::Buffered)).unwrap();
        sink.write_line("partial").unwrap();
        sink.finish(false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "partial\n");
    }

    #[test]
    fn staged_commit_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "old").unwrap();

        let mut sink =
            OutputSink::open(&file_opts(&path, Staging::StagedTemp, Buffering::Unbuffered))
                .unwrap();
        assert_eq!(dir_entries(dir.path()), 2);
        sink.write_line("new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");

        sink.finish(true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(dir_entries(dir.path()), 1);
    }

    #[test]
    fn staged_discard_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let mut sink =
            OutputSink::open(&file_opts(&path, Staging::StagedTemp, Buffering::Buffered)).unwrap();
        sink.write_line("doomed").unwrap();
        sink.finish(false).unwrap();

        assert!(!path.exists());
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[test]
    fn staged_drop_without_finish_discards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        {
            let mut sink =
                OutputSink::open(&file_opts(&path, Staging::StagedTemp, Buffering::Buffered))
                    .unwrap();
            sink.write_line("dropped").unwrap();
        }
        assert!(!path.exists());
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[test]
    fn open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.txt");
        for staging in [Staging::Direct, Staging::StagedTemp] {
            let err = OutputSink::open(&file_opts(&path, staging, Buffering::Buffered))
                .err()
                .unwrap();
            assert!(matches!(err, RelayError::OpenSink { .. }));
        }
    }

    #[test]
    fn parent_dir_of_bare_name_is_cwd() {
        assert_eq!(parent_dir(Path::new("out.txt")), Path::new("."));
        assert_eq!(parent_dir(Path::new("/tmp/out.txt")), Path::new("/tmp"));
    }
}
