//! Per-file decompression and line streaming
//!
//! Each input file gets its own [`FileIngestor`], run on a blocking thread.
//! Lines are handed to the shared line channel with `blocking_send`, so a slow
//! parser stalls reading instead of buffering the whole file.
//!
//! File lifecycle: `Opened -> Streaming -> Completed | Aborted`. Failing to
//! open the file or to read a valid gzip header is fatal for the whole run and
//! never reaches `Aborted`.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Fatal ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("invalid gzip header in {}: {source}", path.display())]
    Decompress { path: PathBuf, source: io::Error },
}

impl IngestError {
    pub fn path(&self) -> &Path {
        match self {
            IngestError::Open { path, .. } | IngestError::Decompress { path, .. } => path,
        }
    }
}

/// Lifecycle of one input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Opened,
    Streaming,
    /// Read to a clean end of stream
    Completed,
    /// Stopped early; the file stays eligible for another run
    Aborted,
}

/// Result of ingesting one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    /// Non-empty lines handed to the line channel
    pub lines: u64,
    pub state: FileState,
    /// Where the file was renamed to, if it was marked complete
    pub marked_as: Option<PathBuf>,
}

/// Streams the lines of one gzip file
#[derive(Debug, Clone)]
pub struct FileIngestor {
    path: PathBuf,
    dry_run: bool,
    state: FileState,
}

impl FileIngestor {
    pub fn new(path: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            path: path.into(),
            dry_run,
            state: FileState::Opened,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file into `lines`. Blocking; call from a blocking thread.
    pub fn run(mut self, lines: mpsc::Sender<String>) -> Result<FileOutcome, IngestError> {
        info!(file = %self.path.display(), "Reading file");

        let reader = self.open()?;
        self.transition(FileState::Streaming);

        let (sent, mut clean) = self.stream(reader, &lines);
        // lines still buffered in a closed channel were never parsed
        if clean && lines.is_closed() {
            warn!(file = %self.path.display(), lines = sent, "Line channel closed before the file was consumed");
            clean = false;
        }
        // release our sender before the rename so the parser is not held up
        drop(lines);

        info!(file = %self.path.display(), lines = sent, "Processed lines");

        if !clean {
            self.transition(FileState::Aborted);
            return Ok(self.outcome(sent, None));
        }

        self.transition(FileState::Completed);
        let marked_as = if self.dry_run {
            debug!(file = %self.path.display(), "Dry run, leaving file in place");
            None
        } else {
            match mark_completed(&self.path) {
                Ok(marked) => Some(marked),
                Err(e) => {
                    error!(file = %self.path.display(), error = %e, "Failed to mark file as processed");
                    None
                },
            }
        };

        Ok(self.outcome(sent, marked_as))
    }

    fn open(&self) -> Result<BufReader<MultiGzDecoder<File>>, IngestError> {
        let file = File::open(&self.path).map_err(|source| IngestError::Open {
            path: self.path.clone(),
            source,
        })?;

        // the header is parsed eagerly; `None` here means it was missing or malformed
        let mut decoder = MultiGzDecoder::new(file);
        if decoder.header().is_none() {
            let source = match decoder.read(&mut [0u8; 1]) {
                Err(e) => e,
                Ok(_) => io::Error::new(io::ErrorKind::InvalidData, "missing gzip header"),
            };
            return Err(IngestError::Decompress {
                path: self.path.clone(),
                source,
            });
        }

        Ok(BufReader::new(decoder))
    }

    /// Returns the number of lines sent and whether the end of stream was reached.
    fn stream<R: BufRead>(&self, mut reader: R, lines: &mpsc::Sender<String>) -> (u64, bool) {
        let mut buf = Vec::new();
        let mut sent = 0u64;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return (sent, true),
                Ok(_) => {},
                Err(e) => {
                    error!(file = %self.path.display(), error = %e, lines = sent, "Error reading file, aborting");
                    return (sent, false);
                },
            }

            let line = String::from_utf8_lossy(&buf);
            if line.trim_end_matches(['\n', '\r']).is_empty() {
                continue;
            }

            if lines.blocking_send(line.into_owned()).is_err() {
                warn!(file = %self.path.display(), lines = sent, "Line channel closed, aborting");
                return (sent, false);
            }
            sent += 1;
        }
    }

    fn transition(&mut self, next: FileState) {
        debug!(file = %self.path.display(), from = ?self.state, to = ?next, "File state");
        self.state = next;
    }

    fn outcome(self, lines: u64, marked_as: Option<PathBuf>) -> FileOutcome {
        FileOutcome {
            path: self.path,
            lines,
            state: self.state,
            marked_as,
        }
    }
}

/// Rename `path` to `.<name>` in the same directory.
///
/// A file whose name already starts with a dot is left alone.
pub fn mark_completed(path: &Path) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;

    if name.to_string_lossy().starts_with('.') {
        return Ok(path.to_path_buf());
    }

    let mut marked_name = std::ffi::OsString::from(".");
    marked_name.push(name);
    let marked = path.with_file_name(marked_name);

    std::fs::rename(path, &marked)?;
    debug!(from = %path.display(), to = %marked.display(), "Marked file as processed");
    Ok(marked)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn gzip(content: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap()
    }

    fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn drain(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_clean_file_is_streamed_and_marked() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.tsv.gz", &gzip(b"idfa\t1\t1.0\t2.0\t1,2\n\ngaid\t2\t3.0\t4.0\t3\n"));
        let (tx, rx) = mpsc::channel(16);

        let outcome = FileIngestor::new(&path, false).run(tx).unwrap();

        assert_eq!(outcome.state, FileState::Completed);
        assert_eq!(outcome.lines, 2);
        assert_eq!(outcome.marked_as, Some(dir.path().join(".a.tsv.gz")));
        assert!(!path.exists());
        assert!(dir.path().join(".a.tsv.gz").exists());

        let lines = drain(rx);
        assert_eq!(lines, vec!["idfa\t1\t1.0\t2.0\t1,2\n", "gaid\t2\t3.0\t4.0\t3\n"]);
    }

    #[test]
    fn test_last_line_without_newline_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "b.tsv.gz", &gzip(b"idfa\t1\t1\t2\t1\nadid\t9\t1\t2\t"));
        let (tx, rx) = mpsc::channel(16);

        let outcome = FileIngestor::new(&path, false).run(tx).unwrap();

        assert_eq!(outcome.lines, 2);
        assert_eq!(drain(rx).last().map(String::as_str), Some("adid\t9\t1\t2\t"));
    }

    #[test]
    fn test_corrupt_stream_aborts_without_rename() {
        let dir = TempDir::new().unwrap();
        let content: String = (0..200).map(|i| format!("idfa\t{i}\t1.0\t2.0\t1,2,3\n")).collect();
        let mut bytes = gzip(content.as_bytes());
        // drop the crc/size trailer
        bytes.truncate(bytes.len() - 8);
        let path = write_file(&dir, "c.tsv.gz", &bytes);
        let (tx, _rx) = mpsc::channel(512);

        let outcome = FileIngestor::new(&path, false).run(tx).unwrap();

        assert_eq!(outcome.state, FileState::Aborted);
        assert_eq!(outcome.marked_as, None);
        assert!(path.exists());
    }

    #[test]
    fn test_invalid_header_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "d.tsv.gz", b"idfa\t1\t1.0\t2.0\t1\n");
        let (tx, _rx) = mpsc::channel(16);

        let err = FileIngestor::new(&path, false).run(tx).unwrap_err();

        assert!(matches!(err, IngestError::Decompress { .. }));
        assert_eq!(err.path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn test_empty_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "e.tsv.gz", b"");
        let (tx, _rx) = mpsc::channel(16);

        let err = FileIngestor::new(&path, false).run(tx).unwrap_err();
        assert!(matches!(err, IngestError::Decompress { .. }));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(16);

        let err = FileIngestor::new(dir.path().join("missing.tsv.gz"), false)
            .run(tx)
            .unwrap_err();
        assert!(matches!(err, IngestError::Open { .. }));
    }

    #[test]
    fn test_dry_run_leaves_file_in_place() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.tsv.gz", &gzip(b"idfa\t1\t1.0\t2.0\t1\n"));
        let (tx, rx) = mpsc::channel(16);

        let outcome = FileIngestor::new(&path, true).run(tx).unwrap();

        assert_eq!(outcome.state, FileState::Completed);
        assert_eq!(outcome.marked_as, None);
        assert!(path.exists());
        assert_eq!(drain(rx).len(), 1);
    }

    #[test]
    fn test_closed_channel_aborts_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "g.tsv.gz", &gzip(b"idfa\t1\t1.0\t2.0\t1\n"));
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        let outcome = FileIngestor::new(&path, false).run(tx).unwrap();

        assert_eq!(outcome.state, FileState::Aborted);
        assert_eq!(outcome.lines, 0);
        assert!(path.exists());
    }

    #[test]
    fn test_channel_closed_at_end_of_stream_keeps_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "i.tsv.gz", &gzip(b"\n\n"));
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        let outcome = FileIngestor::new(&path, false).run(tx).unwrap();

        assert_eq!(outcome.state, FileState::Aborted);
        assert_eq!(outcome.marked_as, None);
        assert!(path.exists());
    }

    #[test]
    fn test_mark_completed_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "h.tsv.gz", b"x");

        let marked = mark_completed(&path).unwrap();
        assert_eq!(marked, dir.path().join(".h.tsv.gz"));

        assert_eq!(mark_completed(&marked).unwrap(), marked);
        assert!(marked.exists());
    }
}
