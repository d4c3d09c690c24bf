//! Size-rotated file sink
//!
//! A minimal rotating writer for the `file` log format: when the active file
//! exceeds `max_bytes` it is renamed to `<name>.1` (replacing any previous
//! rotation) and a fresh file is started. Write failures are swallowed with
//! a debug diagnostic; logging must never fail the caller.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Rotating log file
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    file: Option<File>,
    written: u64,
}

impl RotatingFile {
    /// Default rotation threshold (10 MiB)
    pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

    /// Open (or create) the sink at `path`
    pub fn new<P: AsRef<Path>>(path: P, max_bytes: u64) -> Self {
        let path = path.as_ref().to_path_buf();
        let (file, written) = open_append(&path);
        Self { path, max_bytes, file, written }
    }

    /// Append one line, rotating first when over the threshold
    pub fn write_line(&mut self, line: &str) {
        if self.written >= self.max_bytes {
            self.rotate();
        }
        if self.file.is_none() {
            let (file, written) = open_append(&self.path);
            self.file = file;
            self.written = written;
        }
        if let Some(file) = self.file.as_mut() {
            match writeln!(file, "{line}") {
                Ok(()) => self.written += line.len() as u64 + 1,
                Err(e) => {
                    tracing::debug!(path = %self.path.display(), error = %e, "log write failed");
                    self.file = None;
                }
            }
        }
    }

    fn rotate(&mut self) {
        self.file = None;
        let rotated = self.path.with_extension("log.1");
        if let Err(e) = std::fs::rename(&self.path, &rotated) {
            tracing::debug!(path = %self.path.display(), error = %e, "log rotation failed");
        }
        let (file, written) = open_append(&self.path);
        self.file = file;
        self.written = written;
    }
}

fn open_append(path: &Path) -> (Option<File>, u64) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let written = file.metadata().map(|m| m.len()).unwrap_or(0);
            (Some(file), written)
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "log open failed");
            (None, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mystic.log");
        let mut sink = RotatingFile::new(&path, RotatingFile::DEFAULT_MAX_BYTES);
        sink.write_line("first");
        sink.write_line("second");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_rotates_over_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mystic.log");
        let mut sink = RotatingFile::new(&path, 16);
        sink.write_line("aaaaaaaaaaaaaaaaaaaa");
        sink.write_line("after-rotation");
        let rotated = path.with_extension("log.1");
        assert!(rotated.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "after-rotation\n");
    }
}
