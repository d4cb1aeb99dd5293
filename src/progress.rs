#![forbid(unsafe_code)]

//! Coarse progress reporting between the worker and the server.
//!
//! The worker writes a small JSON file at known stages; the server reads it
//! when a status request comes in. Writes go through a rename so a reader
//! never observes a half-written report.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name used for the report inside a job directory.
pub const PROGRESS_FILE: &str = "progress.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub progress: u8,
    pub message: String,
}

#[derive(Clone)]
pub struct ProgressWriter {
    path: PathBuf,
}

impl ProgressWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Progress failures are logged and swallowed: a download must never die
    /// because a status file could not be written.
    pub fn write(&self, progress: u8, message: &str) {
        let report = ProgressReport {
            progress: progress.min(100),
            message: message.to_string(),
        };

        if let Some(parent) = self.path.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            eprintln!("Warning: could not create progress dir: {err}");
            return;
        }

        let tmp_path = self.path.with_extension("tmp");
        match serde_json::to_vec(&report) {
            Ok(payload) => {
                if let Err(err) = fs::write(&tmp_path, payload) {
                    eprintln!("Warning: could not write progress file: {err}");
                    return;
                }
                if let Err(err) = fs::rename(&tmp_path, &self.path) {
                    eprintln!("Warning: could not finalize progress file: {err}");
                }
            }
            Err(err) => {
                eprintln!("Warning: could not serialize progress report: {err}");
            }
        }
    }
}

pub fn update_progress(progress: Option<&ProgressWriter>, percent: u8, message: &str) {
    if let Some(writer) = progress {
        writer.write(percent, message);
    }
}

pub fn write_progress_report(path: &Path, progress: u8, message: &str) {
    ProgressWriter::new(path.to_path_buf()).write(progress, message);
}

pub fn read_progress_report(path: &Path) -> Option<ProgressReport> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn progress_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        write_progress_report(&path, 42, "Downloading");

        let report = read_progress_report(&path).unwrap();
        assert_eq!(report.progress, 42);
        assert_eq!(report.message, "Downloading");
    }

    #[test]
    fn progress_is_clamped_to_100() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        write_progress_report(&path, 250, "Done");
        assert_eq!(read_progress_report(&path).unwrap().progress, 100);
    }

    #[test]
    fn writer_creates_missing_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("progress.json");
        ProgressWriter::new(path.clone()).write(10, "Queued");
        assert!(read_progress_report(&path).is_some());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        assert!(read_progress_report(&dir.path().join("absent.json")).is_none());
    }
}
