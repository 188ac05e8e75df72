use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::persistence::domain::image_writer::ImageWriter;
use crate::shared::constants::{SNAPSHOT_PREFIX, SNAPSHOT_TIMESTAMP_FORMAT};
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to save snapshot {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// A snapshot written to disk.
#[derive(Clone, Debug, PartialEq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub region_count: usize,
}

/// Result of honouring a save request.
#[derive(Clone, Debug, PartialEq)]
pub enum SaveOutcome {
    Saved(SavedArtifact),
    /// No face in the frame, so nothing was written.
    NothingSaved,
}

pub type Clock = Box<dyn Fn() -> DateTime<Local> + Send>;

/// Names and writes annotated snapshots under one output directory.
///
/// Files are called `face_detected_<YYYYMMDD_HHMMSS>.<ext>`. When that
/// name is taken (on disk, or earlier in this run) a `_<n>` suffix is
/// appended, so two saves within the same second never overwrite.
pub struct SnapshotStore {
    output_dir: PathBuf,
    extension: String,
    writer: Box<dyn ImageWriter>,
    clock: Clock,
    issued: HashSet<PathBuf>,
}

impl SnapshotStore {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        writer: Box<dyn ImageWriter>,
    ) -> Self {
        Self::with_clock(output_dir, extension, writer, Box::new(Local::now))
    }

    pub fn with_clock(
        output_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        writer: Box<dyn ImageWriter>,
        clock: Clock,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            writer,
            clock,
            issued: HashSet::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes `frame` if it shows at least one face.
    ///
    /// The output directory is created on first use (by the writer).
    pub fn save(&mut self, frame: &Frame, region_count: usize) -> Result<SaveOutcome, PersistError> {
        if region_count == 0 {
            return Ok(SaveOutcome::NothingSaved);
        }

        let path = self.next_path();
        self.writer
            .write(&path, frame)
            .map_err(|e| PersistError::Write {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        self.issued.insert(path.clone());

        Ok(SaveOutcome::Saved(SavedArtifact { path, region_count }))
    }

    fn next_path(&self) -> PathBuf {
        let stamp = (self.clock)().format(SNAPSHOT_TIMESTAMP_FORMAT).to_string();
        let base = format!("{SNAPSHOT_PREFIX}{stamp}");

        let candidate = self.output_dir.join(format!("{base}.{}", self.extension));
        if !self.is_taken(&candidate) {
            return candidate;
        }
        (1..)
            .map(|n| self.output_dir.join(format!("{base}_{n}.{}", self.extension)))
            .find(|p| !self.is_taken(p))
            .unwrap_or(candidate)
    }

    fn is_taken(&self, path: &Path) -> bool {
        self.issued.contains(path) || path.exists()
    }
}
