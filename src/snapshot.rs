use crate::session::{Lab, Professor, SessionState};
use crate::shared::atomic_write_file;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchSnapshot {
    #[serde(default)]
    pub professors: Vec<Professor>,
    #[serde(default)]
    pub labs: Vec<Lab>,
}

impl ResearchSnapshot {
    pub fn from_session(state: &SessionState) -> Self {
        Self {
            professors: state.professors.clone(),
            labs: state.labs.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.professors.is_empty() && self.labs.is_empty()
    }

    pub fn apply_to_session(&self, state: &mut SessionState) {
        if !self.professors.is_empty() {
            state.professors = self.professors.clone();
        }
        if !self.labs.is_empty() {
            state.labs = self.labs.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or corrupted snapshot files resolve to an empty snapshot.
    pub fn read(&self) -> ResearchSnapshot {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return ResearchSnapshot::default();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    pub fn write(&self, snapshot: &ResearchSnapshot) -> Result<(), SnapshotError> {
        let body = serde_json::to_vec_pretty(snapshot).map_err(SnapshotError::Encode)?;
        atomic_write_file(&self.path, &body).map_err(|e| SnapshotError::Write {
            path: self.path.display().to_string(),
            source: e,
        })
    }
}
