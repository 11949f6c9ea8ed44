//! The export manifest: one JSON record per run.

use casedesk_api::{CaseFilter, CaseId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::task::{TaskError, TaskStage};

pub const MANIFEST_FILE: &str = "export-manifest.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// A successfully exported case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub case_id: CaseId,
    pub summary: String,
    /// Output path relative to the export directory.
    pub file: String,
    pub attachment_count: usize,
    pub attachments_downloaded: usize,
    /// Comments or attachments could not be fetched for this case.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

/// A case that did not export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFailure {
    pub case_id: CaseId,
    pub stage: TaskStage,
    pub error: String,
}

impl ManifestFailure {
    pub fn new(case_id: CaseId, error: &TaskError) -> Self {
        Self {
            case_id,
            stage: error.stage(),
            error: error.to_string(),
        }
    }
}

/// Summary of one export run.
///
/// `cases.len() + failures.len() == total_cases` once the run is over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub exported_at: DateTime<Utc>,
    pub total_cases: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters_applied: Option<CaseFilter>,
    pub cases: Vec<ManifestEntry>,
    #[serde(default)]
    pub failures: Vec<ManifestFailure>,
}

impl Manifest {
    pub fn new(total_cases: usize, filters_applied: Option<CaseFilter>) -> Self {
        Self {
            exported_at: Utc::now(),
            total_cases,
            filters_applied,
            cases: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, entry: ManifestEntry) {
        self.cases.push(entry);
    }

    pub fn record_failure(&mut self, case_id: CaseId, error: &TaskError) {
        self.failures.push(ManifestFailure::new(case_id, error));
    }

    pub fn is_complete(&self) -> bool {
        self.cases.len() + self.failures.len() == self.total_cases
    }

    /// Ids of the exported cases, in manifest order.
    pub fn case_ids(&self) -> Vec<CaseId> {
        self.cases.iter().map(|entry| entry.case_id.clone()).collect()
    }

    pub fn find_case(&self, id: &CaseId) -> Option<&ManifestEntry> {
        self.cases.iter().find(|entry| &entry.case_id == id)
    }

    /// Write `<dir>/export-manifest.json`, replacing any previous one.
    ///
    /// The file is written to a temporary sibling and renamed into place,
    /// so a reader sees either the old manifest or the new one.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        let io_err = |source| ManifestError::Io {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&content)?)
    }
}
