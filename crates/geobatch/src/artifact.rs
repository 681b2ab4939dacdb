//! On-disk storage for raw geocoding responses
//!
//! Each response is written verbatim to `<uuid-v4>.json` inside the output
//! directory. The file name carries no batch information, so the set of
//! artifacts in a directory is unordered.

use crate::error::{GeobatchError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Extension shared by every artifact file
pub const ARTIFACT_EXTENSION: &str = "json";

/// Extension for bodies of rejected requests; never aggregated
pub const REJECTED_EXTENSION: &str = "rejected";

/// Handle to one persisted response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Batch that produced this artifact; not recorded in the file itself
    pub batch_index: usize,
    pub bytes: usize,
}

/// Directory of persisted responses
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| GeobatchError::ArtifactWrite {
                path: self.dir.clone(),
                source,
            })
    }

    /// Write `body` under a fresh unique name.
    pub async fn persist(&self, batch_index: usize, body: &[u8]) -> Result<Artifact> {
        let path = self
            .dir
            .join(format!("{}.{}", Uuid::new_v4(), ARTIFACT_EXTENSION));

        tokio::fs::write(&path, body)
            .await
            .map_err(|source| GeobatchError::ArtifactWrite {
                path: path.clone(),
                source,
            })?;

        debug!(batch = batch_index, path = %path.display(), bytes = body.len(), "Persisted artifact");

        Ok(Artifact {
            path,
            batch_index,
            bytes: body.len(),
        })
    }

    /// Keep the body of a request the service rejected.
    ///
    /// Written as `<uuid-v4>.rejected` next to the artifacts so the
    /// response can be inspected after a failed run.
    pub async fn persist_rejected(&self, batch_index: usize, body: &[u8]) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{}.{}", Uuid::new_v4(), REJECTED_EXTENSION));

        tokio::fs::write(&path, body)
            .await
            .map_err(|source| GeobatchError::ArtifactWrite {
                path: path.clone(),
                source,
            })?;

        debug!(batch = batch_index, path = %path.display(), bytes = body.len(), "Kept rejected response");
        Ok(path)
    }

    /// List artifact files in directory-listing order.
    ///
    /// The order is whatever the filesystem returns. It does not correspond
    /// to batch order and is not sorted here.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let scan_err = |source| GeobatchError::ArtifactScan {
            path: self.dir.clone(),
            source,
        };

        let mut artifacts = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(scan_err)? {
            let entry = entry.map_err(scan_err)?;
            let path = entry.path();
            let is_artifact = path
                .extension()
                .is_some_and(|ext| ext == ARTIFACT_EXTENSION);
            if is_artifact && entry.file_type().map_err(scan_err)?.is_file() {
                artifacts.push(path);
            }
        }
        Ok(artifacts)
    }
}
