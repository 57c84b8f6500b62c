//! Byte-blob storage under a results root.
//!
//! The engine only ever needs two capabilities from storage: make sure the
//! results root exists, and persist a named blob beneath it. [`FsStore`] is
//! the real implementation; [`MemoryStore`] keeps blobs in a map.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::{ReportError, Result};

/// Persists named byte blobs under a results root.
pub trait ArtifactStore: Send + Sync {
    /// Create the results root if missing. Idempotent.
    fn prepare(&self) -> Result<()>;

    /// Store `bytes` under `name`, replacing any previous blob.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FsStore
// ---------------------------------------------------------------------------

/// Filesystem-backed store rooted at a results directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for FsStore {
    fn prepare(&self) -> Result<()> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        builder
            .create(&self.root)
            .map_err(|source| ReportError::CreateResultsDir {
                path: self.root.clone(),
                source,
            })?;

        debug!(root = %self.root.display(), "results directory ready");
        Ok(())
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(name);

        let mut options = std::fs::OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let write = |path: &Path| -> std::io::Result<()> {
            let mut file = options.open(path)?;
            file.write_all(bytes)?;
            file.flush()
        };

        write(&path).map_err(|source| ReportError::WriteArtifact {
            path: path.clone(),
            source,
        })?;

        debug!(artifact = name, bytes = bytes.len(), "artifact written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store, mainly for tests and embedding hosts that forward
/// artifacts elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the blob stored under `name`.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Stored names in lexical order.
    pub fn names(&self) -> Vec<String> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl ArtifactStore for MemoryStore {
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
