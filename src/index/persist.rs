//! Optional on-disk snapshots, one JSON file per source.
//!
//! Written at shutdown and read at startup so the first query after a
//! restart is not served from an empty cache. Whether a restored snapshot
//! counts as fresh is decided by the cache against its TTL.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::SourceKind;
use crate::error::Result;

use super::{Snapshot, SourceIndex};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSource {
    format: u32,
    source: SourceKind,
    saved_at: DateTime<Utc>,
    snapshots: Vec<Snapshot>,
}

/// Snapshot files under one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, source: SourceKind) -> PathBuf {
        self.dir.join(format!("{source}.json"))
    }

    /// Write `snapshots` for `source`, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns I/O or serialization errors.
    pub fn save(&self, source: SourceKind, snapshots: &[Arc<Snapshot>]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let payload = PersistedSource {
            format: FORMAT_VERSION,
            source,
            saved_at: Utc::now(),
            snapshots: snapshots.iter().map(|s| (**s).clone()).collect(),
        };
        let json = serde_json::to_vec_pretty(&payload)?;

        let path = self.path_for(source);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!(source = %source, path = %path.display(), snapshots = snapshots.len(), "Saved snapshots");
        Ok(())
    }

    /// Read persisted snapshots for `source`.
    ///
    /// Missing, corrupt or mismatched files yield an empty list; corrupt
    /// files are logged.
    #[must_use]
    pub fn load(&self, source: SourceKind) -> Vec<Snapshot> {
        let path = self.path_for(source);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(source = %source, path = %path.display(), error = %err, "Cannot read snapshot file");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<PersistedSource>(&raw) {
            Ok(persisted) if persisted.format == FORMAT_VERSION && persisted.source == source => {
                persisted
                    .snapshots
                    .into_iter()
                    .filter(|s| s.source == source)
                    .collect()
            }
            Ok(persisted) => {
                warn!(
                    source = %source,
                    format = persisted.format,
                    found = %persisted.source,
                    "Ignoring snapshot file with unexpected format or source"
                );
                Vec::new()
            }
            Err(err) => {
                warn!(source = %source, path = %path.display(), error = %err, "Ignoring corrupt snapshot file");
                Vec::new()
            }
        }
    }

    /// Save every good snapshot of `index`.
    ///
    /// # Errors
    ///
    /// Returns I/O or serialization errors.
    pub fn save_index(&self, index: &dyn SourceIndex) -> Result<usize> {
        let snapshots = index.snapshots();
        self.save(index.source(), &snapshots)?;
        Ok(snapshots.len())
    }

    /// Seed `index` from disk. Returns how many snapshots were restored.
    pub fn restore_index(&self, index: &dyn SourceIndex) -> usize {
        let snapshots = self.load(index.source());
        let count = snapshots.len();
        for snapshot in snapshots {
            index.restore(snapshot);
        }
        count
    }
}
