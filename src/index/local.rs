//! Local filesystem portfolio.
//!
//! Layout: `<root>/<type_dir>/**/<name>.md`. Only the header prefix of
//! each file is read. The local index never expires on its own; the write
//! path invalidates it.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::{ElementType, IndexEntry, SourceKind, SourceRef};
use crate::error::Result;

use super::Snapshot;
use super::cache::{BuildOutput, CacheSettings, IndexBuilder, SourceCache};
use super::metadata::{
    FrontMatterReader, MAX_HEADER_BYTES, MetadataReader, fingerprint, is_element_file,
    read_or_degrade,
};

/// Maximum directory depth below a type directory.
const MAX_SCAN_DEPTH: usize = 4;

/// Builder that scans the local portfolio.
pub struct LocalScanner {
    root: PathBuf,
    reader: Arc<dyn MetadataReader>,
}

impl LocalScanner {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_reader(root, Arc::new(FrontMatterReader))
    }

    #[must_use]
    pub fn with_reader(root: impl Into<PathBuf>, reader: Arc<dyn MetadataReader>) -> Self {
        Self {
            root: root.into(),
            reader,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan(&self, element_type: ElementType) -> BuildOutput {
        let mut output = BuildOutput::new();
        let dir = self.root.join(element_type.dir_name());
        if !dir.is_dir() {
            debug!(path = %dir.display(), "Local type directory missing");
            return output;
        }

        let walker = WalkDir::new(&dir)
            .max_depth(MAX_SCAN_DEPTH)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_str()));

        for item in walker {
            let item = match item {
                Ok(item) => item,
                Err(err) => {
                    warn!(source = "local", element_type = %element_type, error = %err, "Skipping unreadable path");
                    output.warn(format!("unreadable path: {err}"));
                    continue;
                }
            };
            if !item.file_type().is_file() {
                continue;
            }
            let Some(file_name) = item.file_name().to_str() else {
                continue;
            };
            if !is_element_file(file_name) {
                continue;
            }

            match read_entry(self.reader.as_ref(), item.path(), element_type, &dir) {
                Ok((entry, degraded)) => {
                    if let Some(reason) = degraded {
                        output.warn(reason);
                    }
                    output.insert(entry);
                }
                Err(err) => {
                    warn!(
                        source = "local",
                        element_type = %element_type,
                        path = %item.path().display(),
                        error = %err,
                        "Skipping unreadable element file"
                    );
                    output.warn(format!("{}: {err}", item.path().display()));
                }
            }
        }
        output
    }
}

#[async_trait]
impl IndexBuilder for LocalScanner {
    fn source(&self) -> SourceKind {
        SourceKind::Local
    }

    fn ttl(&self) -> Option<Duration> {
        None
    }

    async fn build(
        &self,
        element_type: ElementType,
        _previous: Option<Arc<Snapshot>>,
    ) -> Result<BuildOutput> {
        Ok(self.scan(element_type))
    }
}

/// Local portfolio index.
pub type LocalIndex = SourceCache<LocalScanner>;

impl LocalIndex {
    /// Index over `<root>/<type_dir>` directories.
    #[must_use]
    pub fn open(root: impl Into<PathBuf>, settings: CacheSettings) -> Self {
        SourceCache::new(LocalScanner::new(root), settings)
    }
}

fn read_entry(
    reader: &dyn MetadataReader,
    path: &Path,
    element_type: ElementType,
    type_dir: &Path,
) -> Result<(IndexEntry, Option<String>)> {
    let file = File::open(path)?;
    let meta = file.metadata()?;
    let mut prefix = Vec::with_capacity(MAX_HEADER_BYTES.min(meta.len() as usize));
    file.take(MAX_HEADER_BYTES as u64).read_to_end(&mut prefix)?;

    let rel = path.strip_prefix(type_dir).unwrap_or(path);
    let rel_name = rel.to_string_lossy().replace('\\', "/");
    let (header, parse_error) = read_or_degrade(reader, &prefix, &rel_name);
    let degraded = parse_error.map(|err| {
        warn!(
            source = "local",
            element_type = %element_type,
            path = %path.display(),
            reason = %err,
            "Header unreadable; using filename metadata"
        );
        format!("degraded {}: {err}", path.display())
    });

    let last_modified = meta
        .modified()
        .ok()
        .map(DateTime::<Utc>::from)
        .or(header.updated)
        .unwrap_or_default();

    Ok((
        IndexEntry {
            name: header.name,
            element_type,
            version: header.version,
            author: header.author,
            description: header.description,
            last_modified,
            source: SourceKind::Local,
            source_ref: SourceRef::Path {
                path: path.to_string_lossy().into_owned(),
            },
            content_fingerprint: fingerprint(&prefix, meta.len()),
            triggers: header.triggers,
            tags: header.tags,
        },
        degraded,
    ))
}

fn is_hidden(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with('.'))
}
