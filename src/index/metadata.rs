//! Element header parsing.
//!
//! Indexers read only a bounded prefix of each element file and pull the
//! header fields out of it. A header that fails to parse degrades to
//! filename-derived metadata; the entry is never dropped.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{IndexError, Result};

/// Upper bound on bytes read from an element file for its header.
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Version assigned when a header carries none.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// File extensions recognized as element files.
pub const ELEMENT_EXTENSIONS: [&str; 4] = ["md", "markdown", "yaml", "yml"];

/// Header fields of one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHeader {
    pub name: String,
    pub version: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub triggers: Vec<String>,
    pub tags: Vec<String>,
    /// Declared modification time, if the header has one
    pub updated: Option<DateTime<Utc>>,
}

impl ElementHeader {
    /// Metadata derived from a file name alone.
    #[must_use]
    pub fn from_file_name(file_name: &str) -> Self {
        Self {
            name: name_from_file(file_name),
            version: DEFAULT_VERSION.to_string(),
            author: None,
            description: None,
            triggers: Vec::new(),
            tags: Vec::new(),
            updated: None,
        }
    }
}

/// Parses a byte prefix of an element file into an [`ElementHeader`].
pub trait MetadataReader: Send + Sync {
    /// # Errors
    ///
    /// Returns [`IndexError::ParseFailure`] when no header can be read.
    fn read_header(&self, bytes: &[u8], file_name: &str) -> Result<ElementHeader>;
}

/// Reads a YAML block delimited by `---` lines at the top of the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontMatterReader;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHeader {
    name: Option<String>,
    version: Option<serde_yaml::Value>,
    author: Option<String>,
    description: Option<String>,
    #[serde(alias = "trigger_verbs", alias = "triggerVerbs")]
    triggers: Option<StringList>,
    #[serde(alias = "keywords")]
    tags: Option<StringList>,
    #[serde(alias = "modified", alias = "updated_at", alias = "last_modified")]
    updated: Option<String>,
}

/// Lists may be written as YAML sequences or comma-separated strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringList {
    List(Vec<String>),
    Csv(String),
}

impl StringList {
    fn into_normalized(self) -> Vec<String> {
        let items = match self {
            Self::List(items) => items,
            Self::Csv(raw) => raw.split(',').map(str::to_string).collect(),
        };
        let mut out: Vec<String> = items
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        out.dedup();
        out
    }
}

impl MetadataReader for FrontMatterReader {
    fn read_header(&self, bytes: &[u8], file_name: &str) -> Result<ElementHeader> {
        let prefix = &bytes[..bytes.len().min(MAX_HEADER_BYTES)];
        let text = String::from_utf8_lossy(prefix);
        let block = front_matter_block(&text).ok_or_else(|| IndexError::ParseFailure {
            path: file_name.to_string(),
            reason: "missing or unterminated front matter block".to_string(),
        })?;

        let raw: RawHeader =
            serde_yaml::from_str(block).map_err(|e| IndexError::ParseFailure {
                path: file_name.to_string(),
                reason: e.to_string(),
            })?;

        let fallback = ElementHeader::from_file_name(file_name);
        let name = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or(fallback.name);
        let version = raw
            .version
            .and_then(|v| match v {
                serde_yaml::Value::String(s) => Some(s),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(fallback.version);

        Ok(ElementHeader {
            name,
            version,
            author: raw.author.filter(|a| !a.trim().is_empty()),
            description: raw.description.filter(|d| !d.trim().is_empty()),
            triggers: raw.triggers.map(StringList::into_normalized).unwrap_or_default(),
            tags: raw.tags.map(StringList::into_normalized).unwrap_or_default(),
            updated: raw.updated.as_deref().and_then(parse_timestamp),
        })
    }
}

/// Parse a header, falling back to filename metadata on failure.
///
/// The second element carries the parse failure, if any, so callers can
/// record it as a warning.
pub fn read_or_degrade(
    reader: &dyn MetadataReader,
    bytes: &[u8],
    file_name: &str,
) -> (ElementHeader, Option<IndexError>) {
    match reader.read_header(bytes, file_name) {
        Ok(header) => (header, None),
        Err(err) => (ElementHeader::from_file_name(file_name), Some(err)),
    }
}

/// Hex SHA-256 over the header prefix and the full file size.
#[must_use]
pub fn fingerprint(bytes: &[u8], size: u64) -> String {
    let prefix = &bytes[..bytes.len().min(MAX_HEADER_BYTES)];
    let mut hasher = Sha256::new();
    hasher.update(prefix);
    hasher.update(size.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a file name has a recognized element extension.
#[must_use]
pub fn is_element_file(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            ELEMENT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Kebab-case element name from a file name (`Code_Review.md` -> `code-review`).
#[must_use]
pub fn name_from_file(file_name: &str) -> String {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    let stem = std::path::Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(base);
    let mut name = String::with_capacity(stem.len());
    for ch in stem.trim().chars() {
        if ch.is_alphanumeric() {
            name.extend(ch.to_lowercase());
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }
    name.trim_matches('-').to_string()
}

fn front_matter_block(text: &str) -> Option<&str> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }
    let start = first.len();
    let mut offset = start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return Some(&text[start..offset]);
        }
        offset += line.len();
    }
    None
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}
