//! Element and entry types shared by every source.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

use super::version::compare_versions;

// =============================================================================
// ELEMENT TYPE
// =============================================================================

/// Kind of indexed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// Behavioral profiles
    Persona,
    /// Capabilities
    Skill,
    /// Document templates
    Template,
    /// Autonomous task definitions
    Agent,
}

impl ElementType {
    /// Every element type, in canonical order.
    pub const ALL: [Self; 4] = [Self::Persona, Self::Skill, Self::Template, Self::Agent];

    /// Directory name used by the local portfolio, the GitHub portfolio
    /// and the collection manifest.
    #[must_use]
    pub const fn dir_name(&self) -> &'static str {
        match self {
            Self::Persona => "personas",
            Self::Skill => "skills",
            Self::Template => "templates",
            Self::Agent => "agents",
        }
    }

    /// Map a portfolio directory name back to its element type.
    #[must_use]
    pub fn from_dir_name(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.dir_name() == dir)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Persona => "persona",
            Self::Skill => "skill",
            Self::Template => "template",
            Self::Agent => "agent",
        };
        f.write_str(label)
    }
}

impl FromStr for ElementType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "persona" | "personas" => Ok(Self::Persona),
            "skill" | "skills" => Ok(Self::Skill),
            "template" | "templates" => Ok(Self::Template),
            "agent" | "agents" => Ok(Self::Agent),
            other => Err(IndexError::Configuration(format!(
                "unknown element type: {other} (expected persona, skill, template, agent)"
            ))),
        }
    }
}

// =============================================================================
// SOURCE KIND
// =============================================================================

/// One of the three disjoint element locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Local filesystem portfolio
    Local,
    /// User-owned remote repository
    #[serde(rename = "github")]
    GitHub,
    /// Shared community catalog
    Collection,
}

impl SourceKind {
    /// Every source, in default priority order.
    pub const ALL: [Self; 3] = [Self::Local, Self::GitHub, Self::Collection];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::GitHub => "github",
            Self::Collection => "collection",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "github" | "portfolio" => Ok(Self::GitHub),
            "collection" | "community" => Ok(Self::Collection),
            other => Err(IndexError::Configuration(format!(
                "unknown source: {other} (expected local, github, collection)"
            ))),
        }
    }
}

// =============================================================================
// INDEX ENTRY
// =============================================================================

/// One element as seen from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Unique within source + element type
    pub name: String,
    pub element_type: ElementType,
    /// Free-form, semver-like
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub source: SourceKind,
    /// Local path, remote path + URL, or catalog path
    pub source_ref: SourceRef,
    /// Opaque change-detection hash
    pub content_fingerprint: String,
    /// Action verbs that activate this element
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl IndexEntry {
    /// Identity of the logical element across sources.
    #[must_use]
    pub fn key(&self) -> ElementKey {
        ElementKey::new(&self.name, self.element_type)
    }
}

/// Where a source found an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    Path { path: String },
    Remote { path: String, sha: String, url: String },
    Catalog { path: String },
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path { path } => write!(f, "{path}"),
            Self::Remote { url, .. } => write!(f, "{url}"),
            Self::Catalog { path } => write!(f, "collection:{path}"),
        }
    }
}

/// `(name, element_type)` identity of a logical element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementKey {
    pub name: String,
    pub element_type: ElementType,
}

impl ElementKey {
    #[must_use]
    pub fn new(name: &str, element_type: ElementType) -> Self {
        Self {
            name: name.to_string(),
            element_type,
        }
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.element_type, self.name)
    }
}

// =============================================================================
// UNIFIED ENTRY
// =============================================================================

/// Merged view of one logical element, possibly spanning sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEntry {
    pub name: String,
    pub element_type: ElementType,
    /// One entry per matching source, highest priority first. Never empty.
    pub candidates: Vec<IndexEntry>,
    /// Highest version across candidates regardless of priority
    pub best_version: String,
    /// Present only for free-text search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl UnifiedEntry {
    /// Build from candidates already ordered by priority.
    ///
    /// Returns `None` for an empty candidate list.
    #[must_use]
    pub fn from_candidates(candidates: Vec<IndexEntry>) -> Option<Self> {
        let first = candidates.first()?;
        let name = first.name.clone();
        let element_type = first.element_type;
        let best_version = candidates
            .iter()
            .map(|c| c.version.as_str())
            .max_by(|a, b| compare_versions(a, b))
            .unwrap_or_default()
            .to_string();
        Some(Self {
            name,
            element_type,
            candidates,
            best_version,
            score: None,
        })
    }

    /// The authoritative (highest-priority) candidate.
    #[must_use]
    pub fn primary(&self) -> &IndexEntry {
        &self.candidates[0]
    }

    #[must_use]
    pub fn key(&self) -> ElementKey {
        ElementKey::new(&self.name, self.element_type)
    }

    /// Sources holding this element, in priority order.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceKind> {
        self.candidates.iter().map(|c| c.source).collect()
    }
}

#[cfg(test)]
pub(crate) fn sample_entry(name: &str, source: SourceKind, version: &str) -> IndexEntry {
    IndexEntry {
        name: name.to_string(),
        element_type: ElementType::Skill,
        version: version.to_string(),
        author: None,
        description: None,
        last_modified: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        source,
        source_ref: SourceRef::Path {
            path: format!("skills/{name}.md"),
        },
        content_fingerprint: format!("{name}-{version}"),
        triggers: Vec::new(),
        tags: Vec::new(),
    }
}
