use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::core::{SourceKind, UnifiedEntry};
use crate::error::{IndexError, Result, StructuredError};
use crate::index::CacheState;

#[derive(Serialize)]
pub struct MachineResponse<T> {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Print `data` as one JSON envelope on stdout.
///
/// # Errors
///
/// Returns serialization errors.
pub fn emit_json<T: Serialize>(data: T, warnings: Vec<String>) -> Result<()> {
    let response = MachineResponse {
        status: "ok",
        timestamp: Utc::now(),
        version: crate::VERSION,
        data,
        warnings,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// JSON error envelope for machine mode.
#[must_use]
pub fn error_json(err: &IndexError) -> String {
    let structured = StructuredError::from(err);
    let value = serde_json::json!({
        "status": "error",
        "error": structured,
    });
    serde_json::to_string(&value).unwrap_or_default()
}

pub fn source_label(source: SourceKind) -> String {
    match source {
        SourceKind::Local => "local".green().to_string(),
        SourceKind::GitHub => "github".cyan().to_string(),
        SourceKind::Collection => "collection".magenta().to_string(),
    }
}

pub fn state_label(state: CacheState) -> String {
    let text = state.to_string();
    match state {
        CacheState::Fresh => text.green().to_string(),
        CacheState::Stale | CacheState::Building => text.yellow().to_string(),
        CacheState::Invalidated | CacheState::Empty => text.red().to_string(),
    }
}

/// One result line: name, type, version, sources, optional score.
pub fn entry_line(entry: &UnifiedEntry) -> String {
    let primary = entry.primary();
    let sources = entry
        .sources()
        .into_iter()
        .map(source_label)
        .collect::<Vec<_>>()
        .join(", ");
    let mut line = format!(
        "{} {} {} [{}]",
        entry.name.bold(),
        format!("({})", entry.element_type).dimmed(),
        format!("v{}", primary.version),
        sources
    );
    if entry.best_version != primary.version {
        line.push_str(&format!(" {}", format!("best v{}", entry.best_version).yellow()));
    }
    if let Some(score) = entry.score {
        line.push_str(&format!(" {}", format!("{score:.3}").dimmed()));
    }
    line
}
