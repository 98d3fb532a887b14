//! Source priority policy.
//!
//! The order of sources decides which candidate is authoritative when the
//! same element lives in several places. Validation happens once, here, so
//! the rest of the crate can rely on a non-empty, duplicate-free order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

use super::element::SourceKind;

/// Declarative policy: ordered sources plus early-termination and
/// fallback flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcePriorityConfig {
    priority: Vec<SourceKind>,
    /// Stop at the first source with a hit
    pub stop_on_first: bool,
    /// Keep consulting lower-priority sources to report newer versions
    pub check_all_for_updates: bool,
    /// Log and skip a failing source instead of aborting the call
    pub fallback_on_error: bool,
}

impl SourcePriorityConfig {
    /// Validate and build a policy.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] if `priority` is empty or names
    /// a source more than once.
    pub fn new(
        priority: Vec<SourceKind>,
        stop_on_first: bool,
        check_all_for_updates: bool,
        fallback_on_error: bool,
    ) -> Result<Self> {
        validate_order(&priority)?;
        Ok(Self {
            priority,
            stop_on_first,
            check_all_for_updates,
            fallback_on_error,
        })
    }

    /// Parse an order from names such as `["local", "github"]`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] for unknown names or an
    /// invalid order.
    pub fn order_from_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<SourceKind>> {
        let order = names
            .iter()
            .map(|n| n.as_ref().parse::<SourceKind>())
            .collect::<Result<Vec<_>>>()?;
        validate_order(&order)?;
        Ok(order)
    }

    #[must_use]
    pub fn priority(&self) -> &[SourceKind] {
        &self.priority
    }

    /// Position of `source` in the order; unknown sources sort last.
    #[must_use]
    pub fn rank(&self, source: SourceKind) -> usize {
        self.priority
            .iter()
            .position(|s| *s == source)
            .unwrap_or(self.priority.len())
    }

    #[must_use]
    pub fn contains(&self, source: SourceKind) -> bool {
        self.priority.contains(&source)
    }

    /// Replace the order, keeping the flags.
    ///
    /// # Errors
    ///
    /// Same as [`SourcePriorityConfig::new`].
    pub fn with_priority(&self, priority: Vec<SourceKind>) -> Result<Self> {
        Self::new(
            priority,
            self.stop_on_first,
            self.check_all_for_updates,
            self.fallback_on_error,
        )
    }

    /// Sources allowed by `filter`, in configured order.
    #[must_use]
    pub fn enabled(&self, filter: Option<&[SourceKind]>) -> Vec<SourceKind> {
        self.priority
            .iter()
            .copied()
            .filter(|s| filter.is_none_or(|f| f.contains(s)))
            .collect()
    }
}

impl Default for SourcePriorityConfig {
    fn default() -> Self {
        Self {
            priority: SourceKind::ALL.to_vec(),
            stop_on_first: true,
            check_all_for_updates: false,
            fallback_on_error: true,
        }
    }
}

impl<'de> Deserialize<'de> for SourcePriorityConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            priority: Vec<SourceKind>,
            #[serde(default = "default_true")]
            stop_on_first: bool,
            #[serde(default)]
            check_all_for_updates: bool,
            #[serde(default = "default_true")]
            fallback_on_error: bool,
        }

        let raw = Raw::deserialize(deserializer)?;
        Self::new(
            raw.priority,
            raw.stop_on_first,
            raw.check_all_for_updates,
            raw.fallback_on_error,
        )
        .map_err(serde::de::Error::custom)
    }
}

const fn default_true() -> bool {
    true
}

fn validate_order(order: &[SourceKind]) -> Result<()> {
    if order.is_empty() {
        return Err(IndexError::Configuration(
            "source priority must list at least one source".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for source in order {
        if !seen.insert(*source) {
            return Err(IndexError::Configuration(format!(
                "source {source} appears more than once in priority order"
            )));
        }
    }
    Ok(())
}
