//! Relevance scoring, verb triggers and relationship edges.

pub mod relationships;
pub mod relevance;
pub mod tokens;
pub mod verbs;

pub use relationships::{RelatedElement, RelationshipGraph};
pub use relevance::{Relevance, RelevanceScorer, ScoringConfig, jaccard, shannon_entropy};
pub use tokens::{token_set, tokenize};
pub use verbs::VerbTriggerIndex;
