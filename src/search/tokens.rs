//! Tokenization shared by matching, scoring and relationship edges.

use std::collections::BTreeSet;

use crate::core::IndexEntry;

/// Lower-cased, punctuation-stripped tokens in text order.
///
/// Splits on anything that is not alphanumeric, so `debug-helper` yields
/// `["debug", "helper"]`.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Distinct tokens of `text`.
#[must_use]
pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Token set over an entry's name, description, triggers and tags.
#[must_use]
pub fn entry_tokens(entry: &IndexEntry) -> BTreeSet<String> {
    let mut tokens = token_set(&entry.name);
    if let Some(description) = &entry.description {
        tokens.extend(tokenize(description));
    }
    for word in entry.triggers.iter().chain(entry.tags.iter()) {
        tokens.extend(tokenize(word));
    }
    tokens
}

/// Tokens of the description only, with repeats, for entropy.
#[must_use]
pub fn description_tokens(entry: &IndexEntry) -> Vec<String> {
    entry
        .description
        .as_deref()
        .map(tokenize)
        .unwrap_or_default()
}

/// Reduce a verb to a matching key so inflected forms meet their base:
/// `reviewing`, `reviewed` and `reviews` give `review`; `writes`, `writing`
/// and `write` give `writ`; `debugging` gives `debug`.
///
/// Keys are only compared with other keys, never shown.
#[must_use]
pub fn stem(word: &str) -> String {
    let word = word.to_lowercase();
    let mut base = strip_inflection(&word).to_string();

    if base.len() < word.len() && ends_with_double_consonant(&base) {
        base.pop();
    }
    // Silent `e`, so `write` and `writing` share a key.
    if base.len() > 3 && base.ends_with('e') && !base.ends_with("ee") {
        base.pop();
    }
    base
}

fn has_vowel(word: &str) -> bool {
    word.contains(['a', 'e', 'i', 'o', 'u', 'y'])
}

fn strip_inflection(word: &str) -> &str {
    for suffix in ["ing", "ed"] {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.len() >= 3 && has_vowel(base) && !base.ends_with('e') {
                return base;
            }
        }
    }
    if let Some(base) = word.strip_suffix("es") {
        if base.len() >= 3 && ["s", "x", "ch", "sh", "zz"].iter().any(|e| base.ends_with(e)) {
            return base;
        }
    }
    if let Some(base) = word.strip_suffix('s') {
        if base.len() >= 3 && !base.ends_with('s') && !base.ends_with('u') {
            return base;
        }
    }
    word
}

/// `debugg`, `stopp`, but not `fill`, `pass` or `buzz`.
fn ends_with_double_consonant(word: &str) -> bool {
    let mut tail = word.chars().rev();
    match (tail.next(), tail.next()) {
        (Some(a), Some(b)) => a == b && !"aeiouylsz".contains(a),
        _ => false,
    }
}
