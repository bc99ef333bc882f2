//! Work normalization
//!
//! Raw work records arrive with optional fields, inverted-index abstracts,
//! and free-form author names. Normalization resolves all of that up front
//! so the upsert pipeline only ever sees complete, validated inputs.

use scholargraph_common::errors::{EngineError, Result};
use scholargraph_common::model::WorkRecord;
use std::collections::{BTreeSet, HashMap};

/// Minimum token length considered meaningful
const MIN_TOKEN_LEN: usize = 3;

/// A validated work ready for upsert
#[derive(Debug, Clone)]
pub struct NormalizedWork {
    pub external_id: String,
    pub title: String,
    pub abstract_text: String,
    pub published_date: Option<chrono::NaiveDate>,
    pub doi: Option<String>,
    pub authors: Vec<NormalizedAuthor>,
    pub topics: Vec<NormalizedTopic>,
}

#[derive(Debug, Clone)]
pub struct NormalizedAuthor {
    /// Normalized identity key, shared across works
    pub key: String,
    pub external_id: String,
    pub name: String,
    pub institution: String,
}

#[derive(Debug, Clone)]
pub struct NormalizedTopic {
    pub key: String,
    pub external_id: String,
    pub name: String,
}

/// Lowercase and collapse internal whitespace; the identity key for
/// authors and topics without a stable external id.
pub fn normalize_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn token_pattern() -> &'static regex_lite::Regex {
    static PATTERN: std::sync::OnceLock<regex_lite::Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| regex_lite::Regex::new(r"[a-zA-Z0-9]+").expect("valid token pattern"))
}

/// Alphanumeric tokens of length >= 3, lowercased
pub fn tokenize(text: &str) -> BTreeSet<String> {
    token_pattern()
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .collect()
}

/// Rebuild abstract text from a word-position inverted index
pub fn decode_inverted_abstract(index: &HashMap<String, Vec<u32>>) -> String {
    let mut positions: Vec<(u32, &str)> = index
        .iter()
        .flat_map(|(word, posns)| posns.iter().map(move |p| (*p, word.as_str())))
        .collect();
    positions.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    positions
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate and normalize a raw work record.
///
/// Records without an external id or a title cannot be upserted
/// idempotently and are rejected. Authors and topics missing names are
/// dropped, not defaulted.
pub fn normalize_work(record: &WorkRecord) -> Result<NormalizedWork> {
    let external_id = record
        .external_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::WorkRejected {
            reason: "missing external id".into(),
        })?
        .to_string();

    let title = record
        .title
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::WorkRejected {
            reason: format!("work {external_id} has no title"),
        })?
        .to_string();

    let abstract_text = match (&record.abstract_text, &record.abstract_inverted_index) {
        (Some(text), _) if !text.trim().is_empty() => text.trim().to_string(),
        (_, Some(index)) => decode_inverted_abstract(index),
        _ => String::new(),
    };

    let mut authors = Vec::with_capacity(record.authors.len());
    for author in &record.authors {
        let name = match author.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => continue,
        };
        authors.push(NormalizedAuthor {
            key: normalize_key(&name),
            external_id: author.external_id.clone().unwrap_or_default(),
            name,
            institution: author.institution.clone().unwrap_or_default(),
        });
    }

    let mut topics = Vec::with_capacity(record.concepts.len());
    for concept in &record.concepts {
        let name = match concept.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => continue,
        };
        topics.push(NormalizedTopic {
            key: normalize_key(&name),
            external_id: concept.external_id.clone().unwrap_or_default(),
            name,
        });
    }

    Ok(NormalizedWork {
        external_id,
        title,
        abstract_text,
        published_date: record.published_date,
        doi: record.doi.clone(),
        authors,
        topics,
    })
}

/// Whether a normalized work is relevant enough to the query to enter the
/// corpus. Works with no textual overlap are discarded; marginal overlap
/// passes only when at least two query terms match.
pub fn is_relevant(work: &NormalizedWork, query_terms: &BTreeSet<String>, min_coverage: f64) -> bool {
    if query_terms.is_empty() {
        return true;
    }

    let mut corpus_text = format!("{} {}", work.title, work.abstract_text);
    for topic in &work.topics {
        corpus_text.push(' ');
        corpus_text.push_str(&topic.name);
    }
    let corpus_terms = tokenize(&corpus_text);
    if corpus_terms.is_empty() {
        return false;
    }

    let overlap = query_terms.intersection(&corpus_terms).count();
    if overlap == 0 {
        return false;
    }

    let coverage = overlap as f64 / query_terms.len() as f64;
    coverage >= min_coverage || overlap >= 2
}
