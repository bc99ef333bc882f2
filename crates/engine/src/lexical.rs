//! Query-alignment scoring
//!
//! Lexical term overlap between the query and a document's title,
//! abstract, and topic labels. Independent of embeddings, so the signal
//! stays live when the embedding provider is degraded.

use scholargraph_common::model::Document;
use scholargraph_ingestion::normalize;
use std::collections::BTreeSet;

/// Tokenized query terms for alignment scoring
pub fn query_terms(query: &str) -> BTreeSet<String> {
    normalize::tokenize(query)
}

/// Fraction of query terms present in the document's text surface.
///
/// An empty query or a query of only short stop-tokens aligns with
/// nothing and scores zero.
pub fn alignment_score(
    document: &Document,
    topic_names: &[String],
    query_terms: &BTreeSet<String>,
) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }

    let mut surface = format!("{} {}", document.title, document.abstract_text);
    for topic in topic_names {
        surface.push(' ');
        surface.push_str(topic);
    }
    let document_terms = normalize::tokenize(&surface);

    let overlap = query_terms.intersection(&document_terms).count();
    overlap as f64 / query_terms.len() as f64
}
