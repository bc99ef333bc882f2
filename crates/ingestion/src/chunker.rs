//! Text chunking
//!
//! Splits document text into embedding-sized spans. Short abstracts
//! typically produce a single chunk; the splitter only matters for
//! long full-text documents.

use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Chunking parameters
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Minimum chunk size; smaller trailing spans are dropped unless they
    /// are the only span
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            min_chunk_size: 100,
        }
    }
}

/// A chunk of document text with its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    /// Ordinal position within the document
    pub ordinal: u32,
}

/// Split text into ordered chunks.
///
/// A non-empty input always yields at least one chunk, even when the whole
/// text is below `min_chunk_size`; documents must stay retrievable however
/// short their abstracts are.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let splitter = TextSplitter::new(ChunkConfig::new(config.chunk_size));
    let spans: Vec<&str> = splitter.chunks(trimmed).collect();

    debug!(
        input_len = trimmed.len(),
        chunk_count = spans.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    let mut chunks: Vec<TextChunk> = spans
        .into_iter()
        .filter(|span| span.len() >= config.min_chunk_size)
        .enumerate()
        .map(|(ordinal, span)| TextChunk {
            text: span.to_string(),
            ordinal: ordinal as u32,
        })
        .collect();

    if chunks.is_empty() {
        chunks.push(TextChunk {
            text: trimmed.to_string(),
            ordinal: 0,
        });
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_text_splits() {
        let text = "Spectrum allocation under interference. ".repeat(100);
        let config = ChunkingConfig {
            chunk_size: 200,
            min_chunk_size: 50,
        };

        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i as u32);
            assert!(chunk.text.len() <= 200);
        }
    }

    #[test]
    fn test_short_abstract_yields_single_chunk() {
        let chunks = chunk_text("Tiny abstract.", &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Tiny abstract.");
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("   ", &ChunkingConfig::default()).is_empty());
    }
}
