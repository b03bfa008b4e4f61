//! Citation index
//!
//! Maps a generation's cited text spans to the documents that back them.

use std::collections::HashMap;

use tracing::debug;

use super::types::{Citation, Document};

/// Key for a `(start, end)` character span within a generation
pub fn span_key(start: usize, end: usize) -> String {
    format!("{}-{}", start, end)
}

/// generation id -> span key -> documents
#[derive(Debug, Clone, Default)]
pub struct CitationIndex {
    references: HashMap<String, HashMap<String, Vec<Document>>>,
}

impl CitationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the documents for one span of a generation
    pub fn add_citation(&mut self, generation_id: &str, span_key: String, documents: Vec<Document>) {
        debug!(
            "Citation {} for generation {}: {} documents",
            span_key,
            generation_id,
            documents.len()
        );
        self.references
            .entry(generation_id.to_string())
            .or_default()
            .insert(span_key, documents);
    }

    /// Index every citation of a generation, resolving ids through `documents`.
    ///
    /// Ids that are not known yet are left out; re-indexing later with a
    /// fuller document map overwrites the earlier entry.
    pub fn index_citations(
        &mut self,
        generation_id: &str,
        citations: &[Citation],
        documents: &HashMap<String, Document>,
    ) {
        for citation in citations {
            let docs = citation
                .document_ids
                .iter()
                .filter_map(|id| documents.get(id).cloned())
                .collect();
            self.add_citation(generation_id, span_key(citation.start, citation.end), docs);
        }
    }

    pub fn get(&self, generation_id: &str, span_key: &str) -> Option<&[Document]> {
        self.references
            .get(generation_id)
            .and_then(|spans| spans.get(span_key))
            .map(Vec::as_slice)
    }

    /// All spans of one generation
    pub fn for_generation(&self, generation_id: &str) -> Option<&HashMap<String, Vec<Document>>> {
        self.references.get(generation_id)
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Drop everything (conversation switch)
    pub fn clear(&mut self) {
        self.references.clear();
    }
}
