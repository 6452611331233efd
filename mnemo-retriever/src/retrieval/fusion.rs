//! Hybrid ranking for the local tier.
//!
//! A query is answered in one of two modes:
//!
//! - **Hybrid**: keyword and vector candidates are ranked independently and fused
//!   with Reciprocal Rank Fusion, `score = Σ 1 / (k + rank)` over the lists a chunk
//!   appears in (ranks are 1-based).
//! - **Lexical-only**: used while vectors are being written, when the vector index is
//!   unavailable, or when the hybrid path fails. Scores are `1 / (1 + rank)` with a
//!   0-based rank, and results are flagged `provisional`.
//!
//! Either way a document contributes at most one result: its best-ranked chunk.
//! Overlapping windows of one note never crowd out other notes.
//!
//! Independently of the mode, a query that names a document (by file name, stem,
//! relative path or alias) puts that document first with score [`ENTITY_MATCH_SCORE`].

use crate::config::SearchConfig;
use crate::retrieval::indexing_state::{IndexingPhase, IndexingState};
use crate::storage::{ChunkId, ChunkRecord, DocumentRecord, DocumentStore, LexicalIndex, VectorIndex};
use crate::types::{LOCAL_SOURCE, SearchOptions, SearchResult, truncate_snippet};
use anyhow::Result;
use mnemo_embed::EmbeddingProvider;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Default rank damping constant for RRF.
pub const RRF_K: usize = 60;

/// Score given to a document the query names directly.
pub const ENTITY_MATCH_SCORE: f32 = 1.0;

/// Fuses best-first ranked lists of chunk ids.
///
/// Output is sorted by fused score descending, ties broken by the smaller id. An id
/// repeated within one list only counts at its first position.
pub fn reciprocal_rank_fusion(lists: &[Vec<ChunkId>], k: usize) -> Vec<(ChunkId, f64)> {
    let mut scores: HashMap<&str, f64> = HashMap::new();
    for list in lists {
        let mut seen = HashSet::new();
        for (index, id) in list.iter().enumerate() {
            if !seen.insert(id.as_str()) {
                continue;
            }
            *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (k + index + 1) as f64;
        }
    }

    let mut fused: Vec<(ChunkId, f64)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

/// Keeps the first chunk of each document from a best-first ranking, in order.
pub fn best_chunk_per_document<'a, S>(
    ranked: impl IntoIterator<Item = (&'a ChunkRecord, S)>,
) -> Vec<(&'a ChunkRecord, S)> {
    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|&(chunk, _)| seen.insert(chunk.path.as_str()))
        .collect()
}

/// Normalizes a name for entity matching: trimmed, lowercase, forward slashes,
/// without a leading `./`.
pub fn normalize_entity_name(name: &str) -> String {
    let mut normalized = name.trim().to_lowercase().replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized
}

/// Whether `query` names `document` by relative path, file name, stem or alias.
pub fn matches_entity(query: &str, document: &DocumentRecord) -> bool {
    let query = normalize_entity_name(query);
    if query.is_empty() {
        return false;
    }

    let path = normalize_entity_name(&document.path);
    let file_name = path.rsplit('/').next().unwrap_or(&path);
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);

    query == path
        || query == file_name
        || query == stem
        || document
            .metadata
            .aliases
            .iter()
            .any(|alias| normalize_entity_name(alias) == query)
}

/// Local hybrid search over the lexical and vector indexes.
pub struct HybridRanker {
    documents: Arc<dyn DocumentStore>,
    lexical: Arc<dyn LexicalIndex>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    state: watch::Receiver<IndexingState>,
    config: SearchConfig,
}

impl HybridRanker {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        lexical: Arc<dyn LexicalIndex>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        state: watch::Receiver<IndexingState>,
        config: SearchConfig,
    ) -> Self {
        Self {
            documents,
            lexical,
            vectors,
            embedder,
            state,
            config,
        }
    }

    /// Ranked local results for `query`.
    ///
    /// Storage failures propagate. Failures of the vector side (embedding the query or
    /// searching vectors) fall back to lexical-only ranking instead.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let max_results = options.max_results.unwrap_or(self.config.max_results);
        let min_score = options.min_score.unwrap_or(self.config.min_score);

        let entity = self.find_entity(query).await?;
        let phase = self.state.borrow().phase;

        let mut results = if phase == IndexingPhase::Embedding || !self.vectors.available() {
            debug!(phase = %phase, "Lexical-only search for {:?}", query);
            self.lexical_search(query, max_results).await?
        } else {
            match self.hybrid_search(query, max_results).await {
                Ok(results) => results,
                Err(e) => {
                    warn!("Hybrid search failed, falling back to keyword search: {}", e);
                    self.lexical_search(query, max_results).await?
                }
            }
        };

        results.retain(|r| r.score >= min_score);
        results.truncate(max_results);

        if let Some(document) = entity {
            self.place_entity(&mut results, &document).await?;
        }
        Ok(results)
    }

    async fn find_entity(&self, query: &str) -> Result<Option<DocumentRecord>> {
        let documents = self.documents.list_documents().await?;
        let normalized = normalize_entity_name(query);

        // A full relative-path match beats a bare file name shared by several folders.
        let by_path = documents
            .iter()
            .find(|d| normalize_entity_name(&d.path) == normalized);
        Ok(by_path
            .or_else(|| documents.iter().find(|d| matches_entity(query, d)))
            .cloned())
    }

    fn candidate_pool(&self, max_results: usize) -> usize {
        max_results.max(1) * self.config.candidate_multiplier.max(1)
    }

    async fn lexical_search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let hits = self.lexical.search(query, self.candidate_pool(max_results)).await?;
        let ids: Vec<ChunkId> = hits.iter().map(|(id, _)| id.clone()).collect();
        let chunks = self.documents.get_chunks(&ids).await?;

        // Ranks are counted after collapsing, so the best document always scores 1.0.
        let ranked = ids.iter().filter_map(|id| chunks.get(id)).map(|chunk| (chunk, ()));
        Ok(best_chunk_per_document(ranked)
            .into_iter()
            .enumerate()
            .map(|(rank, (chunk, ()))| {
                let mut result = self.to_result(chunk, 1.0 / (1.0 + rank as f32));
                result.provisional = true;
                result
            })
            .collect())
    }

    async fn hybrid_search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let pool = self.candidate_pool(max_results);

        let lexical: Vec<ChunkId> = self
            .lexical
            .search(query, pool)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let query_vector = self.embedder.embed_text(query).await?;
        let semantic: Vec<ChunkId> = self
            .vectors
            .search(&query_vector, pool)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let fused = reciprocal_rank_fusion(&[lexical, semantic], self.config.rrf_k);
        let ids: Vec<ChunkId> = fused.iter().map(|(id, _)| id.clone()).collect();
        let chunks = self.documents.get_chunks(&ids).await?;

        let ranked = fused.iter().filter_map(|(id, score)| chunks.get(id).map(|c| (c, *score)));
        Ok(best_chunk_per_document(ranked)
            .into_iter()
            .map(|(chunk, score)| self.to_result(chunk, score as f32))
            .collect())
    }

    /// Moves the named document's best result to the head with the entity score, or
    /// inserts one built from its first chunk. Insertion may exceed `max_results` by one.
    async fn place_entity(&self, results: &mut Vec<SearchResult>, document: &DocumentRecord) -> Result<()> {
        let entity = match results.iter().position(|r| r.path == document.path) {
            Some(index) => {
                let mut existing = results.remove(index);
                existing.score = ENTITY_MATCH_SCORE;
                existing.provisional = false;
                existing
            }
            None => match self.documents.first_chunk(&document.path).await? {
                Some(chunk) => self.to_result(&chunk, ENTITY_MATCH_SCORE),
                None => SearchResult {
                    path: document.path.clone(),
                    start_line: 1,
                    end_line: 1,
                    score: ENTITY_MATCH_SCORE,
                    snippet: format!("[Entity match: {}]", document.metadata.title),
                    source: LOCAL_SOURCE.to_string(),
                    provisional: false,
                },
            },
        };
        results.insert(0, entity);
        Ok(())
    }

    fn to_result(&self, chunk: &ChunkRecord, score: f32) -> SearchResult {
        SearchResult {
            path: chunk.path.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            score,
            snippet: truncate_snippet(&chunk.text, self.config.snippet_max_chars),
            source: LOCAL_SOURCE.to_string(),
            provisional: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_context::DocumentMetadata;

    fn ids(values: &[&str]) -> Vec<ChunkId> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn document(path: &str, aliases: &[&str]) -> DocumentRecord {
        DocumentRecord {
            path: path.to_string(),
            abs_path: format!("/vault/{path}"),
            hash: "h".to_string(),
            mtime: 0,
            size: 0,
            metadata: DocumentMetadata {
                title: path.to_string(),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
                ..DocumentMetadata::default()
            },
        }
    }

    #[test]
    fn test_rrf_scores_and_order() {
        let fused = reciprocal_rank_fusion(&[ids(&["a", "b", "c"]), ids(&["b", "d"])], 60);
        let order: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "d", "c"]);

        let b = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((fused[0].1 - b).abs() < 1e-12);
        assert!((fused[1].1 - 1.0 / 61.0).abs() < 1e-12);
        assert!(fused.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_rrf_ties_break_on_smaller_id() {
        let fused = reciprocal_rank_fusion(&[ids(&["z"]), ids(&["m"])], 60);
        assert_eq!(fused[0].0, "m");
        assert_eq!(fused[1].0, "z");
    }

    #[test]
    fn test_rrf_counts_repeats_once() {
        let fused = reciprocal_rank_fusion(&[ids(&["a", "a"])], 10);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].1 - 1.0 / 11.0).abs() < 1e-12);
        assert!(reciprocal_rank_fusion(&[vec![], vec![]], 60).is_empty());
    }

    fn chunk(id: &str, path: &str, start_line: usize) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            path: path.to_string(),
            start_line,
            end_line: start_line + 3,
            hash: format!("hash-{id}"),
            text: format!("text of {id}"),
        }
    }

    #[test]
    fn test_overlapping_chunks_collapse_to_best() {
        let chunks = [
            chunk("a2", "a.md", 5),
            chunk("b1", "b.md", 1),
            chunk("a1", "a.md", 1),
            chunk("c1", "c.md", 1),
            chunk("b2", "b.md", 5),
        ];
        let ranked = chunks.iter().zip([0.9, 0.8, 0.7, 0.6, 0.5]);

        let kept = best_chunk_per_document(ranked);
        let summary: Vec<(&str, f64)> = kept.iter().map(|(c, s)| (c.id.as_str(), *s)).collect();
        assert_eq!(summary, vec![("a2", 0.9), ("b1", 0.8), ("c1", 0.6)]);
        assert!(best_chunk_per_document(Vec::<(&ChunkRecord, f64)>::new()).is_empty());
    }

    #[test]
    fn test_entity_matching_forms() {
        let doc = document("Areas/Health/Sleep Log.md", &["zzz"]);
        assert!(matches_entity("sleep log.md", &doc));
        assert!(matches_entity("Sleep Log", &doc));
        assert!(matches_entity("./areas/health/sleep log.md", &doc));
        assert!(matches_entity("Areas\\Health\\Sleep Log.md", &doc));
        assert!(matches_entity(" ZZZ ", &doc));
        assert!(!matches_entity("sleep", &doc));
        assert!(!matches_entity("", &doc));
    }

    #[test]
    fn test_normalize_entity_name() {
        assert_eq!(normalize_entity_name("  ././Notes\\Sky.MD "), "notes/sky.md");
    }
}
