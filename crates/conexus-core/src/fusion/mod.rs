//! Reciprocal Rank Fusion and the optional lexical rerank pass
//! (`spec.md` §4.5).
//!
//! `fuse` merges any number of independently-ranked result lists (BM25,
//! vector, or future signals) into one ranking using RRF, the same
//! formula the teacher's search engine used for its two fixed signals,
//! generalized to an arbitrary signal count. `rerank` then optionally
//! re-scores the fused top results by lexical token overlap weighted by
//! inverse document frequency across the candidate set.

use std::collections::{HashMap, HashSet};

use crate::types::SearchResult;

/// Default RRF constant, matching `spec.md`'s default `rrf_k = 60`.
pub const DEFAULT_RRF_K: u32 = 60;

/// Fuse any number of ranked result lists via Reciprocal Rank Fusion.
///
/// Each list is assumed already sorted best-first (rank 1 = best). A
/// document present in multiple lists accumulates `1 / (k + rank)` once
/// per list it appears in; its `debug_scores` are merged across lists so
/// the final result carries whichever `bm25_*`/`vector_*` fields each
/// contributing list set. Output is sorted by fused score descending,
/// ties broken by document id ascending for determinism.
pub fn fuse(lists: &[&[SearchResult]], rrf_k: u32) -> Vec<SearchResult> {
    let k = f64::from(rrf_k);
    let mut merged: HashMap<String, SearchResult> = HashMap::new();
    let mut rrf_totals: HashMap<String, f64> = HashMap::new();

    for list in lists {
        for (rank, result) in list.iter().enumerate() {
            let contribution = 1.0 / (k + (rank as f64 + 1.0));
            *rrf_totals.entry(result.document.id.clone()).or_insert(0.0) += contribution;

            merged
                .entry(result.document.id.clone())
                .and_modify(|existing| merge_debug_scores(&mut existing.debug_scores, &result.debug_scores))
                .or_insert_with(|| result.clone());
        }
    }

    let mut fused: Vec<SearchResult> = merged
        .into_iter()
        .map(|(id, mut result)| {
            let score = rrf_totals.get(&id).copied().unwrap_or(0.0);
            result.debug_scores.rrf_score = score;
            result.score = score;
            result
        })
        .collect();

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.document.id.cmp(&b.document.id)));
    fused
}

fn merge_debug_scores(target: &mut crate::types::ScoreBreakdown, incoming: &crate::types::ScoreBreakdown) {
    target.bm25_rank = target.bm25_rank.or(incoming.bm25_rank);
    target.bm25_score = target.bm25_score.or(incoming.bm25_score);
    target.vector_rank = target.vector_rank.or(incoming.vector_rank);
    target.vector_score = target.vector_score.or(incoming.vector_score);
}

/// Re-score `results` by lexical token overlap between `query` and each
/// document's content, weighted by inverse document frequency computed
/// over the candidate set itself (not the whole corpus -- the candidate
/// set is already the RRF-fused shortlist). The RRF score is kept as a
/// tie-breaking secondary key; `rerank_score` becomes the primary sort
/// key and the result's `score` is set to it.
pub fn rerank(query: &str, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
    if results.is_empty() {
        return results;
    }

    let query_tokens: HashSet<String> = tokenize(query);
    if query_tokens.is_empty() {
        return results;
    }

    let doc_tokens: Vec<HashSet<String>> = results.iter().map(|r| tokenize(&r.document.content)).collect();

    let n = results.len() as f64;
    let mut idf: HashMap<&str, f64> = HashMap::new();
    for token in &query_tokens {
        let df = doc_tokens.iter().filter(|tokens| tokens.contains(token)).count() as f64;
        idf.insert(token.as_str(), ((n + 1.0) / (df + 1.0)).ln() + 1.0);
    }

    for (result, tokens) in results.iter_mut().zip(doc_tokens.iter()) {
        let rerank_score: f64 = query_tokens.iter().filter(|t| tokens.contains(t.as_str())).map(|t| idf[t.as_str()]).sum();
        result.debug_scores.rerank_score = Some(rerank_score);
        result.score = rerank_score;
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.debug_scores.rrf_score.partial_cmp(&a.debug_scores.rrf_score).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    results
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(|t| t.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Document, ScoreBreakdown};
    use std::collections::HashMap as Map;

    fn result(id: &str, content: &str, rank_score: ScoreBreakdown) -> SearchResult {
        SearchResult {
            document: Document { id: id.to_string(), content: content.to_string(), vector: vec![], metadata: Map::new(), created_at: 0, updated_at: 0 },
            score: 0.0,
            debug_scores: rank_score,
        }
    }

    #[test]
    fn fuse_combines_scores_across_both_signals() {
        let bm25 = vec![result("a", "x", ScoreBreakdown { bm25_rank: Some(1), ..Default::default() })];
        let vector = vec![result("a", "x", ScoreBreakdown { vector_rank: Some(1), ..Default::default() })];

        let fused = fuse(&[&bm25, &vector], 60);
        assert_eq!(fused.len(), 1);
        let expected = 2.0 / 61.0;
        assert!((fused[0].score - expected).abs() < 1e-10);
        assert_eq!(fused[0].debug_scores.bm25_rank, Some(1));
        assert_eq!(fused[0].debug_scores.vector_rank, Some(1));
    }

    #[test]
    fn fuse_keeps_documents_present_in_only_one_list() {
        let bm25 = vec![result("a", "x", ScoreBreakdown { bm25_rank: Some(1), ..Default::default() })];
        let vector = vec![result("b", "y", ScoreBreakdown { vector_rank: Some(1), ..Default::default() })];

        let fused = fuse(&[&bm25, &vector], 60);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn fuse_orders_by_combined_score_descending() {
        let bm25 = vec![
            result("top", "x", ScoreBreakdown { bm25_rank: Some(1), ..Default::default() }),
            result("mid", "y", ScoreBreakdown { bm25_rank: Some(2), ..Default::default() }),
        ];
        let vector: Vec<SearchResult> = vec![];

        let fused = fuse(&[&bm25, &vector], 60);
        assert_eq!(fused[0].document.id, "top");
        assert_eq!(fused[1].document.id, "mid");
    }

    #[test]
    fn rerank_prefers_higher_token_overlap() {
        let results = vec![
            result("low", "totally unrelated text", ScoreBreakdown { rrf_score: 0.01, ..Default::default() }),
            result("high", "add two numbers together", ScoreBreakdown { rrf_score: 0.01, ..Default::default() }),
        ];

        let reranked = rerank("add numbers", results);
        assert_eq!(reranked[0].document.id, "high");
    }

    #[test]
    fn rerank_is_noop_on_empty_query() {
        let results = vec![result("a", "content", ScoreBreakdown::default())];
        let reranked = rerank("", results.clone());
        assert_eq!(reranked[0].document.id, results[0].document.id);
    }
}
