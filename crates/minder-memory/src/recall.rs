//! Ranking of memory records against a query.

use crate::embed::{cosine_similarity, tokenize};
use crate::model::MemoryRecord;
use std::collections::HashSet;

/// Rank records by cosine similarity to the query embedding and keep the
/// top k.
///
/// When the query embeds to a zero vector (empty or non-alphanumeric
/// input), falls back to keyword overlap so retrieval stays deterministic
/// and non-empty where any token matches.
pub fn rank_records(
    mut records: Vec<MemoryRecord>,
    query_embedding: &[f32],
    query_text: &str,
    k: usize,
) -> Vec<MemoryRecord> {
    if records.is_empty() || k == 0 {
        return Vec::new();
    }

    let zero_query = query_embedding.iter().all(|x| *x == 0.0);
    let mut scored: Vec<(f32, usize)> = if zero_query {
        let query_tokens: HashSet<String> = tokenize(query_text).into_iter().collect();
        records
            .iter()
            .enumerate()
            .map(|(i, record)| (keyword_overlap(&query_tokens, &record.summary_text), i))
            .collect()
    } else {
        records
            .iter()
            .enumerate()
            .map(|(i, record)| (cosine_similarity(query_embedding, &record.embedding), i))
            .collect()
    };

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let selected: Vec<usize> = scored.into_iter().take(k).map(|(_, i)| i).collect();

    let mut picked: Vec<Option<MemoryRecord>> = records.drain(..).map(Some).collect();
    selected
        .into_iter()
        .filter_map(|i| picked[i].take())
        .collect()
}

fn keyword_overlap(query_tokens: &HashSet<String>, summary: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let summary_tokens: HashSet<String> = tokenize(summary).into_iter().collect();
    query_tokens.intersection(&summary_tokens).count() as f32
}
