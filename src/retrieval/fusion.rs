use std::collections::HashMap;

use super::RetrievedDocument;

/// RRF smoothing constant; higher values damp the advantage of topping
/// any single list.
const RRF_K: f32 = 60.0;

/// Reciprocal Rank Fusion over several ranked lists: each appearance of
/// a document contributes `1 / (k + rank)`, duplicates (by content) are
/// merged, and the fused ranking is capped at `top_k`. Ties keep
/// first-seen order.
pub fn reciprocal_rank_fuse(
    ranked_lists: Vec<Vec<RetrievedDocument>>,
    top_k: usize,
) -> Vec<RetrievedDocument> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut first_seen: HashMap<String, RetrievedDocument> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for list in ranked_lists {
        for (rank, doc) in list.into_iter().enumerate() {
            let key = doc.content.clone();
            *scores.entry(key.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f32 + 1.0);
            first_seen.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                doc
            });
        }
    }

    // Stable sort keeps insertion order for equal scores.
    order.sort_by(|a, b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    order
        .into_iter()
        .take(top_k)
        .filter_map(|key| first_seen.remove(&key))
        .collect()
}
