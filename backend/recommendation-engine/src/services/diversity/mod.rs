use crate::models::RecommendationScore;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Bucket for candidates without a content category
pub const UNCATEGORIZED: &str = "uncategorized";

/// Diversity Layer - category quota re-rank
///
/// Every category present among the candidates gets a quota of
/// ceil(N / categories). Category names are compared case-insensitively. Each category contributes its best candidates up to
/// the quota; the picks are re-sorted by score and truncated to N.
pub struct DiversityLayer {
    target_size: usize,
}

impl DiversityLayer {
    pub fn new(target_size: usize) -> Self {
        Self { target_size }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Quota per category for a given number of distinct categories
    pub fn quota(&self, category_count: usize) -> usize {
        if category_count == 0 {
            return 0;
        }
        self.target_size.div_ceil(category_count)
    }

    /// Re-rank scored candidates so no single category dominates
    pub fn rerank(&self, scores: Vec<RecommendationScore>) -> Vec<RecommendationScore> {
        if scores.is_empty() || self.target_size == 0 {
            return Vec::new();
        }

        let mut buckets: BTreeMap<String, Vec<RecommendationScore>> = BTreeMap::new();
        for score in scores {
            buckets.entry(bucket_key(&score)).or_default().push(score);
        }

        let quota = self.quota(buckets.len());
        let category_count = buckets.len();

        let mut selected: Vec<RecommendationScore> = buckets
            .into_values()
            .flat_map(|mut bucket| {
                bucket.sort_by(by_score_desc);
                bucket.truncate(quota);
                bucket
            })
            .collect();

        selected.sort_by(by_score_desc);
        selected.truncate(self.target_size);

        debug!(
            category_count = category_count,
            quota = quota,
            selected = selected.len(),
            "Diversity re-rank complete"
        );

        selected
    }
}

impl Default for DiversityLayer {
    fn default() -> Self {
        Self::new(12)
    }
}

fn bucket_key(score: &RecommendationScore) -> String {
    match score.content_category.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_lowercase(),
        _ => UNCATEGORIZED.to_string(),
    }
}

fn by_score_desc(a: &RecommendationScore, b: &RecommendationScore) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.content_id.cmp(&b.content_id))
}
