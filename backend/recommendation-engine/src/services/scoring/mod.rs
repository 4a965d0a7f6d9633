/// Scoring Module
///
/// Multi-factor weighted scoring of candidate articles for one reader.
///
/// # Workflow
/// 1. Drop unpublished candidates and the article currently being read
/// 2. Compute personalized, trending, similarity, editorial and recency sub-scores
/// 3. Combine with the engine weights and clamp to [0, 1]
/// 4. Assign a recommendation category, reasons and confidence
pub mod subscores;

use crate::config::ScoringConfig;
use crate::models::{
    BehaviorRecord, ContentItem, EngineWeights, RecommendationCategory, RecommendationScore,
    SubScores, UserPreferenceProfile,
};
use crate::services::similarity::SimilarityScorer;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const PERSONALIZED_THRESHOLD: f32 = 0.6;
const TRENDING_THRESHOLD: f32 = 0.7;
const SIMILARITY_THRESHOLD: f32 = 0.6;
const EDITORIAL_THRESHOLD: f32 = 0.8;

/// Namespace for deterministic recommendation ids
const RECOMMENDATION_NAMESPACE: Uuid = Uuid::from_bytes([
    0x5c, 0x1e, 0x7a, 0x42, 0x93, 0x0d, 0x4b, 0x8e, 0xa1, 0x6f, 0x22, 0x3b, 0x90, 0x4d, 0xe7, 0x18,
]);

/// Scoring Engine
///
/// Stateless apart from the similarity scorer's classifier breaker; safe to
/// share behind an `Arc`.
pub struct ScoringEngine {
    similarity: Arc<SimilarityScorer>,
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(similarity: Arc<SimilarityScorer>, config: ScoringConfig) -> Self {
        Self { similarity, config }
    }

    /// Engine with heuristic similarity only
    pub fn heuristic(config: ScoringConfig) -> Self {
        Self::new(Arc::new(SimilarityScorer::heuristic()), config)
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score every eligible candidate for a reader.
    ///
    /// # Arguments
    /// * `items` - Candidate articles (may include the current article)
    /// * `current_item_id` - Article being read, enables similarity scoring
    /// * `now` - Reference time for recency and recommendation ids
    ///
    /// # Returns
    /// * Scores sorted descending (ties by content id). Never fails.
    pub async fn score_candidates(
        &self,
        items: &[ContentItem],
        profile: &UserPreferenceProfile,
        behavior: &BehaviorRecord,
        current_item_id: Option<&str>,
        weights: &EngineWeights,
        now: DateTime<Utc>,
    ) -> Vec<RecommendationScore> {
        let current = current_item_id.and_then(|id| items.iter().find(|item| item.id == id));

        let eligible: Vec<&ContentItem> = items
            .iter()
            .filter(|item| item.is_published())
            .filter(|item| current_item_id != Some(item.id.as_str()))
            .collect();

        if eligible.is_empty() {
            debug!(user_id = %profile.user_id, "No eligible candidates");
            return Vec::new();
        }

        let similarities: Vec<f32> = match current {
            Some(current) => {
                join_all(
                    eligible
                        .iter()
                        .map(|item| self.similarity.score(item, current)),
                )
                .await
                .into_iter()
                .map(|outcome| outcome.score)
                .collect()
            }
            None => vec![0.0; eligible.len()],
        };

        let mut scored: Vec<RecommendationScore> = eligible
            .iter()
            .zip(similarities)
            .map(|(item, similarity)| {
                self.score_item(item, profile, behavior, similarity, weights, now)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });

        info!(
            user_id = %profile.user_id,
            candidate_count = items.len(),
            scored_count = scored.len(),
            top_score = scored.first().map(|s| s.score),
            "Scoring complete"
        );

        scored
    }

    /// Score one candidate given a precomputed similarity sub-score
    pub fn score_item(
        &self,
        item: &ContentItem,
        profile: &UserPreferenceProfile,
        behavior: &BehaviorRecord,
        similarity: f32,
        weights: &EngineWeights,
        now: DateTime<Utc>,
    ) -> RecommendationScore {
        let sub_scores = SubScores {
            personalized: subscores::personalized(
                item,
                profile,
                behavior,
                self.config.reading_speed_wpm,
            ),
            trending: subscores::trending(item),
            similarity: similarity.clamp(0.0, 1.0),
            editorial: subscores::editorial(item),
            recency: subscores::recency(item, now),
        };

        let score = combine(&sub_scores, weights);
        let reasons = reasons(item, &sub_scores);
        let category = categorize(&sub_scores);
        let confidence = confidence(score, reasons.len());

        debug!(
            content_id = %item.id,
            personalized = sub_scores.personalized,
            trending = sub_scores.trending,
            similarity = sub_scores.similarity,
            editorial = sub_scores.editorial,
            recency = sub_scores.recency,
            score = score,
            category = category.as_str(),
            "Candidate scored"
        );

        RecommendationScore {
            recommendation_id: recommendation_id(&profile.user_id, &item.id, now),
            content_id: item.id.clone(),
            content_category: item.category_name().map(str::to_string),
            score,
            reasons,
            confidence,
            category,
            sub_scores,
            scored_at: now,
        }
    }
}

/// Percentage weights are divided by 100; the recency boost is applied as a
/// direct fraction. The result is clamped to [0, 1].
pub fn combine(sub_scores: &SubScores, weights: &EngineWeights) -> f32 {
    let score = sub_scores.personalized * (weights.personalized / 100.0)
        + sub_scores.trending * (weights.trending / 100.0)
        + sub_scores.similarity * (weights.similarity / 100.0)
        + sub_scores.editorial * (weights.editorial / 100.0)
        + sub_scores.recency * weights.recency_boost;

    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

/// First match wins: trending, similar, editorial, else personalized
pub fn categorize(sub_scores: &SubScores) -> RecommendationCategory {
    if sub_scores.trending > TRENDING_THRESHOLD {
        RecommendationCategory::Trending
    } else if sub_scores.similarity > SIMILARITY_THRESHOLD {
        RecommendationCategory::Similar
    } else if sub_scores.editorial > EDITORIAL_THRESHOLD {
        RecommendationCategory::Editorial
    } else {
        RecommendationCategory::Personalized
    }
}

pub fn confidence(score: f32, reason_count: usize) -> f32 {
    let bonus = (reason_count as f32 * 0.1).min(0.3);
    (score + bonus).min(1.0)
}

fn reasons(item: &ContentItem, sub_scores: &SubScores) -> Vec<String> {
    let mut reasons = Vec::new();

    if sub_scores.personalized > PERSONALIZED_THRESHOLD {
        match item.category_name() {
            Some(name) => reasons.push(format!("Matches your interest in {}", name)),
            None => reasons.push("Matches your reading preferences".to_string()),
        }
    }
    if sub_scores.trending > TRENDING_THRESHOLD {
        reasons.push("Trending now with high reader engagement".to_string());
    }
    if sub_scores.similarity > SIMILARITY_THRESHOLD {
        reasons.push("Similar to the article you are reading".to_string());
    }
    if sub_scores.editorial > EDITORIAL_THRESHOLD {
        reasons.push("Highlighted by the editorial team".to_string());
    }

    reasons
}

/// Deterministic id so repeated scoring with identical inputs is idempotent
pub fn recommendation_id(user_id: &str, content_id: &str, scored_at: DateTime<Utc>) -> Uuid {
    let name = format!(
        "{}:{}:{}",
        user_id,
        content_id,
        scored_at.timestamp_nanos_opt().unwrap_or_default()
    );
    Uuid::new_v5(&RECOMMENDATION_NAMESPACE, name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ContentAnalytics, ContentStatus, EditorialPriority, Language};
    use crate::services::similarity::{ClassifierError, MockSimilarityClassifier};
    use chrono::Duration;

    fn article(id: &str, category: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            title: format!("Article {}", id),
            excerpt: String::new(),
            body: vec!["kalima"; 300].join(" "),
            category: Some(Category::new(category.to_lowercase(), category)),
            tags: vec![category.to_lowercase()],
            status: ContentStatus::Published,
            created_at: Utc::now() - Duration::hours(3),
            published_at: None,
            analytics: Some(ContentAnalytics::default()),
            priority: EditorialPriority::Normal,
            language: Language::Arabic,
            featured_image: None,
        }
    }

    fn engine() -> ScoringEngine {
        ScoringEngine::heuristic(ScoringConfig::default())
    }

    #[test]
    fn test_combine_applies_recency_as_fraction() {
        let subs = SubScores {
            personalized: 0.0,
            trending: 0.0,
            similarity: 0.0,
            editorial: 0.0,
            recency: 1.0,
        };
        let weights = EngineWeights {
            recency_boost: 0.2,
            ..Default::default()
        };
        // Not divided by 100
        assert!((combine(&subs, &weights) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_combine_clamps_pathological_weights() {
        let subs = SubScores {
            personalized: 1.0,
            trending: 1.0,
            similarity: 1.0,
            editorial: 1.0,
            recency: 1.0,
        };
        let heavy = EngineWeights {
            personalized: 100.0,
            trending: 100.0,
            similarity: 100.0,
            editorial: 100.0,
            diversity_factor: 1.0,
            recency_boost: 100.0,
        };
        assert_eq!(combine(&subs, &heavy), 1.0);

        let negative = EngineWeights {
            personalized: -100.0,
            trending: -100.0,
            similarity: -100.0,
            editorial: -100.0,
            diversity_factor: 0.0,
            recency_boost: -1.0,
        };
        assert_eq!(combine(&subs, &negative), 0.0);

        let nan = EngineWeights {
            trending: f32::NAN,
            ..Default::default()
        };
        assert_eq!(combine(&subs, &nan), 0.0);
    }

    #[test]
    fn test_categorize_tie_break_order() {
        let all_high = SubScores {
            personalized: 1.0,
            trending: 0.9,
            similarity: 0.9,
            editorial: 0.9,
            recency: 1.0,
        };
        assert_eq!(categorize(&all_high), RecommendationCategory::Trending);

        let similar = SubScores {
            trending: 0.7,
            ..all_high
        };
        assert_eq!(categorize(&similar), RecommendationCategory::Similar);

        let editorial = SubScores {
            trending: 0.1,
            similarity: 0.6,
            ..all_high
        };
        assert_eq!(categorize(&editorial), RecommendationCategory::Editorial);

        assert_eq!(
            categorize(&SubScores::default()),
            RecommendationCategory::Personalized
        );
    }

    #[test]
    fn test_confidence_bonus_capped() {
        assert!((confidence(0.5, 1) - 0.6).abs() < 1e-6);
        assert!((confidence(0.5, 5) - 0.8).abs() < 1e-6);
        assert_eq!(confidence(0.95, 3), 1.0);
    }

    #[tokio::test]
    async fn test_excludes_unpublished_and_current() {
        let mut draft = article("draft", "World");
        draft.status = ContentStatus::Draft;
        let items = vec![article("current", "World"), article("other", "World"), draft];

        let scored = engine()
            .score_candidates(
                &items,
                &UserPreferenceProfile::new("u1"),
                &BehaviorRecord::new("u1"),
                Some("current"),
                &EngineWeights::default(),
                Utc::now(),
            )
            .await;

        let ids: Vec<_> = scored.iter().map(|s| s.content_id.as_str()).collect();
        assert_eq!(ids, vec!["other"]);
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let scored = engine()
            .score_candidates(
                &[],
                &UserPreferenceProfile::new("u1"),
                &BehaviorRecord::new("u1"),
                None,
                &EngineWeights::default(),
                Utc::now(),
            )
            .await;
        assert!(scored.is_empty());
    }

    #[tokio::test]
    async fn test_similarity_only_with_current_item() {
        let items = vec![article("current", "Economy"), article("peer", "Economy")];
        let profile = UserPreferenceProfile::new("u1");
        let behavior = BehaviorRecord::new("u1");
        let now = Utc::now();

        let without = engine()
            .score_candidates(&items, &profile, &behavior, None, &EngineWeights::default(), now)
            .await;
        let peer = without.iter().find(|s| s.content_id == "peer").unwrap();
        assert_eq!(peer.sub_scores.similarity, 0.0);

        let with = engine()
            .score_candidates(
                &items,
                &profile,
                &behavior,
                Some("current"),
                &EngineWeights::default(),
                now,
            )
            .await;
        // Same category (0.5) plus one shared tag (0.2)
        assert!((with[0].sub_scores.similarity - 0.7).abs() < 1e-6);
        assert_eq!(with[0].category, RecommendationCategory::Similar);
    }

    #[tokio::test]
    async fn test_classifier_failure_never_aborts_batch() {
        let mut mock = MockSimilarityClassifier::new();
        mock.expect_similarity().returning(|candidate, _| {
            if candidate.id == "flaky" {
                Err(ClassifierError::Transport("reset by peer".into()))
            } else {
                Ok(0.9)
            }
        });

        let similarity = SimilarityScorer::with_classifier(
            Arc::new(mock),
            std::time::Duration::from_secs(1),
            10,
            std::time::Duration::from_secs(60),
        );
        let engine = ScoringEngine::new(Arc::new(similarity), ScoringConfig::default());

        let items = vec![
            article("current", "Culture"),
            article("flaky", "Culture"),
            article("steady", "Sports"),
        ];

        let scored = engine
            .score_candidates(
                &items,
                &UserPreferenceProfile::new("u1"),
                &BehaviorRecord::new("u1"),
                Some("current"),
                &EngineWeights::default(),
                Utc::now(),
            )
            .await;

        assert_eq!(scored.len(), 2);
        let flaky = scored.iter().find(|s| s.content_id == "flaky").unwrap();
        let steady = scored.iter().find(|s| s.content_id == "steady").unwrap();
        // Heuristic: same category + shared tag
        assert!((flaky.sub_scores.similarity - 0.7).abs() < 1e-6);
        assert!((steady.sub_scores.similarity - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_recommendation_id_is_deterministic() {
        let at = Utc::now();
        assert_eq!(
            recommendation_id("u1", "c1", at),
            recommendation_id("u1", "c1", at)
        );
        assert_ne!(
            recommendation_id("u1", "c1", at),
            recommendation_id("u2", "c1", at)
        );
    }
}
