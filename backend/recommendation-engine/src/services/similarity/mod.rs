// ============================================
// Similarity Scoring (相似度評分)
// ============================================
//
// Similarity between a candidate and the article currently being read.
//
// Primary path: an external text-similarity classifier (LLM), guarded by a
// per-call timeout and a consecutive-failure breaker.
// Fallback path: deterministic category/tag heuristic, always available.

pub mod circuit_breaker;
pub mod llm_classifier;

pub use circuit_breaker::{BreakerPermit, BreakerState, ClassifierBreaker};
pub use llm_classifier::{
    build_classifier, parse_similarity_response, AnthropicProvider, LlmProvider,
    LlmSimilarityClassifier, OpenAIProvider,
};

use crate::config::LlmConfig;
use crate::models::ContentItem;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier transport error: {0}")]
    Transport(String),

    #[error("Classifier returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid classifier response: {0}")]
    InvalidResponse(String),

    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("Classifier circuit is open")]
    CircuitOpen,

    #[error("No classifier configured")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

/// External text-similarity classifier. Best effort: any error is replaced
/// by the heuristic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SimilarityClassifier: Send + Sync {
    /// Similarity of two articles in [0, 1]
    async fn similarity(&self, candidate: &ContentItem, current: &ContentItem) -> Result<f32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilaritySource {
    Classifier,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityOutcome {
    pub score: f32,
    pub source: SimilaritySource,
}

/// Category match is worth 0.5, each shared tag 0.2 up to 0.5.
pub fn heuristic_similarity(candidate: &ContentItem, current: &ContentItem) -> f32 {
    let mut score = 0.0_f32;

    if let (Some(a), Some(b)) = (candidate.category_name(), current.category_name()) {
        if a.eq_ignore_ascii_case(b) {
            score += 0.5;
        }
    }

    let current_tags: HashSet<String> = current.tags.iter().map(|t| t.to_lowercase()).collect();
    let overlap = candidate
        .tags
        .iter()
        .map(|t| t.to_lowercase())
        .collect::<HashSet<_>>()
        .intersection(&current_tags)
        .count();

    score += (overlap as f32 * 0.2).min(0.5);
    score.min(1.0)
}

/// Similarity scorer with guarded classifier access
pub struct SimilarityScorer {
    classifier: Option<Arc<dyn SimilarityClassifier>>,
    timeout: Duration,
    breaker: ClassifierBreaker,
}

impl SimilarityScorer {
    /// Heuristic-only scorer
    pub fn heuristic() -> Self {
        Self {
            classifier: None,
            timeout: Duration::from_millis(LlmConfig::default().timeout_ms),
            breaker: ClassifierBreaker::new(1, Duration::from_secs(0)),
        }
    }

    pub fn with_classifier(
        classifier: Arc<dyn SimilarityClassifier>,
        timeout: Duration,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            classifier: Some(classifier),
            timeout,
            breaker: ClassifierBreaker::new(failure_threshold, cooldown),
        }
    }

    pub fn from_config(config: &LlmConfig, classifier: Option<Arc<dyn SimilarityClassifier>>) -> Self {
        match classifier {
            Some(classifier) => Self::with_classifier(
                classifier,
                Duration::from_millis(config.timeout_ms),
                config.failure_threshold,
                Duration::from_secs(config.cooldown_secs),
            ),
            None => Self::heuristic(),
        }
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Score similarity. Never fails: classifier errors, timeouts and
    /// out-of-range answers all degrade to the heuristic.
    pub async fn score(&self, candidate: &ContentItem, current: &ContentItem) -> SimilarityOutcome {
        match self.classify(candidate, current).await {
            Ok(score) => SimilarityOutcome {
                score,
                source: SimilaritySource::Classifier,
            },
            Err(e) => {
                if self.classifier.is_some() {
                    warn!(
                        content_id = %candidate.id,
                        current_id = %current.id,
                        error = %e,
                        "Similarity classifier unavailable, using heuristic"
                    );
                }
                SimilarityOutcome {
                    score: heuristic_similarity(candidate, current),
                    source: SimilaritySource::Heuristic,
                }
            }
        }
    }

    async fn classify(&self, candidate: &ContentItem, current: &ContentItem) -> Result<f32> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or(ClassifierError::NotConfigured)?;

        let permit = self
            .breaker
            .try_acquire()
            .ok_or(ClassifierError::CircuitOpen)?;

        let result = match tokio::time::timeout(
            self.timeout,
            classifier.similarity(candidate, current),
        )
        .await
        {
            Ok(Ok(score)) if (0.0..=1.0).contains(&score) => Ok(score),
            Ok(Ok(score)) => Err(ClassifierError::InvalidResponse(format!(
                "score {} outside [0, 1]",
                score
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ClassifierError::Timeout(self.timeout)),
        };

        match &result {
            Ok(score) => {
                permit.succeed();
                debug!(content_id = %candidate.id, score = score, "Classifier similarity");
            }
            Err(_) => permit.fail(),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ContentStatus, EditorialPriority, Language};
    use chrono::Utc;

    fn item(id: &str, category: Option<&str>, tags: &[&str]) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            title: format!("Title {}", id),
            excerpt: String::new(),
            body: String::new(),
            category: category.map(|c| Category::new(c.to_lowercase(), c)),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            status: ContentStatus::Published,
            created_at: Utc::now(),
            published_at: None,
            analytics: None,
            priority: EditorialPriority::Normal,
            language: Language::Arabic,
            featured_image: None,
        }
    }

    #[test]
    fn test_heuristic_category_and_tags() {
        let current = item("a", Some("Economy"), &["oil", "opec", "markets"]);

        let same_category = item("b", Some("Economy"), &[]);
        assert!((heuristic_similarity(&same_category, &current) - 0.5).abs() < 1e-6);

        let one_tag = item("c", Some("Sports"), &["OIL"]);
        assert!((heuristic_similarity(&one_tag, &current) - 0.2).abs() < 1e-6);

        // 3 tags * 0.2 = 0.6, capped at 0.5, plus category 0.5
        let full = item("d", Some("Economy"), &["oil", "opec", "markets"]);
        assert!((heuristic_similarity(&full, &current) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_heuristic_missing_category_contributes_zero() {
        let current = item("a", None, &[]);
        let candidate = item("b", Some("World"), &[]);
        assert_eq!(heuristic_similarity(&candidate, &current), 0.0);
    }

    #[tokio::test]
    async fn test_classifier_success_is_used() {
        let mut mock = MockSimilarityClassifier::new();
        mock.expect_similarity().returning(|_, _| Ok(0.83));

        let scorer = SimilarityScorer::with_classifier(
            Arc::new(mock),
            Duration::from_secs(1),
            3,
            Duration::from_secs(60),
        );

        let outcome = scorer
            .score(&item("b", None, &[]), &item("a", None, &[]))
            .await;
        assert_eq!(outcome.source, SimilaritySource::Classifier);
        assert!((outcome.score - 0.83).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_classifier_failure_falls_back() {
        let mut mock = MockSimilarityClassifier::new();
        mock.expect_similarity()
            .returning(|_, _| Err(ClassifierError::Transport("connection refused".into())));

        let scorer = SimilarityScorer::with_classifier(
            Arc::new(mock),
            Duration::from_secs(1),
            3,
            Duration::from_secs(60),
        );

        let current = item("a", Some("World"), &["un"]);
        let candidate = item("b", Some("World"), &["un"]);
        let outcome = scorer.score(&candidate, &current).await;

        assert_eq!(outcome.source, SimilaritySource::Heuristic);
        assert!((outcome.score - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_out_of_range_answer_falls_back() {
        let mut mock = MockSimilarityClassifier::new();
        mock.expect_similarity().returning(|_, _| Ok(7.5));

        let scorer = SimilarityScorer::with_classifier(
            Arc::new(mock),
            Duration::from_secs(1),
            3,
            Duration::from_secs(60),
        );

        let outcome = scorer
            .score(&item("b", None, &[]), &item("a", None, &[]))
            .await;
        assert_eq!(outcome.source, SimilaritySource::Heuristic);
        assert!((0.0..=1.0).contains(&outcome.score));
    }

    #[tokio::test]
    async fn test_breaker_skips_classifier_after_failures() {
        let mut mock = MockSimilarityClassifier::new();
        // Only two calls reach the classifier; the third is short-circuited
        mock.expect_similarity()
            .times(2)
            .returning(|_, _| Err(ClassifierError::InvalidResponse("n/a".into())));

        let scorer = SimilarityScorer::with_classifier(
            Arc::new(mock),
            Duration::from_secs(1),
            2,
            Duration::from_secs(600),
        );

        let a = item("a", None, &[]);
        let b = item("b", None, &[]);
        for _ in 0..3 {
            let outcome = scorer.score(&b, &a).await;
            assert_eq!(outcome.source, SimilaritySource::Heuristic);
        }
        assert_eq!(scorer.breaker_state(), BreakerState::Open);
    }

    /// Fails once, hangs once, then answers
    struct FailThenHang {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl SimilarityClassifier for FailThenHang {
        async fn similarity(&self, _: &ContentItem, _: &ContentItem) -> Result<f32> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            match call {
                0 => Err(ClassifierError::Transport("reset".into())),
                1 => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(0.1)
                }
                _ => Ok(0.6),
            }
        }
    }

    #[tokio::test]
    async fn test_cancelled_probe_does_not_lock_breaker() {
        let classifier = Arc::new(FailThenHang {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let scorer = SimilarityScorer::with_classifier(
            classifier.clone(),
            Duration::from_secs(10),
            1,
            Duration::from_millis(0),
        );
        let a = item("a", None, &[]);
        let b = item("b", None, &[]);

        scorer.score(&b, &a).await;
        assert_eq!(scorer.breaker_state(), BreakerState::Open);

        // The caller gives up on the half-open probe
        let cancelled = tokio::time::timeout(Duration::from_millis(50), scorer.score(&b, &a)).await;
        assert!(cancelled.is_err());

        let outcome = scorer.score(&b, &a).await;
        assert_eq!(outcome.source, SimilaritySource::Classifier);
        assert!((outcome.score - 0.6).abs() < 1e-6);
        assert_eq!(scorer.breaker_state(), BreakerState::Closed);
        assert_eq!(
            classifier.calls.load(std::sync::atomic::Ordering::SeqCst),
            3
        );
    }

    #[tokio::test]
    async fn test_heuristic_only_scorer() {
        let scorer = SimilarityScorer::heuristic();
        assert!(!scorer.has_classifier());

        let outcome = scorer
            .score(&item("b", Some("Tech"), &[]), &item("a", Some("Tech"), &[]))
            .await;
        assert_eq!(outcome.source, SimilaritySource::Heuristic);
        assert!((outcome.score - 0.5).abs() < 1e-6);
    }
}
