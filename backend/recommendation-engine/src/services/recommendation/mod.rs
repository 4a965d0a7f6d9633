// ============================================
// Recommendation Service
// ============================================
//
// Facade over the recommendation pipeline:
//   preferences → scoring → diversity re-rank → issued registry
//   feedback log → analytics → insights
//
// One scoring pass per viewing context is authoritative: when a newer pass
// starts for the same context, the older one reports `Superseded` instead of
// returning stale results. Only in-flight contexts are tracked.

use crate::config::{Config, ConfigError, ScoringConfig};
use crate::models::{
    BehaviorRecord, ContentItem, EngineWeights, RecommendationAnalytics, RecommendationFeedback,
    RecommendationScore, Timeframe, UserPreferenceProfile, WeightError,
};
use crate::services::diversity::DiversityLayer;
use crate::services::feedback::{FeedbackAggregator, ImprovementSuggestion};
use crate::services::insights::{InsightGenerator, RecommendationInsight};
use crate::services::scoring::ScoringEngine;
use crate::services::similarity::{build_classifier, SimilarityScorer};
use crate::services::store::{
    FeedbackRepository, InMemoryFeedbackRepository, InMemoryIssuedRepository,
    InMemoryPreferenceRepository, IssuedRepository, PreferenceRepository,
    RedisFeedbackRepository, RedisIssuedRepository, RedisPreferenceRepository, RetentionPolicy,
    StoreError,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RecommendationError {
    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error("Unknown recommendation: {0}")]
    UnknownRecommendation(Uuid),

    #[error("Invalid engine weights: {0}")]
    InvalidWeights(#[from] WeightError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, RecommendationError>;

/// Minimum spacing between sweeps of the issued registry on the recommend path
const ISSUED_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// One scoring request from a reader's viewing context
#[derive(Debug, Clone)]
pub struct RecommendationRequest {
    pub user_id: String,
    /// Page or widget the results land in; newer requests for the same
    /// context supersede older ones
    pub context_id: String,
    pub candidates: Vec<ContentItem>,
    pub behavior: BehaviorRecord,
    pub current_item_id: Option<String>,
    /// Overrides the configured result size
    pub target_size: Option<usize>,
}

impl RecommendationRequest {
    pub fn new(
        user_id: impl Into<String>,
        context_id: impl Into<String>,
        candidates: Vec<ContentItem>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            behavior: BehaviorRecord::new(user_id.clone()),
            user_id,
            context_id: context_id.into(),
            candidates,
            current_item_id: None,
            target_size: None,
        }
    }

    pub fn with_behavior(mut self, behavior: BehaviorRecord) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_current_item(mut self, content_id: impl Into<String>) -> Self {
        self.current_item_id = Some(content_id.into());
        self
    }

    pub fn with_target_size(mut self, target_size: usize) -> Self {
        self.target_size = Some(target_size);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecommendationOutcome {
    Fresh(Vec<RecommendationScore>),
    /// A newer request for the same viewing context started first
    Superseded,
}

impl RecommendationOutcome {
    pub fn is_superseded(&self) -> bool {
        matches!(self, RecommendationOutcome::Superseded)
    }

    pub fn into_scores(self) -> Option<Vec<RecommendationScore>> {
        match self {
            RecommendationOutcome::Fresh(scores) => Some(scores),
            RecommendationOutcome::Superseded => None,
        }
    }
}

pub struct RecommendationService {
    engine: ScoringEngine,
    weights: RwLock<EngineWeights>,
    preferences: Arc<dyn PreferenceRepository>,
    feedback: Arc<dyn FeedbackRepository>,
    issued: Arc<dyn IssuedRepository>,
    /// Latest generation per in-flight viewing context
    generations: DashMap<String, u64>,
    next_generation: AtomicU64,
    last_issued_prune: Mutex<Option<Instant>>,
    retention: RetentionPolicy,
    insights: InsightGenerator,
}

/// An in-flight scoring pass. Dropping it clears its context entry unless a
/// newer pass has taken the context over.
struct ScoringPass<'a> {
    generations: &'a DashMap<String, u64>,
    context_id: String,
    generation: u64,
}

impl ScoringPass<'_> {
    fn is_current(&self) -> bool {
        self.generations
            .get(&self.context_id)
            .map(|current| *current == self.generation)
            .unwrap_or(false)
    }
}

impl Drop for ScoringPass<'_> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.generations
            .remove_if(&self.context_id, |_, current| *current == generation);
    }
}

impl RecommendationService {
    pub fn new(
        engine: ScoringEngine,
        weights: EngineWeights,
        preferences: Arc<dyn PreferenceRepository>,
        feedback: Arc<dyn FeedbackRepository>,
        issued: Arc<dyn IssuedRepository>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            engine,
            weights: RwLock::new(weights),
            preferences,
            feedback,
            issued,
            generations: DashMap::new(),
            next_generation: AtomicU64::new(0),
            last_issued_prune: Mutex::new(None),
            retention,
            insights: InsightGenerator::default(),
        }
    }

    /// In-memory stores and heuristic similarity
    pub fn in_memory(scoring: ScoringConfig, weights: EngineWeights) -> Self {
        let retention = RetentionPolicy::default();
        Self::new(
            ScoringEngine::heuristic(scoring),
            weights,
            Arc::new(InMemoryPreferenceRepository::new()),
            Arc::new(InMemoryFeedbackRepository::new(retention.max_entries)),
            Arc::new(InMemoryIssuedRepository::new()),
            retention,
        )
    }

    /// Wire the service from configuration: LLM classifier when enabled,
    /// Redis stores when `REDIS_URL` is set, in-memory stores otherwise.
    /// Replicas sharing one Redis accept feedback for each other's
    /// recommendations.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let classifier = build_classifier(&config.llm);
        let similarity = Arc::new(SimilarityScorer::from_config(&config.llm, classifier));
        let engine = ScoringEngine::new(similarity, config.scoring.clone());
        let retention = RetentionPolicy::from(&config.retention);

        let (preferences, feedback, issued): (
            Arc<dyn PreferenceRepository>,
            Arc<dyn FeedbackRepository>,
            Arc<dyn IssuedRepository>,
        ) = match config.store.redis_url.as_deref() {
            Some(url) => {
                let client = redis::Client::open(url)
                    .map_err(|e| StoreError::Backend(format!("invalid Redis URL: {}", e)))?;
                info!("Using Redis preference, feedback and issued stores");
                (
                    Arc::new(RedisPreferenceRepository::new(client.clone())),
                    Arc::new(RedisFeedbackRepository::new(
                        client.clone(),
                        retention.max_entries,
                    )),
                    Arc::new(RedisIssuedRepository::new(client, retention.max_age)),
                )
            }
            None => {
                info!("REDIS_URL not set, using in-memory stores");
                (
                    Arc::new(InMemoryPreferenceRepository::new()),
                    Arc::new(InMemoryFeedbackRepository::new(retention.max_entries)),
                    Arc::new(InMemoryIssuedRepository::new()),
                )
            }
        };

        Ok(Self::new(
            engine,
            config.weights,
            preferences,
            feedback,
            issued,
            retention,
        ))
    }

    // ============================================
    // Recommendations
    // ============================================

    pub async fn recommend(&self, request: RecommendationRequest) -> Result<RecommendationOutcome> {
        self.recommend_at(request, Utc::now()).await
    }

    /// Score, re-rank and register recommendations as of `now`
    pub async fn recommend_at(
        &self,
        request: RecommendationRequest,
        now: DateTime<Utc>,
    ) -> Result<RecommendationOutcome> {
        let pass = self.begin_pass(&request.context_id);
        let profile = self.preferences(&request.user_id).await?;
        let weights = self.weights();
        let target_size = request
            .target_size
            .unwrap_or(self.engine.config().target_size);

        let scored = self
            .engine
            .score_candidates(
                &request.candidates,
                &profile,
                &request.behavior,
                request.current_item_id.as_deref(),
                &weights,
                now,
            )
            .await;

        if !pass.is_current() {
            warn!(
                user_id = %request.user_id,
                context_id = %request.context_id,
                generation = pass.generation,
                "Scoring pass superseded by a newer request"
            );
            return Ok(RecommendationOutcome::Superseded);
        }

        let ranked = if weights.diversity_factor > 0.0 {
            DiversityLayer::new(target_size).rerank(scored)
        } else {
            let mut top = scored;
            top.truncate(target_size);
            top
        };

        self.register_issued(&request.user_id, &ranked, now).await?;

        info!(
            user_id = %request.user_id,
            context_id = %request.context_id,
            candidates = request.candidates.len(),
            returned = ranked.len(),
            "Recommendations issued"
        );

        Ok(RecommendationOutcome::Fresh(ranked))
    }

    fn begin_pass(&self, context_id: &str) -> ScoringPass<'_> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.generations
            .entry(context_id.to_string())
            .and_modify(|current| *current = (*current).max(generation))
            .or_insert(generation);

        ScoringPass {
            generations: &self.generations,
            context_id: context_id.to_string(),
            generation,
        }
    }

    /// Register issued ids for feedback validation, skipping passes already
    /// outside the retention window, and sweep expired ids now and then
    async fn register_issued(
        &self,
        user_id: &str,
        ranked: &[RecommendationScore],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let cutoff = self.retention.cutoff(Utc::now());
        if now >= cutoff {
            self.issued.record(user_id, ranked).await?;
        } else {
            debug!(
                user_id = %user_id,
                scored_at = %now,
                "Pass predates retention window, ids not registered"
            );
        }

        if self.issued_prune_due() {
            let forgotten = self.issued.prune(cutoff).await?;
            if forgotten > 0 {
                debug!(forgotten = forgotten, "Pruned issued recommendations");
            }
        }
        Ok(())
    }

    fn issued_prune_due(&self) -> bool {
        let mut last = self.last_issued_prune.lock();
        let due = last.map_or(true, |at| at.elapsed() >= ISSUED_PRUNE_INTERVAL);
        if due {
            *last = Some(Instant::now());
        }
        due
    }

    // ============================================
    // Feedback
    // ============================================

    /// Record a reader evaluation of an issued recommendation
    pub async fn record_feedback(&self, feedback: RecommendationFeedback) -> Result<()> {
        if !(1..=5).contains(&feedback.rating) {
            return Err(RecommendationError::InvalidFeedback(format!(
                "rating {} outside 1-5",
                feedback.rating
            )));
        }

        let issued = self
            .issued
            .get(feedback.recommendation_id)
            .await?
            .ok_or(RecommendationError::UnknownRecommendation(
                feedback.recommendation_id,
            ))?;

        if issued.content_id != feedback.content_id || issued.user_id != feedback.user_id {
            return Err(RecommendationError::InvalidFeedback(format!(
                "recommendation {} was issued for a different reader or article",
                feedback.recommendation_id
            )));
        }

        debug!(
            user_id = %feedback.user_id,
            recommendation_id = %feedback.recommendation_id,
            rating = feedback.rating,
            "Recording feedback"
        );

        self.feedback.append(feedback).await?;

        let cutoff = self.retention.cutoff(Utc::now());
        let pruned = self.feedback.prune(cutoff).await?;
        let forgotten = self.issued.prune(cutoff).await?;
        if pruned > 0 || forgotten > 0 {
            debug!(pruned = pruned, forgotten = forgotten, "Applied feedback retention");
        }

        Ok(())
    }

    pub async fn compute_analytics(
        &self,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<RecommendationAnalytics> {
        let log = self.feedback.list_since(now - timeframe.span()).await?;
        Ok(FeedbackAggregator::compute_analytics(&log, timeframe, now))
    }

    pub async fn improvement_suggestions(
        &self,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<Vec<ImprovementSuggestion>> {
        let analytics = self.compute_analytics(timeframe, now).await?;
        Ok(FeedbackAggregator::improvement_suggestions(&analytics))
    }

    /// Insights for the window ending at `now` compared with the one before
    pub async fn insights(
        &self,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecommendationInsight>> {
        let log = self
            .feedback
            .list_since(now - timeframe.span() - timeframe.span())
            .await?;
        Ok(self.insights.from_feedback(&log, timeframe, now))
    }

    // ============================================
    // Preferences & weights
    // ============================================

    /// Stored profile, or the default profile saved on first access
    pub async fn preferences(&self, user_id: &str) -> Result<UserPreferenceProfile> {
        if let Some(profile) = self.preferences.load(user_id).await? {
            return Ok(profile);
        }

        let profile = UserPreferenceProfile::new(user_id);
        self.preferences.save(&profile).await?;
        debug!(user_id = %user_id, "Created default preference profile");
        Ok(profile)
    }

    pub async fn update_preferences(&self, profile: UserPreferenceProfile) -> Result<()> {
        self.preferences.save(&profile).await?;
        info!(
            user_id = %profile.user_id,
            categories = profile.preferred_categories.len(),
            "Preferences updated"
        );
        Ok(())
    }

    pub fn weights(&self) -> EngineWeights {
        *self.weights.read()
    }

    pub fn update_weights(&self, weights: EngineWeights) -> Result<()> {
        weights.validate()?;
        *self.weights.write() = weights;
        info!(?weights, "Engine weights updated");
        Ok(())
    }
}
