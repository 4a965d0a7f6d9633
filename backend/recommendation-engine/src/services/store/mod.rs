// ============================================
// Preference & Feedback Storage
// ============================================
//
// Typed repositories for the mutable stores:
// 1. Preference profiles - one per user, load/save
// 2. Feedback log - append only, bounded by age and capacity
// 3. Issued recommendations - ids handed out, kept for the retention window
//
// In-memory implementations back tests and single-process hosts; Redis
// implementations back shared deployments.

pub mod memory;
pub mod redis_store;

pub use memory::{
    InMemoryFeedbackRepository, InMemoryIssuedRepository, InMemoryPreferenceRepository,
};
pub use redis_store::{
    RedisFeedbackRepository, RedisIssuedRepository, RedisPreferenceRepository,
};

use crate::config::RetentionConfig;
use crate::models::{RecommendationFeedback, RecommendationScore, UserPreferenceProfile};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const PREFERENCES_KEY_PREFIX: &str = "user-preferences";
pub const FEEDBACK_KEY: &str = "recommendation-feedbacks";
pub const ISSUED_KEY_PREFIX: &str = "issued-recommendation";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// None when the user has never saved preferences
    async fn load(&self, user_id: &str) -> Result<Option<UserPreferenceProfile>>;

    async fn save(&self, profile: &UserPreferenceProfile) -> Result<()>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Append one entry. Implementations evict the oldest entries beyond
    /// their capacity.
    async fn append(&self, feedback: RecommendationFeedback) -> Result<()>;

    /// Entries created at or after `since`, oldest first
    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<RecommendationFeedback>>;

    /// Drop entries created before `cutoff`, returning how many were removed
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Registry of recommendation ids handed out, so feedback can be checked
/// against a previously issued score. Shared between replicas when backed
/// by Redis.
#[async_trait]
pub trait IssuedRepository: Send + Sync {
    async fn record(&self, user_id: &str, scores: &[RecommendationScore]) -> Result<()>;

    async fn get(&self, recommendation_id: Uuid) -> Result<Option<IssuedRecommendation>>;

    /// Forget recommendations issued before `cutoff`, returning how many
    /// were removed
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Age and capacity bounds for the feedback log
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_entries: usize,
}

impl RetentionPolicy {
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.max_age
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            max_age: Duration::days(config.retention_days),
            max_entries: config.max_entries.max(1),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

pub fn preferences_key(user_id: &str) -> String {
    format!("{}:{}", PREFERENCES_KEY_PREFIX, user_id)
}

pub fn issued_key(recommendation_id: &Uuid) -> String {
    format!("{}:{}", ISSUED_KEY_PREFIX, recommendation_id)
}

// ============================================
// Issued Recommendations
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedRecommendation {
    pub user_id: String,
    pub content_id: String,
    pub score: f32,
    pub issued_at: DateTime<Utc>,
}

impl IssuedRecommendation {
    pub fn from_score(user_id: &str, score: &RecommendationScore) -> Self {
        Self {
            user_id: user_id.to_string(),
            content_id: score.content_id.clone(),
            score: score.score,
            issued_at: score.scored_at,
        }
    }
}
