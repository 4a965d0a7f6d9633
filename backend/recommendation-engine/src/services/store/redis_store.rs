use super::{
    issued_key, preferences_key, FeedbackRepository, IssuedRecommendation, IssuedRepository,
    PreferenceRepository, Result, FEEDBACK_KEY,
};
use crate::models::{RecommendationFeedback, RecommendationScore, UserPreferenceProfile};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;

/// Profiles stored as JSON strings under `user-preferences:{user_id}`
pub struct RedisPreferenceRepository {
    redis: redis::Client,
}

impl RedisPreferenceRepository {
    pub fn new(redis: redis::Client) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl PreferenceRepository for RedisPreferenceRepository {
    async fn load(&self, user_id: &str) -> Result<Option<UserPreferenceProfile>> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("connecting to Redis")?;

        let raw: Option<String> = conn
            .get(preferences_key(user_id))
            .await
            .with_context(|| format!("loading preferences for {}", user_id))?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, profile: &UserPreferenceProfile) -> Result<()> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("connecting to Redis")?;

        let json = serde_json::to_string(profile)?;
        let _: () = conn
            .set(preferences_key(&profile.user_id), json)
            .await
            .with_context(|| format!("saving preferences for {}", profile.user_id))?;

        debug!(user_id = %profile.user_id, "Saved preference profile");
        Ok(())
    }
}

/// Feedback log as a sorted set scored by creation time in milliseconds
pub struct RedisFeedbackRepository {
    redis: redis::Client,
    max_entries: usize,
}

impl RedisFeedbackRepository {
    pub fn new(redis: redis::Client, max_entries: usize) -> Self {
        Self {
            redis,
            max_entries: max_entries.max(1),
        }
    }
}

#[async_trait]
impl FeedbackRepository for RedisFeedbackRepository {
    async fn append(&self, feedback: RecommendationFeedback) -> Result<()> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("connecting to Redis")?;

        let json = serde_json::to_string(&feedback)?;
        let _: () = conn
            .zadd(FEEDBACK_KEY, json, feedback.created_at.timestamp_millis())
            .await
            .context("appending feedback")?;

        // Keep only the newest `max_entries`
        let keep_from = -(self.max_entries as isize) - 1;
        let evicted: usize = conn
            .zremrangebyrank(FEEDBACK_KEY, 0, keep_from)
            .await
            .context("trimming feedback log")?;
        if evicted > 0 {
            debug!(evicted = evicted, capacity = self.max_entries, "Feedback log at capacity");
        }

        Ok(())
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<RecommendationFeedback>> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("connecting to Redis")?;

        let raw: Vec<String> = conn
            .zrangebyscore(FEEDBACK_KEY, since.timestamp_millis(), "+inf")
            .await
            .context("listing feedback")?;

        let feedback = raw
            .iter()
            .filter_map(|json| match serde_json::from_str(json) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed feedback entry");
                    None
                }
            })
            .collect();

        Ok(feedback)
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("connecting to Redis")?;

        let removed: usize = conn
            .zrembyscore(FEEDBACK_KEY, "-inf", format!("({}", cutoff.timestamp_millis()))
            .await
            .context("pruning feedback log")?;

        Ok(removed)
    }
}

/// Issued recommendations as JSON under `issued-recommendation:{id}`,
/// expiring once they fall out of the retention window
pub struct RedisIssuedRepository {
    redis: redis::Client,
    max_age: Duration,
}

impl RedisIssuedRepository {
    pub fn new(redis: redis::Client, max_age: Duration) -> Self {
        Self { redis, max_age }
    }
}

#[async_trait]
impl IssuedRepository for RedisIssuedRepository {
    async fn record(&self, user_id: &str, scores: &[RecommendationScore]) -> Result<()> {
        let now = Utc::now();
        let mut pipe = redis::pipe();
        let mut queued = 0;

        for score in scores {
            let ttl = (score.scored_at + self.max_age - now).num_seconds();
            if ttl <= 0 {
                continue;
            }
            let json = serde_json::to_string(&IssuedRecommendation::from_score(user_id, score))?;
            pipe.set_ex(issued_key(&score.recommendation_id), json, ttl as u64)
                .ignore();
            queued += 1;
        }

        if queued == 0 {
            return Ok(());
        }

        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("connecting to Redis")?;

        pipe.query_async::<_, ()>(&mut conn)
            .await
            .context("recording issued recommendations")?;

        debug!(user_id = %user_id, count = queued, "Recorded issued recommendations");
        Ok(())
    }

    async fn get(&self, recommendation_id: Uuid) -> Result<Option<IssuedRecommendation>> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("connecting to Redis")?;

        let raw: Option<String> = conn
            .get(issued_key(&recommendation_id))
            .await
            .with_context(|| format!("loading issued recommendation {}", recommendation_id))?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn prune(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        // Keys expire on their own TTL
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedbackContext, RecommendationCategory, SubScores, TimeOfDay};

    async fn redis_client() -> Option<redis::Client> {
        let client = redis::Client::open("redis://127.0.0.1:6379").ok()?;
        match client.get_multiplexed_async_connection().await {
            Ok(_) => Some(client),
            Err(_) => {
                println!("Redis not available, skipping test");
                None
            }
        }
    }

    #[tokio::test]
    async fn test_preferences_round_trip() {
        let Some(client) = redis_client().await else {
            return;
        };
        let repo = RedisPreferenceRepository::new(client);

        let user_id = format!("test-{}", Uuid::new_v4());
        assert!(repo.load(&user_id).await.unwrap().is_none());

        let mut profile = UserPreferenceProfile::new(user_id.as_str());
        profile.preferred_categories = vec!["Economy".to_string()];
        repo.save(&profile).await.unwrap();
        assert_eq!(repo.load(&user_id).await.unwrap(), Some(profile));
    }

    #[tokio::test]
    async fn test_feedback_append_and_list() {
        let Some(client) = redis_client().await else {
            return;
        };
        let repo = RedisFeedbackRepository::new(client, 10_000);

        let now = Utc::now();
        let feedback = RecommendationFeedback {
            id: Uuid::new_v4(),
            user_id: "redis-test".to_string(),
            content_id: "c1".to_string(),
            recommendation_id: Uuid::new_v4(),
            category: "World".to_string(),
            rating: 4,
            helpful: Some(true),
            comment: "useful".to_string(),
            reasons: vec!["relevant".to_string()],
            created_at: now,
            context: FeedbackContext {
                recommendation_score: 0.7,
                time_of_day: TimeOfDay::at(now),
                session_id: "s1".to_string(),
            },
        };
        repo.append(feedback.clone()).await.unwrap();

        let listed = repo.list_since(now).await.unwrap();
        assert!(listed.iter().any(|f| f.id == feedback.id));
    }

    #[tokio::test]
    async fn test_issued_visible_to_second_client() {
        let Some(client) = redis_client().await else {
            return;
        };
        let writer = RedisIssuedRepository::new(client.clone(), Duration::days(180));
        let reader = RedisIssuedRepository::new(client, Duration::days(180));

        let now = Utc::now();
        let fresh = RecommendationScore {
            recommendation_id: Uuid::new_v4(),
            content_id: "c1".to_string(),
            content_category: Some("World".to_string()),
            score: 0.62,
            reasons: Vec::new(),
            confidence: 0.7,
            category: RecommendationCategory::Personalized,
            sub_scores: SubScores::default(),
            scored_at: now,
        };
        let mut expired = fresh.clone();
        expired.recommendation_id = Uuid::new_v4();
        expired.scored_at = now - Duration::days(365);

        writer
            .record("redis-reader", &[fresh.clone(), expired.clone()])
            .await
            .unwrap();

        let issued = reader.get(fresh.recommendation_id).await.unwrap().unwrap();
        assert_eq!(issued.user_id, "redis-reader");
        assert_eq!(issued.content_id, "c1");
        assert!(reader.get(expired.recommendation_id).await.unwrap().is_none());
    }
}
