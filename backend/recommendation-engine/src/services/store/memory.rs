use super::{
    FeedbackRepository, IssuedRecommendation, IssuedRepository, PreferenceRepository, Result,
};
use crate::models::{RecommendationFeedback, RecommendationScore, UserPreferenceProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryPreferenceRepository {
    profiles: DashMap<String, UserPreferenceProfile>,
}

impl InMemoryPreferenceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceRepository for InMemoryPreferenceRepository {
    async fn load(&self, user_id: &str) -> Result<Option<UserPreferenceProfile>> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }

    async fn save(&self, profile: &UserPreferenceProfile) -> Result<()> {
        self.profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

/// Feedback log held in insertion order
pub struct InMemoryFeedbackRepository {
    entries: RwLock<VecDeque<RecommendationFeedback>>,
    max_entries: usize,
}

impl InMemoryFeedbackRepository {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl FeedbackRepository for InMemoryFeedbackRepository {
    async fn append(&self, feedback: RecommendationFeedback) -> Result<()> {
        let mut entries = self.entries.write();
        entries.push_back(feedback);

        let mut evicted = 0;
        while entries.len() > self.max_entries {
            entries.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted = evicted, capacity = self.max_entries, "Feedback log at capacity");
        }
        Ok(())
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<RecommendationFeedback>> {
        let mut listed: Vec<RecommendationFeedback> = self
            .entries
            .read()
            .iter()
            .filter(|f| f.created_at >= since)
            .cloned()
            .collect();
        listed.sort_by_key(|f| f.created_at);
        Ok(listed)
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|f| f.created_at >= cutoff);
        Ok(before - entries.len())
    }
}

#[derive(Default)]
pub struct InMemoryIssuedRepository {
    issued: DashMap<Uuid, IssuedRecommendation>,
}

impl InMemoryIssuedRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

#[async_trait]
impl IssuedRepository for InMemoryIssuedRepository {
    async fn record(&self, user_id: &str, scores: &[RecommendationScore]) -> Result<()> {
        for score in scores {
            self.issued.insert(
                score.recommendation_id,
                IssuedRecommendation::from_score(user_id, score),
            );
        }
        Ok(())
    }

    async fn get(&self, recommendation_id: Uuid) -> Result<Option<IssuedRecommendation>> {
        Ok(self.issued.get(&recommendation_id).map(|entry| entry.clone()))
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.issued.len();
        self.issued.retain(|_, issued| issued.issued_at >= cutoff);
        Ok(before - self.issued.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedbackContext, RecommendationCategory, SubScores, TimeOfDay};
    use chrono::Duration;

    fn entry(rating: u8, at: DateTime<Utc>) -> RecommendationFeedback {
        RecommendationFeedback {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            content_id: format!("c{}", rating),
            recommendation_id: Uuid::new_v4(),
            category: "World".to_string(),
            rating,
            helpful: None,
            comment: String::new(),
            reasons: Vec::new(),
            created_at: at,
            context: FeedbackContext {
                recommendation_score: 0.5,
                time_of_day: TimeOfDay::Morning,
                session_id: "s1".to_string(),
            },
        }
    }

    #[test]
    fn test_preferences_round_trip() {
        let repo = InMemoryPreferenceRepository::new();
        tokio_test::block_on(async {
            assert!(repo.load("u1").await.unwrap().is_none());

            let mut profile = UserPreferenceProfile::new("u1");
            profile.preferred_categories = vec!["Tech".to_string()];
            repo.save(&profile).await.unwrap();

            assert_eq!(repo.load("u1").await.unwrap(), Some(profile));
        });
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let repo = InMemoryFeedbackRepository::new(2);
        let now = Utc::now();
        for rating in 1..=3 {
            repo.append(entry(rating, now - Duration::minutes(10 - rating as i64)))
                .await
                .unwrap();
        }

        let listed = repo.list_since(now - Duration::days(1)).await.unwrap();
        let ratings: Vec<u8> = listed.iter().map(|f| f.rating).collect();
        assert_eq!(ratings, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_prune_and_list_since() {
        let repo = InMemoryFeedbackRepository::new(100);
        let now = Utc::now();
        repo.append(entry(5, now - Duration::days(200))).await.unwrap();
        repo.append(entry(4, now - Duration::days(2))).await.unwrap();
        repo.append(entry(3, now)).await.unwrap();

        assert_eq!(repo.list_since(now - Duration::days(7)).await.unwrap().len(), 2);
        assert_eq!(repo.prune(now - Duration::days(180)).await.unwrap(), 1);
        assert_eq!(repo.len(), 2);
    }

    fn scored(content_id: &str, at: DateTime<Utc>) -> RecommendationScore {
        RecommendationScore {
            recommendation_id: Uuid::new_v4(),
            content_id: content_id.to_string(),
            content_category: None,
            score: 0.4,
            reasons: Vec::new(),
            confidence: 0.4,
            category: RecommendationCategory::Personalized,
            sub_scores: SubScores::default(),
            scored_at: at,
        }
    }

    #[tokio::test]
    async fn test_issued_registry_prune() {
        let now = Utc::now();
        let registry = InMemoryIssuedRepository::new();
        let old = scored("old", now - Duration::days(10));
        let fresh = scored("fresh", now);
        registry
            .record("u1", &[old.clone(), fresh.clone()])
            .await
            .unwrap();
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.prune(now - Duration::days(1)).await.unwrap(), 1);
        assert!(registry.get(old.recommendation_id).await.unwrap().is_none());

        let issued = registry.get(fresh.recommendation_id).await.unwrap().unwrap();
        assert_eq!(issued.user_id, "u1");
        assert_eq!(issued.content_id, "fresh");
    }
}
