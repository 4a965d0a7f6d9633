use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

// ============================================
// Content
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EditorialPriority {
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "ar")]
    Arabic,
    #[serde(rename = "en")]
    English,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Engagement counters snapshot. Counters only grow over an item's lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContentAnalytics {
    pub views: u64,
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
    /// Average read time in seconds
    pub avg_read_time: f32,
    /// Click-through rate (0.0 - 1.0)
    pub click_through_rate: f32,
}

/// A news article as seen by the recommendation engine (read-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub body: String,
    pub category: Option<Category>,
    pub tags: Vec<String>,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub analytics: Option<ContentAnalytics>,
    pub priority: EditorialPriority,
    pub language: Language,
    pub featured_image: Option<String>,
}

impl ContentItem {
    pub fn category_name(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.name.as_str())
    }

    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published
    }

    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }

    /// Estimated read time in minutes at the given reading speed
    pub fn estimated_read_minutes(&self, words_per_minute: u32) -> f32 {
        if words_per_minute == 0 {
            return 0.0;
        }
        self.word_count() as f32 / words_per_minute as f32
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f32 {
        let age = now - self.created_at;
        (age.num_seconds().max(0) as f32) / 3600.0
    }
}

// ============================================
// Users
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadingLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl ReadingLength {
    /// Bucket for an estimated read time: short < 3 min, medium 3-7 min, long > 7 min
    pub fn from_minutes(minutes: f32) -> Self {
        if minutes < 3.0 {
            ReadingLength::Short
        } else if minutes <= 7.0 {
            ReadingLength::Medium
        } else {
            ReadingLength::Long
        }
    }

    fn rank(self) -> i8 {
        match self {
            ReadingLength::Short => 0,
            ReadingLength::Medium => 1,
            ReadingLength::Long => 2,
        }
    }

    pub fn is_adjacent(self, other: Self) -> bool {
        (self.rank() - other.rank()).abs() == 1
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    #[default]
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self::from_hour(time.hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

/// Declared reader preferences. Created lazily with defaults on first use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreferenceProfile {
    pub user_id: String,
    pub preferred_categories: Vec<String>,
    pub reading_length: ReadingLength,
    pub language: Language,
    pub time_of_day: TimeOfDay,
}

impl UserPreferenceProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            preferred_categories: Vec::new(),
            reading_length: ReadingLength::default(),
            language: Language::default(),
            time_of_day: TimeOfDay::default(),
        }
    }

    pub fn prefers_category(&self, name: &str) -> bool {
        self.preferred_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Past reading behaviour, maintained by the analytics pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorRecord {
    pub user_id: String,
    pub read: HashSet<String>,
    pub liked: HashSet<String>,
    pub shared: HashSet<String>,
    /// Rolling average read time in seconds
    pub avg_read_time: f32,
    pub active_hours: Vec<u8>,
}

impl BehaviorRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

// ============================================
// Scoring
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Trending,
    Personalized,
    Similar,
    Editorial,
}

impl RecommendationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationCategory::Trending => "trending",
            RecommendationCategory::Personalized => "personalized",
            RecommendationCategory::Similar => "similar",
            RecommendationCategory::Editorial => "editorial",
        }
    }
}

/// The five normalized components of a recommendation score, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SubScores {
    pub personalized: f32,
    pub trending: f32,
    pub similarity: f32,
    pub editorial: f32,
    pub recency: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationScore {
    pub recommendation_id: Uuid,
    pub content_id: String,
    /// Content category name of the candidate, used for diversity
    pub content_category: Option<String>,
    pub score: f32,
    pub reasons: Vec<String>,
    pub confidence: f32,
    pub category: RecommendationCategory,
    pub sub_scores: SubScores,
    pub scored_at: DateTime<Utc>,
}

/// Tunable engine weights.
///
/// `personalized`, `trending`, `similarity` and `editorial` are percentages in
/// [0, 100] and are divided by 100 when applied. `recency_boost` is a direct
/// fraction in [0, 1] added on top. No sum constraint is enforced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EngineWeights {
    #[serde(default = "default_personalized")]
    pub personalized: f32,
    #[serde(default = "default_trending")]
    pub trending: f32,
    #[serde(default = "default_similarity")]
    pub similarity: f32,
    #[serde(default = "default_editorial")]
    pub editorial: f32,
    #[serde(default = "default_diversity_factor")]
    pub diversity_factor: f32,
    #[serde(default = "default_recency_boost")]
    pub recency_boost: f32,
}

fn default_personalized() -> f32 {
    40.0
}
fn default_trending() -> f32 {
    30.0
}
fn default_similarity() -> f32 {
    20.0
}
fn default_editorial() -> f32 {
    10.0
}
fn default_diversity_factor() -> f32 {
    0.3
}
fn default_recency_boost() -> f32 {
    0.2
}

impl Default for EngineWeights {
    fn default() -> Self {
        Self {
            personalized: default_personalized(),
            trending: default_trending(),
            similarity: default_similarity(),
            editorial: default_editorial(),
            diversity_factor: default_diversity_factor(),
            recency_boost: default_recency_boost(),
        }
    }
}

/// A weight outside its allowed range
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field} weight {value} is outside [{min}, {max}]")]
pub struct WeightError {
    pub field: &'static str,
    pub value: f32,
    pub min: f32,
    pub max: f32,
}

impl EngineWeights {
    /// Check each weight against its range, reporting the first offender
    pub fn validate(&self) -> Result<(), WeightError> {
        let percentages = [
            ("personalized", self.personalized),
            ("trending", self.trending),
            ("similarity", self.similarity),
            ("editorial", self.editorial),
        ];
        for (field, value) in percentages {
            if !(0.0..=100.0).contains(&value) {
                return Err(WeightError {
                    field,
                    value,
                    min: 0.0,
                    max: 100.0,
                });
            }
        }

        let factors = [
            ("diversity_factor", self.diversity_factor),
            ("recency_boost", self.recency_boost),
        ];
        for (field, value) in factors {
            if !(0.0..=1.0).contains(&value) {
                return Err(WeightError {
                    field,
                    value,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }

        Ok(())
    }
}

// ============================================
// Feedback
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackContext {
    /// Recommendation score at the time the feedback was given
    pub recommendation_score: f32,
    pub time_of_day: TimeOfDay,
    pub session_id: String,
}

/// A single reader evaluation of a recommendation. Never mutated once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationFeedback {
    pub id: Uuid,
    pub user_id: String,
    pub content_id: String,
    pub recommendation_id: Uuid,
    /// Content category name of the rated item
    pub category: String,
    /// Star rating 1-5
    pub rating: u8,
    /// None when the reader did not vote
    pub helpful: Option<bool>,
    pub comment: String,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub context: FeedbackContext,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Day,
    Week,
    Month,
    Quarter,
}

impl Timeframe {
    pub fn span(&self) -> Duration {
        match self {
            Timeframe::Day => Duration::days(1),
            Timeframe::Week => Duration::days(7),
            Timeframe::Month => Duration::days(30),
            Timeframe::Quarter => Duration::days(90),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Quarter => "quarter",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryPerformance {
    pub avg_rating: f32,
    pub count: u32,
    pub helpfulness_rate: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeSlotPerformance {
    pub avg_rating: f32,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasonFrequency {
    pub reason: String,
    pub count: u32,
}

/// Aggregated feedback over one timeframe window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationAnalytics {
    pub timeframe: Timeframe,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_evaluations: u32,
    pub average_rating: f32,
    pub helpfulness_rate: f32,
    /// Entries carrying a helpful/unhelpful vote; 0 means the rate is undefined
    pub helpfulness_votes: u32,
    pub category_performance: BTreeMap<String, CategoryPerformance>,
    pub time_slot_performance: BTreeMap<TimeOfDay, TimeSlotPerformance>,
    /// Representative comments from ratings >= 4
    pub positive_feedback: Vec<String>,
    /// Representative comments from ratings <= 2
    pub negative_feedback: Vec<String>,
    pub common_reasons: Vec<ReasonFrequency>,
}

impl RecommendationAnalytics {
    pub fn empty(timeframe: Timeframe, window_end: DateTime<Utc>) -> Self {
        Self {
            timeframe,
            window_start: window_end - timeframe.span(),
            window_end,
            total_evaluations: 0,
            average_rating: 0.0,
            helpfulness_rate: 0.0,
            helpfulness_votes: 0,
            category_performance: BTreeMap::new(),
            time_slot_performance: BTreeMap::new(),
            positive_feedback: Vec::new(),
            negative_feedback: Vec::new(),
            common_reasons: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reading_length_buckets() {
        assert_eq!(ReadingLength::from_minutes(1.0), ReadingLength::Short);
        assert_eq!(ReadingLength::from_minutes(3.0), ReadingLength::Medium);
        assert_eq!(ReadingLength::from_minutes(7.0), ReadingLength::Medium);
        assert_eq!(ReadingLength::from_minutes(7.5), ReadingLength::Long);

        assert!(ReadingLength::Short.is_adjacent(ReadingLength::Medium));
        assert!(!ReadingLength::Short.is_adjacent(ReadingLength::Long));
        assert!(!ReadingLength::Long.is_adjacent(ReadingLength::Long));
    }

    #[test]
    fn test_time_of_day_buckets() {
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(20), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(23), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(2), TimeOfDay::Night);

        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(TimeOfDay::at(at), TimeOfDay::Morning);
    }

    #[test]
    fn test_weights_validation() {
        assert!(EngineWeights::default().validate().is_ok());

        let too_heavy = EngineWeights {
            trending: 120.0,
            ..Default::default()
        };
        let err = too_heavy.validate().unwrap_err();
        assert_eq!(err.field, "trending");
        assert_eq!(err.value, 120.0);
        assert_eq!(err.max, 100.0);
        assert!(err.to_string().contains("trending"));

        let bad_boost = EngineWeights {
            recency_boost: 1.5,
            ..Default::default()
        };
        let err = bad_boost.validate().unwrap_err();
        assert_eq!(err.field, "recency_boost");
        assert_eq!(err.max, 1.0);
    }

    #[test]
    fn test_language_serde_codes() {
        assert_eq!(serde_json::to_string(&Language::Arabic).unwrap(), "\"ar\"");
        let parsed: Language = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(parsed, Language::English);
    }

    #[test]
    fn test_profile_category_match_ignores_case() {
        let mut profile = UserPreferenceProfile::new("u1");
        profile.preferred_categories.push("Sports".to_string());
        assert!(profile.prefers_category("sports"));
        assert!(!profile.prefers_category("World"));
    }
}
