// ============================================
// Feedback Aggregator
// ============================================
//
// Turns the raw feedback log into per-timeframe analytics and a short list of
// deterministic improvement suggestions. Pure functions over the log; storage
// lives in `services::store`.

use crate::models::{
    CategoryPerformance, RecommendationAnalytics, RecommendationFeedback, ReasonFrequency,
    Timeframe, TimeSlotPerformance,
};
use crate::utils::{normalize_text, safe_ratio};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Representative comments returned per polarity
const REPRESENTATIVE_COMMENTS: usize = 5;
/// Reason tags returned in `common_reasons`
const TOP_REASONS: usize = 5;

const ACCURACY_THRESHOLD: f32 = 3.5;
const RELEVANCE_THRESHOLD: f32 = 0.7;
const CATEGORY_THRESHOLD: f32 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImprovementSuggestion {
    /// Mean rating below 3.5
    ImproveAccuracy { average_rating: f32 },
    /// Helpfulness rate below 0.7, with at least one vote cast
    ImproveRelevance { helpfulness_rate: f32 },
    /// Categories whose mean rating is below 3.0
    UnderperformingCategories { categories: Vec<String> },
}

impl ImprovementSuggestion {
    pub fn message(&self) -> String {
        match self {
            Self::ImproveAccuracy { average_rating } => format!(
                "Improve algorithm accuracy: average rating is {:.2}",
                average_rating
            ),
            Self::ImproveRelevance { helpfulness_rate } => format!(
                "Improve relevance: only {:.0}% of votes found recommendations helpful",
                helpfulness_rate * 100.0
            ),
            Self::UnderperformingCategories { categories } => format!(
                "Underperforming categories: {}",
                categories.join(", ")
            ),
        }
    }
}

#[derive(Default)]
struct RatingAccumulator {
    rating_sum: u64,
    count: u32,
    helpful: u32,
    votes: u32,
}

impl RatingAccumulator {
    fn add(&mut self, feedback: &RecommendationFeedback) {
        self.rating_sum += u64::from(feedback.rating);
        self.count += 1;
        if let Some(helpful) = feedback.helpful {
            self.votes += 1;
            if helpful {
                self.helpful += 1;
            }
        }
    }

    fn average(&self) -> f32 {
        safe_ratio(self.rating_sum as f64, f64::from(self.count))
    }

    fn helpfulness(&self) -> f32 {
        safe_ratio(f64::from(self.helpful), f64::from(self.votes))
    }
}

struct CommentCluster<'a> {
    size: usize,
    latest_at: DateTime<Utc>,
    latest_text: &'a str,
}

/// Feedback Aggregator
pub struct FeedbackAggregator;

impl FeedbackAggregator {
    /// Feedback inside the half-open window `(now - span, now]`
    pub fn in_window<'a>(
        log: &'a [RecommendationFeedback],
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a RecommendationFeedback> + 'a {
        let start = now - timeframe.span();
        log.iter()
            .filter(move |f| f.created_at > start && f.created_at <= now)
    }

    /// Aggregate the feedback log over one timeframe ending at `now`.
    ///
    /// An empty window yields zeroed rates and empty maps.
    pub fn compute_analytics(
        log: &[RecommendationFeedback],
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> RecommendationAnalytics {
        let window: Vec<&RecommendationFeedback> = Self::in_window(log, timeframe, now).collect();
        let mut analytics = RecommendationAnalytics::empty(timeframe, now);

        if window.is_empty() {
            debug!(timeframe = timeframe.as_str(), "No feedback in window");
            return analytics;
        }

        let mut overall = RatingAccumulator::default();
        let mut by_category: BTreeMap<String, RatingAccumulator> = BTreeMap::new();
        let mut by_slot: BTreeMap<_, RatingAccumulator> = BTreeMap::new();

        for feedback in &window {
            overall.add(feedback);
            by_category
                .entry(feedback.category.clone())
                .or_default()
                .add(feedback);
            by_slot
                .entry(feedback.context.time_of_day)
                .or_default()
                .add(feedback);
        }

        analytics.total_evaluations = overall.count;
        analytics.average_rating = overall.average();
        analytics.helpfulness_rate = overall.helpfulness();
        analytics.helpfulness_votes = overall.votes;

        analytics.category_performance = by_category
            .into_iter()
            .map(|(category, acc)| {
                (
                    category,
                    CategoryPerformance {
                        avg_rating: acc.average(),
                        count: acc.count,
                        helpfulness_rate: acc.helpfulness(),
                    },
                )
            })
            .collect();

        analytics.time_slot_performance = by_slot
            .into_iter()
            .map(|(slot, acc)| {
                (
                    slot,
                    TimeSlotPerformance {
                        avg_rating: acc.average(),
                        count: acc.count,
                    },
                )
            })
            .collect();

        analytics.positive_feedback =
            representative_comments(window.iter().copied().filter(|f| f.rating >= 4));
        analytics.negative_feedback =
            representative_comments(window.iter().copied().filter(|f| f.rating <= 2));
        analytics.common_reasons = common_reasons(&window);

        debug!(
            timeframe = timeframe.as_str(),
            total = analytics.total_evaluations,
            average_rating = analytics.average_rating,
            helpfulness_rate = analytics.helpfulness_rate,
            "Feedback analytics computed"
        );

        analytics
    }

    /// Deterministic advisory rules; nothing is suggested for an empty window
    pub fn improvement_suggestions(analytics: &RecommendationAnalytics) -> Vec<ImprovementSuggestion> {
        if analytics.total_evaluations == 0 {
            return Vec::new();
        }

        let mut suggestions = Vec::new();

        if analytics.average_rating < ACCURACY_THRESHOLD {
            suggestions.push(ImprovementSuggestion::ImproveAccuracy {
                average_rating: analytics.average_rating,
            });
        }

        if analytics.helpfulness_votes > 0 && analytics.helpfulness_rate < RELEVANCE_THRESHOLD {
            suggestions.push(ImprovementSuggestion::ImproveRelevance {
                helpfulness_rate: analytics.helpfulness_rate,
            });
        }

        let weak: Vec<String> = analytics
            .category_performance
            .iter()
            .filter(|(_, perf)| perf.count > 0 && perf.avg_rating < CATEGORY_THRESHOLD)
            .map(|(category, _)| category.clone())
            .collect();
        if !weak.is_empty() {
            suggestions.push(ImprovementSuggestion::UnderperformingCategories { categories: weak });
        }

        suggestions
    }
}

/// Cluster comments by normalised text; biggest clusters first, then the
/// most recent. Returns the latest original wording of each cluster.
fn representative_comments<'a>(
    feedback: impl Iterator<Item = &'a RecommendationFeedback>,
) -> Vec<String> {
    let mut clusters: HashMap<String, CommentCluster<'a>> = HashMap::new();

    for f in feedback {
        let text = f.comment.trim();
        if text.is_empty() {
            continue;
        }
        clusters
            .entry(normalize_text(text))
            .and_modify(|cluster| {
                cluster.size += 1;
                if f.created_at >= cluster.latest_at {
                    cluster.latest_at = f.created_at;
                    cluster.latest_text = text;
                }
            })
            .or_insert(CommentCluster {
                size: 1,
                latest_at: f.created_at,
                latest_text: text,
            });
    }

    let mut ordered: Vec<CommentCluster<'a>> = clusters.into_values().collect();
    ordered.sort_by(|a, b| {
        b.size
            .cmp(&a.size)
            .then_with(|| b.latest_at.cmp(&a.latest_at))
            .then_with(|| a.latest_text.cmp(b.latest_text))
    });

    ordered
        .into_iter()
        .take(REPRESENTATIVE_COMMENTS)
        .map(|cluster| cluster.latest_text.to_string())
        .collect()
}

fn common_reasons(window: &[&RecommendationFeedback]) -> Vec<ReasonFrequency> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for reason in window.iter().flat_map(|f| f.reasons.iter()) {
        let reason = reason.trim();
        if !reason.is_empty() {
            *counts.entry(reason).or_insert(0) += 1;
        }
    }

    let mut frequencies: Vec<ReasonFrequency> = counts
        .into_iter()
        .map(|(reason, count)| ReasonFrequency {
            reason: reason.to_string(),
            count,
        })
        .collect();
    frequencies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
    frequencies.truncate(TOP_REASONS);
    frequencies
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{FeedbackContext, RecommendationFeedback, TimeOfDay};
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    pub fn feedback(
        category: &str,
        rating: u8,
        helpful: Option<bool>,
        at: DateTime<Utc>,
    ) -> RecommendationFeedback {
        RecommendationFeedback {
            id: Uuid::new_v4(),
            user_id: "reader-1".to_string(),
            content_id: format!("content-{}", rating),
            recommendation_id: Uuid::new_v4(),
            category: category.to_string(),
            rating,
            helpful,
            comment: String::new(),
            reasons: Vec::new(),
            created_at: at,
            context: FeedbackContext {
                recommendation_score: 0.5,
                time_of_day: TimeOfDay::at(at),
                session_id: "session-1".to_string(),
            },
        }
    }

    pub fn hours_ago(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
        now - Duration::hours(hours)
    }
}
