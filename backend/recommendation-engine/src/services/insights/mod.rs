// ============================================
// Insight Generator
// ============================================
//
// Compares two successive analytics windows and turns notable changes into
// advisory insights:
// 1. Performance - average rating and per-category shifts
// 2. User behavior - helpfulness and evaluation volume shifts
// 3. Content gaps - categories rated below 3.0
// 4. Optimization - best versus worst time-of-day slot
//
// Pure: identical windows always produce identical insights.

use crate::models::{
    RecommendationAnalytics, RecommendationFeedback, TimeOfDay, TimeSlotPerformance, Timeframe,
};
use crate::services::feedback::FeedbackAggregator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::info;
use uuid::Uuid;

const RATING_SHIFT: f32 = 0.2;
const HELPFULNESS_SHIFT: f32 = 0.05;
const VOLUME_SHIFT: f32 = 0.25;
const CATEGORY_FLOOR: f32 = 3.0;
const CATEGORY_DROP: f32 = 0.5;
const TIME_SLOT_GAP: f32 = 0.5;

const TARGET_RATING: f32 = 4.0;
const TARGET_HELPFULNESS: f32 = 0.8;
const TARGET_CATEGORY_RATING: f32 = 3.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Performance,
    UserBehavior,
    ContentGap,
    Optimization,
}

/// Declared high to low so the derived ordering puts high first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightImpact {
    High,
    Medium,
    Low,
}

impl InsightImpact {
    fn from_magnitude(value: f32, high: f32, medium: f32) -> Self {
        if value >= high {
            InsightImpact::High
        } else if value >= medium {
            InsightImpact::Medium
        } else {
            InsightImpact::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsightMetric {
    pub before: f32,
    pub after: f32,
    pub target: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationInsight {
    pub id: Uuid,
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub impact: InsightImpact,
    /// 0-100, grows with the number of evaluations behind the insight
    pub confidence: u8,
    pub action_items: Vec<String>,
    pub metric: InsightMetric,
    pub generated_at: DateTime<Utc>,
}

/// Confidence percentage for `n` supporting evaluations: 100·n/(n+10)
pub fn confidence_for(samples: u32) -> u8 {
    let n = f64::from(samples);
    (100.0 * n / (n + 10.0)).round() as u8
}

/// Insight Generator
pub struct InsightGenerator {
    /// Minimum evaluations before a category or time slot is judged
    min_samples: u32,
}

impl Default for InsightGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl InsightGenerator {
    pub fn new(min_samples: u32) -> Self {
        Self {
            min_samples: min_samples.max(1),
        }
    }

    /// Analyse the window ending at `now` against the window before it
    pub fn from_feedback(
        &self,
        log: &[RecommendationFeedback],
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Vec<RecommendationInsight> {
        let current = FeedbackAggregator::compute_analytics(log, timeframe, now);
        let previous = FeedbackAggregator::compute_analytics(log, timeframe, now - timeframe.span());
        self.generate(&current, &previous)
    }

    /// Derive insights from two successive windows
    pub fn generate(
        &self,
        current: &RecommendationAnalytics,
        previous: &RecommendationAnalytics,
    ) -> Vec<RecommendationInsight> {
        let at = current.window_end;
        let mut insights = Vec::new();

        if current.total_evaluations > 0 && previous.total_evaluations > 0 {
            insights.extend(self.rating_shift(current, previous, at));
            insights.extend(self.helpfulness_shift(current, previous, at));
            insights.extend(self.volume_shift(current, previous, at));
            insights.extend(self.category_drops(current, previous, at));
        }
        insights.extend(self.content_gaps(current, previous, at));
        insights.extend(self.time_slot_gap(current, at));

        insights.sort_by(|a, b| {
            a.impact
                .cmp(&b.impact)
                .then_with(|| b.confidence.cmp(&a.confidence))
                .then_with(|| a.title.cmp(&b.title))
        });

        info!(
            timeframe = current.timeframe.as_str(),
            evaluations = current.total_evaluations,
            previous_evaluations = previous.total_evaluations,
            insight_count = insights.len(),
            "Generated recommendation insights"
        );

        insights
    }

    fn rating_shift(
        &self,
        current: &RecommendationAnalytics,
        previous: &RecommendationAnalytics,
        at: DateTime<Utc>,
    ) -> Option<RecommendationInsight> {
        let delta = current.average_rating - previous.average_rating;
        if delta.abs() < RATING_SHIFT {
            return None;
        }

        let (title, action_items) = if delta > 0.0 {
            (
                "Recommendation accuracy improved".to_string(),
                vec![
                    "Keep the current scoring weights".to_string(),
                    "Review which categories drove the improvement".to_string(),
                ],
            )
        } else {
            (
                "Recommendation accuracy declined".to_string(),
                vec![
                    "Review recent changes to scoring weights".to_string(),
                    "Check low-rated recommendations for common reasons".to_string(),
                ],
            )
        };

        Some(insight(
            InsightKind::Performance,
            title,
            format!(
                "Average rating moved from {:.2} to {:.2} over the last {}",
                previous.average_rating,
                current.average_rating,
                current.timeframe.as_str()
            ),
            InsightImpact::from_magnitude(delta.abs(), 0.5, 0.3),
            current.total_evaluations,
            action_items,
            InsightMetric {
                before: previous.average_rating,
                after: current.average_rating,
                target: TARGET_RATING,
            },
            at,
        ))
    }

    fn helpfulness_shift(
        &self,
        current: &RecommendationAnalytics,
        previous: &RecommendationAnalytics,
        at: DateTime<Utc>,
    ) -> Option<RecommendationInsight> {
        if current.helpfulness_votes == 0 || previous.helpfulness_votes == 0 {
            return None;
        }
        let delta = current.helpfulness_rate - previous.helpfulness_rate;
        if delta.abs() < HELPFULNESS_SHIFT {
            return None;
        }

        let (direction, relation) = if delta > 0.0 {
            ("rose", "up")
        } else {
            ("fell", "down")
        };
        Some(insight(
            InsightKind::UserBehavior,
            format!("Helpfulness votes {}", direction),
            format!(
                "Readers found {:.0}% of recommendations helpful, {} from {:.0}%",
                current.helpfulness_rate * 100.0,
                relation,
                previous.helpfulness_rate * 100.0
            ),
            InsightImpact::from_magnitude(delta.abs(), 0.15, 0.1),
            current.total_evaluations,
            vec![
                "Compare reasons attached to helpful and unhelpful votes".to_string(),
                "Adjust personalization weight if relevance slipped".to_string(),
            ],
            InsightMetric {
                before: previous.helpfulness_rate,
                after: current.helpfulness_rate,
                target: TARGET_HELPFULNESS,
            },
            at,
        ))
    }

    fn volume_shift(
        &self,
        current: &RecommendationAnalytics,
        previous: &RecommendationAnalytics,
        at: DateTime<Utc>,
    ) -> Option<RecommendationInsight> {
        let before = previous.total_evaluations as f32;
        let after = current.total_evaluations as f32;
        let change = (after - before) / before;
        if change.abs() < VOLUME_SHIFT {
            return None;
        }

        let title = if change > 0.0 {
            "More readers are rating recommendations"
        } else {
            "Fewer readers are rating recommendations"
        };

        Some(insight(
            InsightKind::UserBehavior,
            title.to_string(),
            format!(
                "Evaluations changed by {:+.0}% ({} → {})",
                change * 100.0,
                previous.total_evaluations,
                current.total_evaluations
            ),
            InsightImpact::from_magnitude(change.abs(), 1.0, 0.5),
            current.total_evaluations.max(previous.total_evaluations),
            vec!["Check placement and visibility of the rating prompt".to_string()],
            InsightMetric {
                before,
                after,
                target: before.max(after),
            },
            at,
        ))
    }

    fn category_drops(
        &self,
        current: &RecommendationAnalytics,
        previous: &RecommendationAnalytics,
        at: DateTime<Utc>,
    ) -> Vec<RecommendationInsight> {
        current
            .category_performance
            .iter()
            .filter_map(|(category, now_perf)| {
                let before = previous.category_performance.get(category)?;
                if before.count == 0 || now_perf.count == 0 {
                    return None;
                }
                let drop = before.avg_rating - now_perf.avg_rating;
                if drop < CATEGORY_DROP {
                    return None;
                }

                Some(insight(
                    InsightKind::Performance,
                    format!("{} ratings dropped", category),
                    format!(
                        "{} fell from {:.2} to {:.2}",
                        category, before.avg_rating, now_perf.avg_rating
                    ),
                    InsightImpact::from_magnitude(drop, 1.0, 0.75),
                    now_perf.count,
                    vec![
                        format!("Audit recent {} recommendations", category),
                        "Check whether trending weight is promoting stale stories".to_string(),
                    ],
                    InsightMetric {
                        before: before.avg_rating,
                        after: now_perf.avg_rating,
                        target: before.avg_rating,
                    },
                    at,
                ))
            })
            .collect()
    }

    fn content_gaps(
        &self,
        current: &RecommendationAnalytics,
        previous: &RecommendationAnalytics,
        at: DateTime<Utc>,
    ) -> Vec<RecommendationInsight> {
        current
            .category_performance
            .iter()
            .filter(|(_, perf)| perf.count >= self.min_samples && perf.avg_rating < CATEGORY_FLOOR)
            .map(|(category, perf)| {
                let before = previous
                    .category_performance
                    .get(category)
                    .filter(|p| p.count > 0)
                    .map(|p| p.avg_rating)
                    .unwrap_or(perf.avg_rating);

                insight(
                    InsightKind::ContentGap,
                    format!("Weak coverage in {}", category),
                    format!(
                        "{} recommendations average {:.2} across {} evaluations",
                        category, perf.avg_rating, perf.count
                    ),
                    InsightImpact::from_magnitude(CATEGORY_FLOOR - perf.avg_rating, 1.0, 0.5),
                    perf.count,
                    vec![
                        format!("Commission more in-depth {} coverage", category),
                        format!("Lower the share of {} until ratings recover", category),
                    ],
                    InsightMetric {
                        before,
                        after: perf.avg_rating,
                        target: TARGET_CATEGORY_RATING,
                    },
                    at,
                )
            })
            .collect()
    }

    fn time_slot_gap(
        &self,
        current: &RecommendationAnalytics,
        at: DateTime<Utc>,
    ) -> Option<RecommendationInsight> {
        let judged: Vec<(&TimeOfDay, &TimeSlotPerformance)> = current
            .time_slot_performance
            .iter()
            .filter(|(_, perf)| perf.count >= self.min_samples)
            .collect();
        if judged.len() < 2 {
            return None;
        }

        let (best_slot, best) = judged.iter().copied().max_by(by_slot_rating)?;
        let (worst_slot, worst) = judged.iter().copied().min_by(by_slot_rating)?;

        let gap = best.avg_rating - worst.avg_rating;
        if gap < TIME_SLOT_GAP {
            return None;
        }

        Some(insight(
            InsightKind::Optimization,
            format!("Readers respond best in the {}", best_slot.as_str()),
            format!(
                "{} recommendations average {:.2} versus {:.2} in the {}",
                best_slot.as_str(),
                best.avg_rating,
                worst.avg_rating,
                worst_slot.as_str()
            ),
            InsightImpact::from_magnitude(gap, 1.5, 1.0),
            best.count + worst.count,
            vec![
                format!("Schedule key stories for the {}", best_slot.as_str()),
                format!("Favor shorter reads in the {}", worst_slot.as_str()),
            ],
            InsightMetric {
                before: worst.avg_rating,
                after: best.avg_rating,
                target: best.avg_rating,
            },
            at,
        ))
    }
}

fn by_slot_rating(
    a: &(&TimeOfDay, &TimeSlotPerformance),
    b: &(&TimeOfDay, &TimeSlotPerformance),
) -> Ordering {
    a.1.avg_rating
        .partial_cmp(&b.1.avg_rating)
        .unwrap_or(Ordering::Equal)
}

#[allow(clippy::too_many_arguments)]
fn insight(
    kind: InsightKind,
    title: String,
    description: String,
    impact: InsightImpact,
    samples: u32,
    action_items: Vec<String>,
    metric: InsightMetric,
    generated_at: DateTime<Utc>,
) -> RecommendationInsight {
    let name = format!("{:?}:{}:{}", kind, title, generated_at.timestamp());
    RecommendationInsight {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
        kind,
        title,
        description,
        impact,
        confidence: confidence_for(samples),
        action_items,
        metric,
        generated_at,
    }
}
