// ============================================
// Sub-scores
// ============================================
//
// Each function returns a value in [0, 1]. Missing item fields contribute 0.

use crate::models::{
    BehaviorRecord, ContentItem, ContentStatus, EditorialPriority, ReadingLength,
    UserPreferenceProfile,
};
use crate::utils::saturate;
use chrono::{DateTime, Utc};

const VIEWS_SATURATION: f64 = 10_000.0;
const LIKES_SATURATION: f64 = 1_000.0;
const SHARES_SATURATION: f64 = 500.0;

/// Category +0.4, reading length up to +0.3, language +0.2, liked before +0.1
pub fn personalized(
    item: &ContentItem,
    profile: &UserPreferenceProfile,
    behavior: &BehaviorRecord,
    reading_speed_wpm: u32,
) -> f32 {
    let mut score = 0.0;

    if let Some(name) = item.category_name() {
        if profile.prefers_category(name) {
            score += 0.4;
        }
    }

    let bucket = ReadingLength::from_minutes(item.estimated_read_minutes(reading_speed_wpm));
    if bucket == profile.reading_length {
        score += 0.3;
    } else if bucket.is_adjacent(profile.reading_length) {
        score += 0.15;
    }

    if item.language == profile.language {
        score += 0.2;
    }

    if behavior.liked.contains(&item.id) {
        score += 0.1;
    }

    f32::min(score, 1.0)
}

/// Views, likes and shares at 0.3 each plus click-through rate at 0.1
pub fn trending(item: &ContentItem) -> f32 {
    let Some(analytics) = item.analytics.as_ref() else {
        return 0.0;
    };

    let views = saturate(analytics.views as f64, VIEWS_SATURATION);
    let likes = saturate(analytics.likes as f64, LIKES_SATURATION);
    let shares = saturate(analytics.shares as f64, SHARES_SATURATION);
    let ctr = analytics.click_through_rate.clamp(0.0, 1.0);

    let score = views * 0.3 + likes * 0.3 + shares * 0.3 + ctr * 0.1;
    score.clamp(0.0, 1.0)
}

pub fn editorial(item: &ContentItem) -> f32 {
    let mut score = match item.priority {
        EditorialPriority::Urgent => 0.5,
        EditorialPriority::High => 0.3,
        EditorialPriority::Normal => 0.1,
    };

    score += match item.status {
        ContentStatus::Published => 0.3,
        ContentStatus::Scheduled => 0.2,
        ContentStatus::Draft => 0.0,
    };

    if item
        .featured_image
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty())
    {
        score += 0.2;
    }

    f32::min(score, 1.0)
}

/// Step decay on hours since creation
pub fn recency(item: &ContentItem, now: DateTime<Utc>) -> f32 {
    let age_hours = item.age_hours(now);

    if age_hours < 1.0 {
        1.0
    } else if age_hours < 6.0 {
        0.8
    } else if age_hours < 24.0 {
        0.6
    } else if age_hours < 72.0 {
        0.4
    } else {
        0.2
    }
}
