// Utility functions for recommendation-engine

/// Normalize a raw counter against a saturation point, clamped to [0, 1]
pub fn saturate(value: f64, saturation: f64) -> f32 {
    if saturation <= 0.0 {
        return 0.0;
    }
    (value / saturation).clamp(0.0, 1.0) as f32
}

/// Divide, returning 0 instead of NaN/Infinity when the denominator is empty
pub fn safe_ratio(numerator: f64, denominator: f64) -> f32 {
    if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        (numerator / denominator) as f32
    }
}

/// Collapse whitespace and lowercase, for grouping near-identical comments
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
