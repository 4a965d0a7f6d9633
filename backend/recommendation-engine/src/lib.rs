pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::{
    DiversityLayer, FeedbackAggregator, InsightGenerator, RecommendationError,
    RecommendationOutcome, RecommendationRequest, RecommendationService, ScoringEngine,
    SimilarityClassifier, SimilarityScorer,
};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level; repeated calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}
