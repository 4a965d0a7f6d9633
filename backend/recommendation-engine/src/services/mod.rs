pub mod diversity;
pub mod feedback;
pub mod insights;
pub mod recommendation;
pub mod scoring;
pub mod similarity;
pub mod store;

pub use diversity::DiversityLayer;
pub use feedback::{FeedbackAggregator, ImprovementSuggestion};
pub use insights::{InsightGenerator, RecommendationInsight};
pub use recommendation::{
    RecommendationError, RecommendationOutcome, RecommendationRequest, RecommendationService,
};
pub use scoring::ScoringEngine;
pub use similarity::{SimilarityClassifier, SimilarityScorer};
