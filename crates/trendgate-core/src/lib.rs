//! Shared domain types and configuration for trendgate.

pub mod app_config;
pub mod config;
pub mod prediction;
pub mod signals;
pub mod states;
pub mod topics;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use prediction::{FeatureVector, NewPrediction};
pub use signals::{
    entity_slug, AggregatedTrend, ContentFlags, Engagement, EntitySignalSummary, NaturalKey,
    Observation, SocialContentItem,
};
pub use states::{ApprovalState, RunStatus, SourceStatus, Tier, UnknownVariant};
pub use topics::{
    load_topics, parse_topics, ScoringSettings, SourcePolicy, TcsWeights, TierThresholds,
    TopicsFile,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read topics file {path}: {source}")]
    TopicsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse topics file: {0}")]
    TopicsFileParse(#[from] serde_yaml::Error),

    #[error("topics validation failed: {0}")]
    Validation(String),
}
