//! Collection and scoring runs.
//!
//! [`run_collection`] drives the source adapters and writes one run summary;
//! [`run_scoring`] turns the windowed signals into pending predictions.

mod orchestrator;
mod registry;
mod run;
mod score;

use thiserror::Error;

pub use orchestrator::{collect_batch, decide_run_status, AdapterJob, BatchOutcome, SourceReport};
pub use registry::{build_jobs, http_settings, planned_sources, JobSet};
pub use run::{run_collection, RunSummary};
pub use score::{run_scoring, score_window, ScoreSummary, ScoredEntity};

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error(transparent)]
    Db(#[from] trendgate_db::DbError),

    #[error(transparent)]
    Source(#[from] trendgate_sources::SourceError),

    #[error(transparent)]
    Scoring(#[from] trendgate_scoring::ScoringError),
}
