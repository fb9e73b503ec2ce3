//! In-memory half of a collection run: drive every adapter over its terms
//! and merge the results.
//!
//! Adapters run concurrently. Terms within one adapter run strictly in
//! order, each preceded by the adapter's `min_delay_ms`. Nothing here touches
//! the database, so the policy is testable with fake adapters.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{future::join_all, StreamExt};
use tokio::sync::watch;
use trendgate_core::{NaturalKey, RunStatus, SourcePolicy, SourceStatus};
use trendgate_sources::{
    normalize::observation_bucket, term_stream, QueryContext, SourceAdapter, SourceBatch,
};

/// One enabled adapter together with its collection policy.
pub struct AdapterJob {
    pub adapter: Box<dyn SourceAdapter>,
    pub policy: SourcePolicy,
}

impl std::fmt::Debug for AdapterJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterJob")
            .field("adapter", &self.adapter.name())
            .field("terms", &self.policy.terms.len())
            .finish_non_exhaustive()
    }
}

/// Per-adapter result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
    pub terms_attempted: u32,
    pub terms_ok: u32,
    pub observations: u64,
    pub note: Option<String>,
}

impl SourceReport {
    /// A source that was never queried (missing credentials, disabled).
    #[must_use]
    pub fn skipped(source: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            status: SourceStatus::Skipped,
            terms_attempted: 0,
            terms_ok: 0,
            observations: 0,
            note: Some(note.into()),
        }
    }

    /// At least one term returned a result.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.terms_ok > 0
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Merged results, deduplicated by natural key.
    pub batch: SourceBatch,
    pub reports: Vec<SourceReport>,
    /// Cancellation was observed before every adapter finished.
    pub cancelled: bool,
}

/// Query every adapter and merge their batches.
///
/// `started_at` fixes the observation bucket for the whole run. Setting
/// `cancel` to `true` stops each adapter before its next term.
pub async fn collect_batch(
    jobs: &[AdapterJob],
    started_at: DateTime<Utc>,
    cancel: &watch::Receiver<bool>,
) -> BatchOutcome {
    let observed_at = observation_bucket(started_at);

    let results = join_all(
        jobs.iter()
            .map(|job| run_adapter(job, observed_at, cancel.clone())),
    )
    .await;

    let mut outcome = BatchOutcome::default();
    let mut seen_observations: HashSet<NaturalKey> = HashSet::new();
    let mut seen_content: HashSet<(String, String)> = HashSet::new();

    for (batch, report, cancelled) in results {
        outcome.cancelled |= cancelled;
        outcome.reports.push(report);

        for obs in batch.observations {
            if seen_observations.insert(obs.natural_key()) {
                outcome.batch.observations.push(obs);
            }
        }
        for item in batch.content {
            if seen_content.insert((item.platform.clone(), item.platform_id.clone())) {
                outcome.batch.content.push(item);
            }
        }
    }

    outcome
}

async fn run_adapter(
    job: &AdapterJob,
    observed_at: DateTime<Utc>,
    cancel: watch::Receiver<bool>,
) -> (SourceBatch, SourceReport, bool) {
    let name = job.adapter.name();
    let ctx = QueryContext {
        observed_at,
        limit: job.policy.max_results,
        region: job.policy.region.clone(),
        source_confidence: job.policy.source_confidence,
    };

    let mut batch = SourceBatch::default();
    let mut attempted: u32 = 0;
    let mut ok: u32 = 0;
    let mut failed_terms: Vec<String> = Vec::new();
    let mut unnamed_terms: Vec<String> = Vec::new();
    let mut unnamed_dropped: usize = 0;
    let mut rate_limited = false;
    let mut cancelled = false;

    let delay = Duration::from_millis(job.policy.min_delay_ms);
    let terms = &job.policy.terms;
    let total = u32::try_from(terms.len()).unwrap_or(u32::MAX);

    if *cancel.borrow() {
        tracing::info!(source = name, "cancelled before first term");
        return (
            batch,
            SourceReport::skipped(name, "cancelled before start"),
            true,
        );
    }

    {
        let mut stream = std::pin::pin!(term_stream(job.adapter.as_ref(), terms, &ctx, delay));
        while let Some(item) = stream.next().await {
            attempted += 1;
            match item.result {
                Ok(mut found) => {
                    ok += 1;
                    let before = found.observations.len();
                    found.observations.retain(|obs| !obs.entity_id.is_empty());
                    found.content.retain(|c| !c.entity_id.is_empty());
                    let dropped = before - found.observations.len();
                    if dropped > 0 {
                        tracing::warn!(
                            source = name,
                            term = %item.term,
                            dropped,
                            "dropped observations with an empty entity id"
                        );
                        unnamed_dropped += dropped;
                        unnamed_terms.push(item.term.clone());
                    }
                    tracing::debug!(
                        source = name,
                        term = %item.term,
                        observations = found.observations.len(),
                        content = found.content.len(),
                        "term collected"
                    );
                    batch.extend(found);
                }
                Err(e) if e.is_rate_limited() => {
                    tracing::warn!(
                        source = name,
                        term = %item.term,
                        error = %e,
                        "rate limited, skipping remaining terms"
                    );
                    rate_limited = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        source = name,
                        term = %item.term,
                        error = %e,
                        "term failed, continuing"
                    );
                    failed_terms.push(item.term);
                }
            }

            if *cancel.borrow() {
                tracing::info!(source = name, attempted, "cancellation observed");
                cancelled = attempted < total;
                break;
            }
        }
    }

    let status = if rate_limited {
        SourceStatus::RateLimited
    } else if ok == 0 && attempted > 0 {
        SourceStatus::Unavailable
    } else if attempted == 0 {
        SourceStatus::Skipped
    } else {
        SourceStatus::Ok
    };

    let mut notes: Vec<String> = Vec::new();
    if rate_limited {
        notes.push(format!("rate limited after {attempted} of {total} terms"));
    }
    if !failed_terms.is_empty() {
        notes.push(format!(
            "{} of {attempted} terms failed: {}",
            failed_terms.len(),
            failed_terms.join(", ")
        ));
    }
    if unnamed_dropped > 0 {
        notes.push(format!(
            "dropped {unnamed_dropped} observations with no entity id from: {}",
            unnamed_terms.join(", ")
        ));
    }
    if cancelled {
        notes.push(format!("cancelled after {attempted} of {total} terms"));
    }

    let report = SourceReport {
        source: name.to_string(),
        status,
        terms_attempted: attempted,
        terms_ok: ok,
        observations: u64::try_from(batch.observations.len()).unwrap_or(u64::MAX),
        note: if notes.is_empty() {
            None
        } else {
            Some(notes.join("; "))
        },
    };

    (batch, report, cancelled)
}

/// Final run status and its message.
///
/// Cancellation wins. Otherwise a run with no successful source fails, and
/// a successful run lists its degraded sources.
#[must_use]
pub fn decide_run_status(reports: &[SourceReport], cancelled: bool) -> (RunStatus, Option<String>) {
    if cancelled {
        return (RunStatus::Cancelled, None);
    }

    let degraded: Vec<String> = reports
        .iter()
        .filter(|r| r.status != SourceStatus::Ok)
        .map(|r| match &r.note {
            Some(note) => format!("{} {} ({note})", r.source, r.status),
            None => format!("{} {}", r.source, r.status),
        })
        .collect();

    if !reports.iter().any(SourceReport::succeeded) {
        let message = if reports.is_empty() {
            "no sources configured".to_string()
        } else {
            format!("no source succeeded: {}", degraded.join("; "))
        };
        return (RunStatus::Failed, Some(message));
    }

    if degraded.is_empty() {
        (RunStatus::Success, None)
    } else {
        (RunStatus::Success, Some(format!("degraded: {}", degraded.join("; "))))
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
