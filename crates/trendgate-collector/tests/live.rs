//! Live collection and scoring runs against a migrated Postgres database.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::watch;
use trendgate_collector::{run_collection, run_scoring, AdapterJob, SourceReport};
use trendgate_core::{
    ApprovalState, FeatureVector, Observation, RunStatus, SourcePolicy, TcsWeights,
    TierThresholds,
};
use trendgate_scoring::{compute_tcs, ScoringConfig};
use trendgate_sources::{QueryContext, SourceAdapter, SourceBatch, SourceError};

struct Fixed {
    name: &'static str,
    available: bool,
    /// Emit observations whose entity id is empty.
    unnamed: bool,
}

#[async_trait]
impl SourceAdapter for Fixed {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn query(&self, term: &str, ctx: &QueryContext) -> Result<SourceBatch, SourceError> {
        if !self.available {
            return Err(SourceError::Unavailable {
                adapter: self.name,
                reason: "HTTP 503".to_string(),
            });
        }
        Ok(SourceBatch {
            observations: vec![Observation {
                source: self.name.to_string(),
                entity_id: if self.unnamed {
                    String::new()
                } else {
                    term.to_string()
                },
                region: ctx.region.clone(),
                metric: "video_count".to_string(),
                value: 12.0,
                observed_at: ctx.observed_at,
                source_confidence: ctx.source_confidence,
            }],
            content: vec![],
        })
    }
}

fn job(name: &'static str, available: bool) -> AdapterJob {
    adapter_job(Fixed {
        name,
        available,
        unnamed: false,
    })
}

fn adapter_job(adapter: Fixed) -> AdapterJob {
    AdapterJob {
        adapter: Box::new(adapter),
        policy: SourcePolicy {
            enabled: true,
            min_delay_ms: 0,
            max_results: 10,
            region: "KR".to_string(),
            source_confidence: 0.8,
            terms: vec!["matcha_latte".to_string(), "black_sesame".to_string()],
        },
    }
}

fn scoring_config() -> ScoringConfig {
    ScoringConfig {
        weights: TcsWeights::default(),
        thresholds: TierThresholds::default(),
        region_universe: vec!["KR".to_string(), "JP".to_string()],
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn degraded_run_persists_healthy_sources(pool: sqlx::PgPool) {
    let (_tx, rx) = watch::channel(false);
    let jobs = [job("youtube", true), job("naver", false)];
    let skipped = vec![SourceReport::skipped("instagram", "credentials not configured")];

    let summary = run_collection(&pool, &jobs, skipped, "cli", &rx)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.counts.rows_written, 2);
    assert!(summary.message.as_deref().unwrap().starts_with("degraded:"));

    let run = trendgate_db::get_latest_collection_run(&pool)
        .await
        .unwrap()
        .expect("run recorded");
    assert_eq!(run.public_id, summary.public_id);
    assert_eq!(run.status, "success");
    assert_eq!(run.rows_written, 2);

    let sources = trendgate_db::list_collection_run_sources(&pool, run.id)
        .await
        .unwrap();
    let statuses: Vec<(&str, &str)> = sources
        .iter()
        .map(|s| (s.source.as_str(), s.status.as_str()))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("instagram", "skipped"),
            ("naver", "unavailable"),
            ("youtube", "ok"),
        ]
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn second_run_in_same_hour_counts_duplicates(pool: sqlx::PgPool) {
    let (_tx, rx) = watch::channel(false);
    let jobs = [job("youtube", true)];

    run_collection(&pool, &jobs, vec![], "cli", &rx).await.unwrap();
    let second = run_collection(&pool, &jobs, vec![], "cli", &rx).await.unwrap();

    // Duplicates unless the clock crossed an hour boundary between runs.
    assert_eq!(
        second.counts.rows_written + second.counts.duplicates_skipped,
        2
    );
    assert_eq!(second.status, RunStatus::Success);
}

#[sqlx::test(migrations = "../../migrations")]
async fn fully_failed_run_is_recorded_as_failed(pool: sqlx::PgPool) {
    let (_tx, rx) = watch::channel(false);
    let jobs = [job("naver", false)];

    let summary = run_collection(&pool, &jobs, vec![], "cli", &rx).await.unwrap();
    assert_eq!(summary.status, RunStatus::Failed);

    let run = trendgate_db::get_collection_run(&pool, summary.run_id)
        .await
        .unwrap();
    assert_eq!(run.status, "failed");
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("no source succeeded"));
    assert!(run.completed_at.is_some());
}

/// Make every insert into `table` raise.
async fn reject_inserts_into(pool: &sqlx::PgPool, table: &str) {
    let sql = format!(
        "CREATE FUNCTION reject_{table}() RETURNS trigger LANGUAGE plpgsql AS $$ \
         BEGIN RAISE EXCEPTION '{table} is read-only'; END $$; \
         CREATE TRIGGER reject_{table} BEFORE INSERT ON {table} \
         FOR EACH ROW EXECUTE FUNCTION reject_{table}();"
    );
    sqlx::raw_sql(&sql).execute(pool).await.unwrap();
}

#[sqlx::test(migrations = "../../migrations")]
async fn unnamed_observations_do_not_sink_the_batch(pool: sqlx::PgPool) {
    let (_tx, rx) = watch::channel(false);
    let jobs = [
        job("youtube", true),
        adapter_job(Fixed {
            name: "instagram",
            available: true,
            unnamed: true,
        }),
    ];

    let summary = run_collection(&pool, &jobs, vec![], "cli", &rx)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.counts.rows_written, 2);

    let sources = trendgate_db::list_collection_run_sources(&pool, summary.run_id)
        .await
        .unwrap();
    let instagram = sources
        .iter()
        .find(|s| s.source == "instagram")
        .expect("instagram row");
    assert_eq!(instagram.rows_collected, 0);
    assert!(instagram
        .note
        .as_deref()
        .unwrap()
        .contains("no entity id"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_batch_write_still_records_sources(pool: sqlx::PgPool) {
    reject_inserts_into(&pool, "signals_raw").await;
    let (_tx, rx) = watch::channel(false);
    let jobs = [job("youtube", true)];
    let skipped = vec![SourceReport::skipped("naver", "credentials not configured")];

    let err = run_collection(&pool, &jobs, skipped, "cli", &rx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("read-only"), "got: {err}");

    let run = trendgate_db::get_latest_collection_run(&pool)
        .await
        .unwrap()
        .expect("run recorded");
    assert_eq!(run.status, "failed");
    assert_eq!(run.rows_written, 0);
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("failed to persist batch"));

    let sources = trendgate_db::list_collection_run_sources(&pool, run.id)
        .await
        .unwrap();
    let names: Vec<&str> = sources.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(names, vec!["naver", "youtube"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_source_rows_mark_the_run_failed(pool: sqlx::PgPool) {
    reject_inserts_into(&pool, "collection_run_sources").await;
    let (_tx, rx) = watch::channel(false);
    let jobs = [job("youtube", true)];

    assert!(run_collection(&pool, &jobs, vec![], "cli", &rx)
        .await
        .is_err());

    let run = trendgate_db::get_latest_collection_run(&pool)
        .await
        .unwrap()
        .expect("run recorded");
    assert_eq!(run.status, "failed");
    assert!(run.completed_at.is_some());
    assert_eq!(run.rows_written, 2);
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("failed to record source rows"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn scoring_creates_pending_approvals(pool: sqlx::PgPool) {
    let now = Utc::now();
    let observations: Vec<Observation> = (0..6)
        .map(|day| Observation {
            source: "youtube".to_string(),
            entity_id: "matcha_latte".to_string(),
            region: "KR".to_string(),
            metric: "view_count".to_string(),
            value: 100.0 * f64::from(day + 1),
            observed_at: now - Duration::days(i64::from(10 - day * 2)),
            source_confidence: 0.8,
        })
        .collect();
    trendgate_db::record_observations(&pool, &observations)
        .await
        .unwrap();

    let summary = run_scoring(&pool, &scoring_config(), 28, now, true)
        .await
        .unwrap();

    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.scored.len(), 1);
    let scored = &summary.scored[0];
    assert_eq!(scored.entity_id, "matcha_latte");
    assert_eq!(scored.supporting_signals, 1);

    let pending = trendgate_db::list_pending_approvals(&pool, 50).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(Some(pending[0].approval_id), scored.approval_id);

    let record = trendgate_db::get_approval_record(&pool, scored.approval_id.unwrap())
        .await
        .unwrap();
    assert_eq!(record.state, ApprovalState::Pending.as_str());

    let stored = trendgate_db::get_prediction(&pool, record.prediction_id)
        .await
        .unwrap();
    let features: FeatureVector = serde_json::from_value(stored.features).unwrap();
    let weights: TcsWeights = serde_json::from_value(stored.weights).unwrap();
    assert_eq!(compute_tcs(&features, &weights), scored.tcs);
}

#[sqlx::test(migrations = "../../migrations")]
async fn dry_run_scoring_writes_nothing(pool: sqlx::PgPool) {
    let now = Utc::now();
    let observation = Observation {
        source: "naver".to_string(),
        entity_id: "black_sesame".to_string(),
        region: "KR".to_string(),
        metric: "search_index".to_string(),
        value: 42.0,
        observed_at: now - Duration::days(1),
        source_confidence: 0.7,
    };
    trendgate_db::record_observation(&pool, &observation)
        .await
        .unwrap();

    let summary = run_scoring(&pool, &scoring_config(), 28, now, false)
        .await
        .unwrap();

    assert_eq!(summary.scored.len(), 1);
    assert!(summary.scored[0].approval_id.is_none());
    assert!(trendgate_db::list_pending_approvals(&pool, 50)
        .await
        .unwrap()
        .is_empty());
}
