use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Timelike};
use tokio::sync::watch;
use trendgate_core::{Observation, SocialContentItem};
use trendgate_sources::SourceError;

use super::*;

#[derive(Clone, Copy)]
enum Reply {
    Found,
    /// Found, but the adapter could not derive an entity id.
    Unnamed,
    Unavailable,
    RateLimited,
}

struct Scripted {
    name: &'static str,
    script: Vec<(&'static str, Reply)>,
    calls: Arc<Mutex<Vec<String>>>,
    /// Flip the cancel switch once this many calls have been made.
    cancel_after: Option<(usize, watch::Sender<bool>)>,
}

#[async_trait]
impl SourceAdapter for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn query(&self, term: &str, ctx: &QueryContext) -> Result<SourceBatch, SourceError> {
        let calls = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(term.to_string());
            calls.len()
        };
        if let Some((after, tx)) = &self.cancel_after {
            if calls >= *after {
                tx.send_replace(true);
            }
        }

        let reply = self
            .script
            .iter()
            .find(|(t, _)| *t == term)
            .map_or(Reply::Found, |(_, r)| *r);

        let entity_id = if matches!(reply, Reply::Unnamed) {
            String::new()
        } else {
            term.to_string()
        };

        match reply {
            Reply::Found | Reply::Unnamed => Ok(SourceBatch {
                observations: vec![Observation {
                    source: self.name.to_string(),
                    entity_id: entity_id.clone(),
                    region: ctx.region.clone(),
                    metric: "post_count".to_string(),
                    value: 3.0,
                    observed_at: ctx.observed_at,
                    source_confidence: ctx.source_confidence,
                }],
                content: vec![SocialContentItem {
                    platform: self.name.to_string(),
                    platform_id: format!("{term}-1"),
                    entity_id,
                    title: None,
                    url: None,
                    creator: None,
                    published_at: None,
                    engagement: trendgate_core::Engagement::default(),
                    flags: trendgate_core::ContentFlags::default(),
                }],
            }),
            Reply::Unavailable => Err(SourceError::Unavailable {
                adapter: self.name,
                reason: "HTTP 503".to_string(),
            }),
            Reply::RateLimited => Err(SourceError::RateLimited {
                adapter: self.name,
                retry_after_secs: Some(60),
            }),
        }
    }
}

fn policy(terms: &[&str], min_delay_ms: u64) -> SourcePolicy {
    SourcePolicy {
        enabled: true,
        min_delay_ms,
        max_results: 10,
        region: "KR".to_string(),
        source_confidence: 0.8,
        terms: terms.iter().map(|t| (*t).to_string()).collect(),
    }
}

fn job(
    name: &'static str,
    terms: &[&str],
    script: Vec<(&'static str, Reply)>,
) -> (AdapterJob, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let adapter = Scripted {
        name,
        script,
        calls: Arc::clone(&calls),
        cancel_after: None,
    };
    (
        AdapterJob {
            adapter: Box::new(adapter),
            policy: policy(terms, 0),
        },
        calls,
    )
}

fn started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 42, 17).unwrap()
}

fn report<'a>(outcome: &'a BatchOutcome, source: &str) -> &'a SourceReport {
    outcome
        .reports
        .iter()
        .find(|r| r.source == source)
        .expect("report for source")
}

#[tokio::test]
async fn unavailable_source_does_not_block_others() {
    let (youtube, _) = job("youtube", &["말차", "흑임자"], vec![]);
    let (naver, naver_calls) = job(
        "naver",
        &["말차", "흑임자"],
        vec![("말차", Reply::Unavailable), ("흑임자", Reply::Unavailable)],
    );
    let (_tx, rx) = watch::channel(false);

    let outcome = collect_batch(&[youtube, naver], started_at(), &rx).await;

    assert!(!outcome.cancelled);
    assert_eq!(outcome.batch.observations.len(), 2);
    assert!(outcome.batch.observations.iter().all(|o| o.source == "youtube"));
    assert_eq!(naver_calls.lock().unwrap().len(), 2);

    let naver = report(&outcome, "naver");
    assert_eq!(naver.status, SourceStatus::Unavailable);
    assert!(!naver.succeeded());
    assert_eq!(report(&outcome, "youtube").status, SourceStatus::Ok);

    let (status, message) = decide_run_status(&outcome.reports, outcome.cancelled);
    assert_eq!(status, RunStatus::Success);
    assert!(message.unwrap().starts_with("degraded: naver unavailable"));
}

#[tokio::test]
async fn rate_limit_skips_remaining_terms() {
    let (instagram, calls) = job(
        "instagram",
        &["a", "b", "c", "d"],
        vec![("b", Reply::RateLimited)],
    );
    let (_tx, rx) = watch::channel(false);

    let outcome = collect_batch(&[instagram], started_at(), &rx).await;

    assert_eq!(*calls.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    let r = report(&outcome, "instagram");
    assert_eq!(r.status, SourceStatus::RateLimited);
    assert_eq!(r.terms_attempted, 2);
    assert_eq!(r.terms_ok, 1);
    assert_eq!(r.note.as_deref(), Some("rate limited after 2 of 4 terms"));
    assert_eq!(outcome.batch.observations.len(), 1);
}

#[tokio::test]
async fn unavailable_term_continues_with_next() {
    let (youtube, calls) = job(
        "youtube",
        &["a", "b", "c"],
        vec![("b", Reply::Unavailable)],
    );
    let (_tx, rx) = watch::channel(false);

    let outcome = collect_batch(&[youtube], started_at(), &rx).await;

    assert_eq!(calls.lock().unwrap().len(), 3);
    let r = report(&outcome, "youtube");
    assert_eq!(r.status, SourceStatus::Ok);
    assert_eq!(r.terms_ok, 2);
    assert_eq!(r.note.as_deref(), Some("1 of 3 terms failed: b"));
}

#[tokio::test]
async fn observations_without_entity_id_are_dropped_and_noted() {
    let (youtube, _) = job("youtube", &["말차 라떼"], vec![]);
    let (instagram, _) = job("instagram", &["☕", "흑임자"], vec![("☕", Reply::Unnamed)]);
    let (_tx, rx) = watch::channel(false);

    let outcome = collect_batch(&[youtube, instagram], started_at(), &rx).await;

    assert!(outcome
        .batch
        .observations
        .iter()
        .all(|obs| !obs.entity_id.is_empty()));
    assert_eq!(outcome.batch.observations.len(), 2);
    assert_eq!(outcome.batch.content.len(), 2);

    let r = report(&outcome, "instagram");
    assert_eq!(r.status, SourceStatus::Ok);
    assert_eq!(r.terms_ok, 2);
    assert_eq!(r.observations, 1);
    assert_eq!(
        r.note.as_deref(),
        Some("dropped 1 observations with no entity id from: ☕")
    );
    assert_eq!(report(&outcome, "youtube").note, None);
}

#[tokio::test]
async fn observations_share_hour_bucket_and_are_deduplicated() {
    // Same term twice yields the same natural key.
    let (youtube, _) = job("youtube", &["말차", "말차"], vec![]);
    let (_tx, rx) = watch::channel(false);

    let outcome = collect_batch(&[youtube], started_at(), &rx).await;

    assert_eq!(outcome.batch.observations.len(), 1);
    assert_eq!(outcome.batch.content.len(), 1);
    let observed_at = outcome.batch.observations[0].observed_at;
    assert_eq!(observed_at.hour(), 9);
    assert_eq!(observed_at.minute(), 0);
    assert_eq!(observed_at.second(), 0);
}

#[tokio::test(start_paused = true)]
async fn terms_are_spaced_by_min_delay() {
    let (mut youtube, _) = job("youtube", &["a", "b", "c"], vec![]);
    youtube.policy.min_delay_ms = 200;
    let (_tx, rx) = watch::channel(false);

    let begin = tokio::time::Instant::now();
    collect_batch(&[youtube], started_at(), &rx).await;
    assert!(begin.elapsed() >= Duration::from_millis(600));
}

#[tokio::test]
async fn cancellation_before_start_skips_every_source() {
    let (youtube, calls) = job("youtube", &["a", "b"], vec![]);
    let (tx, rx) = watch::channel(false);
    tx.send_replace(true);

    let outcome = collect_batch(&[youtube], started_at(), &rx).await;

    assert!(outcome.cancelled);
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(report(&outcome, "youtube").status, SourceStatus::Skipped);
    assert_eq!(
        decide_run_status(&outcome.reports, outcome.cancelled).0,
        RunStatus::Cancelled
    );
}

#[tokio::test]
async fn cancellation_stops_between_terms_and_keeps_results() {
    let (tx, rx) = watch::channel(false);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let adapter = Scripted {
        name: "naver",
        script: vec![],
        calls: Arc::clone(&calls),
        cancel_after: Some((1, tx)),
    };
    let jobs = [AdapterJob {
        adapter: Box::new(adapter),
        policy: policy(&["a", "b", "c"], 0),
    }];

    let outcome = collect_batch(&jobs, started_at(), &rx).await;

    assert!(outcome.cancelled);
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(outcome.batch.observations.len(), 1);
    let r = report(&outcome, "naver");
    assert_eq!(r.note.as_deref(), Some("cancelled after 1 of 3 terms"));
}

#[test]
fn run_fails_when_no_source_succeeds() {
    let reports = vec![
        SourceReport {
            source: "naver".to_string(),
            status: SourceStatus::Unavailable,
            terms_attempted: 3,
            terms_ok: 0,
            observations: 0,
            note: None,
        },
        SourceReport::skipped("instagram", "missing credentials"),
    ];
    let (status, message) = decide_run_status(&reports, false);
    assert_eq!(status, RunStatus::Failed);
    let message = message.unwrap();
    assert!(message.contains("naver unavailable"));
    assert!(message.contains("instagram skipped (missing credentials)"));

    let (status, message) = decide_run_status(&[], false);
    assert_eq!(status, RunStatus::Failed);
    assert_eq!(message.as_deref(), Some("no sources configured"));
}

#[test]
fn clean_run_has_no_message() {
    let reports = vec![SourceReport {
        source: "youtube".to_string(),
        status: SourceStatus::Ok,
        terms_attempted: 7,
        terms_ok: 7,
        observations: 28,
        note: None,
    }];
    assert_eq!(decide_run_status(&reports, false), (RunStatus::Success, None));
}
