//! `collect` command handler.
//!
//! Called by an external scheduler. Ctrl-C stops each source before its next
//! term; whatever was already collected is still written.

use anyhow::Context;
use tokio::sync::watch;
use trendgate_collector::{build_jobs, planned_sources, run_collection, RunSummary};
use trendgate_core::{AppConfig, RunStatus};

/// Run one collection pass and print its summary.
///
/// When `dry_run` is `true` the planned queries are printed and neither the
/// sources nor the database are touched.
///
/// # Errors
///
/// Returns an error if the topics file is invalid, the database is
/// unreachable, or the run ends `failed`.
pub(crate) async fn run_collect(
    config: &AppConfig,
    source: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let topics = trendgate_core::load_topics(&config.topics_path)
        .with_context(|| format!("loading {}", config.topics_path.display()))?;

    if dry_run {
        let planned: Vec<_> = planned_sources(&topics)
            .filter(|(name, _)| source.is_none_or(|wanted| wanted == *name))
            .collect();
        println!("dry-run: would query {} source(s):", planned.len());
        for (name, policy) in planned {
            println!(
                "  {name} [{}]: {} term(s), {}ms apart",
                policy.region,
                policy.terms.len(),
                policy.min_delay_ms
            );
        }
        return Ok(());
    }

    let set = build_jobs(config, &topics, source)?;
    if set.jobs.is_empty() && set.skipped.is_empty() {
        anyhow::bail!("no source matches the requested filter");
    }

    let pool = crate::connect(config, true).await?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("ctrl-c received; stopping after in-flight requests");
            cancel_tx.send_replace(true);
        }
    });

    let summary = run_collection(&pool, &set.jobs, set.skipped, "cli", &cancel_rx).await;
    ctrl_c.abort();
    let summary = summary?;

    print_summary(&summary);

    if summary.status == RunStatus::Failed {
        anyhow::bail!(
            "collection run {} failed: {}",
            summary.public_id,
            summary.message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "run {} {}: {} written, {} duplicates, {} content items",
        summary.public_id,
        summary.status,
        summary.counts.rows_written,
        summary.counts.duplicates_skipped,
        summary.counts.social_items_upserted
    );
    for report in &summary.reports {
        let note = report
            .note
            .as_deref()
            .map(|n| format!(" ({n})"))
            .unwrap_or_default();
        println!(
            "  {:<10} {:<12} {}/{} terms, {} observations{note}",
            report.source,
            report.status.as_str(),
            report.terms_ok,
            report.terms_attempted,
            report.observations
        );
    }
    if let Some(message) = &summary.message {
        println!("  {message}");
    }
}
