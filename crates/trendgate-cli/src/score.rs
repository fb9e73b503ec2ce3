use anyhow::Context;
use chrono::Utc;
use trendgate_collector::run_scoring;
use trendgate_core::AppConfig;
use trendgate_scoring::ScoringConfig;

/// Score the current window and print one line per entity.
///
/// # Errors
///
/// Returns an error if the topics file is invalid, the scoring weights are
/// unusable, or a store query fails.
pub(crate) async fn run_score(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    window_days: Option<u32>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let topics = trendgate_core::load_topics(&config.topics_path)
        .with_context(|| format!("loading {}", config.topics_path.display()))?;
    let scoring = ScoringConfig::from_topics(&topics);
    let window_days = window_days.unwrap_or(config.scoring_window_days);

    let summary = run_scoring(pool, &scoring, window_days, Utc::now(), !dry_run).await?;

    let verb = if dry_run { "would queue" } else { "queued" };
    println!(
        "{verb} {} of {} candidate(s) from {} to {}",
        summary.scored.len(),
        summary.candidates,
        summary.window_start.format("%Y-%m-%d"),
        summary.window_end.format("%Y-%m-%d")
    );
    for entity in &summary.scored {
        let approval = entity
            .approval_id
            .map(|id| format!("  approval {id}"))
            .unwrap_or_default();
        println!(
            "  {:<24} tcs {:>3}  {:<6} {} signal(s){approval}",
            entity.entity_id,
            entity.tcs,
            entity.tier.as_str(),
            entity.supporting_signals
        );
    }
    for (entity_id, reason) in &summary.skipped {
        println!("  skipped {entity_id}: {reason}");
    }
    Ok(())
}
