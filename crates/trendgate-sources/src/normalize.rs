//! Helpers shared by the adapters for timestamps, text, and content flags.

use std::sync::LazyLock;

use chrono::{DateTime, DurationRound, NaiveDate, TimeDelta, Utc};
use regex::Regex;
use trendgate_core::{ContentFlags, Observation};

use crate::types::QueryContext;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

const RECIPE_KEYWORDS: &[&str] = &["레시피", "만들기", "재료", "준비물", "방법", "단계", "recipe"];

const INGREDIENT_KEYWORDS: &[&str] = &[
    "크림치즈",
    "흑임자",
    "한라봉",
    "피스타치오",
    "바닐라",
    "시럽",
    "우유",
    "에스프레소",
    "matcha",
    "말차",
];

/// Truncate a timestamp to the start of its hour.
///
/// Per-term aggregates use this as their observation time so a repeated run
/// in the same hour yields identical natural keys.
#[must_use]
pub fn observation_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at)
}

/// Parse an RFC 3339 timestamp and convert it to UTC.
///
/// Offsets without a colon (`+0000`, as the Graph API sends) are accepted too.
#[must_use]
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a `YYYY-MM-DD` period label as midnight UTC.
#[must_use]
pub fn parse_period(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Collapse every run of whitespace into one space and trim the ends.
#[must_use]
pub fn clean_text(raw: &str) -> String {
    WHITESPACE_RE.replace_all(raw.trim(), " ").into_owned()
}

/// Hashtag form of a search term: whitespace and a leading `#` removed.
#[must_use]
pub fn hashtag(term: &str) -> String {
    WHITESPACE_RE
        .replace_all(term.trim().trim_start_matches('#'), "")
        .to_lowercase()
}

#[must_use]
pub fn content_flags(text: &str) -> ContentFlags {
    let lowered = text.to_lowercase();
    ContentFlags {
        contains_recipe: RECIPE_KEYWORDS.iter().any(|k| lowered.contains(k)),
        contains_ingredients: INGREDIENT_KEYWORDS.iter().any(|k| lowered.contains(k)),
    }
}

/// Build the per-term aggregate observations for one query.
#[must_use]
pub fn aggregate_observations(
    source: &str,
    entity_id: &str,
    ctx: &QueryContext,
    metrics: &[(&str, f64)],
) -> Vec<Observation> {
    metrics
        .iter()
        .map(|(metric, value)| Observation {
            source: source.to_string(),
            entity_id: entity_id.to_string(),
            region: ctx.region.clone(),
            metric: (*metric).to_string(),
            value: *value,
            observed_at: ctx.observed_at,
            source_confidence: ctx.source_confidence,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    #[test]
    fn bucket_truncates_to_hour() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 47, 13).unwrap();
        let bucket = observation_bucket(at);
        assert_eq!(bucket.hour(), 9);
        assert_eq!(bucket.minute(), 0);
        assert_eq!(bucket.second(), 0);
        assert_eq!(observation_bucket(bucket), bucket);
    }

    #[test]
    fn parse_utc_converts_offsets() {
        let parsed = parse_utc("2026-03-01T18:00:00+09:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let graph = parse_utc("2026-03-01T09:00:00+0000").unwrap();
        assert_eq!(graph, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        assert!(parse_utc("yesterday").is_none());
    }

    #[test]
    fn parse_period_is_midnight_utc() {
        let parsed = parse_period("2026-02-02").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  흑임자\n\n라떼   만들기 "), "흑임자 라떼 만들기");
    }

    #[test]
    fn hashtag_strips_spaces_and_marker() {
        assert_eq!(hashtag("#성수동 카페"), "성수동카페");
        assert_eq!(hashtag("Matcha Latte"), "matchalatte");
    }

    #[test]
    fn flags_detect_recipe_and_ingredients() {
        let flags = content_flags("집에서 흑임자 라떼 만들기");
        assert!(flags.contains_recipe);
        assert!(flags.contains_ingredients);

        let flags = content_flags("Easy MATCHA Recipe");
        assert!(flags.contains_recipe);
        assert!(flags.contains_ingredients);

        assert_eq!(content_flags("성수동 카페 투어"), ContentFlags::default());
    }

    #[test]
    fn aggregates_share_bucket_and_confidence() {
        let ctx = QueryContext {
            observed_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            limit: 5,
            region: "KR".to_string(),
            source_confidence: 0.8,
        };
        let obs = aggregate_observations(
            "youtube",
            "흑임자_라떼",
            &ctx,
            &[("video_count", 3.0), ("view_count", 1200.0)],
        );
        assert_eq!(obs.len(), 2);
        assert!(obs.iter().all(|o| o.observed_at == ctx.observed_at));
        assert!(obs.iter().all(|o| (o.source_confidence - 0.8).abs() < f64::EPSILON));
        assert_eq!(obs[1].metric, "view_count");
    }
}
