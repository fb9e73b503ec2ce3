//! Default feature extraction from an entity's windowed observations.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use trendgate_core::{EntitySignalSummary, FeatureVector, Observation};

/// Grade A sources: video and search-trend platforms.
const GRADE_A_SOURCES: &[&str] = &["youtube", "naver"];
/// Grade B sources: image/social platforms.
const GRADE_B_SOURCES: &[&str] = &["instagram"];

const GRADE_A: f64 = 1.0;
const GRADE_B: f64 = 0.7;
const GRADE_C: f64 = 0.4;

#[must_use]
pub fn source_grade(source: &str) -> f64 {
    if GRADE_A_SOURCES.contains(&source) {
        GRADE_A
    } else if GRADE_B_SOURCES.contains(&source) {
        GRADE_B
    } else {
        GRADE_C
    }
}

pub fn extract_features(summary: &EntitySignalSummary, region_universe: &[String]) -> FeatureVector {
    FeatureVector {
        velocity: velocity(summary),
        persistence: persistence(summary),
        geo_spread: geo_spread(&summary.regions, region_universe),
        creator_grade: creator_grade(&summary.sources),
        commerce_delta: 0.0,
    }
}

/// Mean growth of each `(source, metric)` series between the older and the
/// recent half of the window, each series mapped through `min(growth, 1)`
/// with non-positive growth counted as 0.
///
/// Series observed in only one half carry no growth information and are
/// skipped. The exception is a series that starts from all-zero values and
/// then rises, which counts as full growth.
fn velocity(summary: &EntitySignalSummary) -> f64 {
    let midpoint = summary.window_start + (summary.window_end - summary.window_start) / 2;

    let mut series: BTreeMap<(&str, &str), (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for obs in &summary.observations {
        let halves = series
            .entry((obs.source.as_str(), obs.metric.as_str()))
            .or_default();
        if obs.observed_at < midpoint {
            halves.0.push(obs.value);
        } else {
            halves.1.push(obs.value);
        }
    }

    let growths: Vec<f64> = series
        .values()
        .filter_map(|(older, recent)| {
            let older = mean(older)?;
            let recent = mean(recent)?;
            let growth = if older > 0.0 {
                (recent - older) / older
            } else if recent > 0.0 {
                1.0
            } else {
                0.0
            };
            Some(if growth > 0.0 { growth.min(1.0) } else { 0.0 })
        })
        .collect();

    mean(&growths).unwrap_or(0.0)
}

/// Fraction of the window's calendar days (UTC) with at least one observation.
fn persistence(summary: &EntitySignalSummary) -> f64 {
    let window_days = (summary.window_end - summary.window_start).num_days().max(1);
    let active_days: BTreeSet<NaiveDate> = summary
        .observations
        .iter()
        .filter(|o| o.observed_at >= summary.window_start && o.observed_at <= summary.window_end)
        .map(|o: &Observation| o.observed_at.date_naive())
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let fraction = active_days.len() as f64 / window_days as f64;
    fraction.min(1.0)
}

fn geo_spread(regions: &[String], universe: &[String]) -> f64 {
    if universe.is_empty() {
        return 0.0;
    }
    let covered = regions
        .iter()
        .filter(|r| universe.iter().any(|u| u.eq_ignore_ascii_case(r)))
        .collect::<BTreeSet<_>>()
        .len();

    #[allow(clippy::cast_precision_loss)]
    let spread = covered as f64 / universe.len() as f64;
    spread.min(1.0)
}

fn creator_grade(sources: &[String]) -> f64 {
    let grades: Vec<f64> = sources.iter().map(|s| source_grade(s)).collect();
    mean(&grades).unwrap_or(0.0)
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    Some(values.iter().sum::<f64>() / n)
}
