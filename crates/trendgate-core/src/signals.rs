use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw observation from a source. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub source: String,
    pub entity_id: String,
    pub region: String,
    pub metric: String,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
    /// Manual entries sit near 1.0, automated API entries below it.
    pub source_confidence: f64,
}

/// Fields that uniquely identify an [`Observation`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub source: String,
    pub entity_id: String,
    pub metric: String,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            source: self.source.clone(),
            entity_id: self.entity_id.clone(),
            metric: self.metric.clone(),
            observed_at: self.observed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFlags {
    pub contains_recipe: bool,
    pub contains_ingredients: bool,
}

/// An external content item (video, post) linked to an entity.
///
/// Identity is `(platform, platform_id)`; re-ingestion only refreshes
/// `engagement` and the store's `last_updated` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialContentItem {
    pub platform: String,
    pub platform_id: String,
    pub entity_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub creator: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub engagement: Engagement,
    pub flags: ContentFlags,
}

/// Derived view over the observations of one entity and metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedTrend {
    pub entity_id: String,
    pub metric: String,
    pub observation_count: i64,
    pub avg_value: f64,
    pub latest_value: f64,
    pub latest_observed_at: DateTime<Utc>,
    pub source_count: i64,
    pub region_count: i64,
}

/// Everything the feature extractor needs about one entity inside a window.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySignalSummary {
    pub entity_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub aggregates: Vec<AggregatedTrend>,
    pub sources: Vec<String>,
    pub regions: Vec<String>,
    /// Distinct `(source, metric)` pairs observed in the window.
    pub supporting_signals: u32,
    /// Observations in the window, oldest first.
    pub observations: Vec<Observation>,
}

/// Normalize a trend or topic name into a lowercase `snake_case` entity id.
///
/// Letters and digits from any script are kept, so Korean terms survive
/// intact. Every other run of characters collapses to a single `_`.
#[must_use]
pub fn entity_slug(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn observation(metric: &str, value: f64) -> Observation {
        Observation {
            source: "youtube".to_string(),
            entity_id: "matcha_latte".to_string(),
            region: "KR".to_string(),
            metric: metric.to_string(),
            value,
            observed_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            source_confidence: 0.8,
        }
    }

    #[test]
    fn slug_lowercases_and_joins_with_underscores() {
        assert_eq!(entity_slug("Matcha Latte"), "matcha_latte");
        assert_eq!(entity_slug("  Dalgona -- Coffee!! "), "dalgona_coffee");
    }

    #[test]
    fn slug_keeps_hangul() {
        assert_eq!(entity_slug("흑임자 라떼"), "흑임자_라떼");
        assert_eq!(entity_slug("#성수동카페"), "성수동카페");
    }

    #[test]
    fn slug_of_punctuation_only_is_empty() {
        assert_eq!(entity_slug("!!! ---"), "");
    }

    #[test]
    fn natural_key_ignores_value_and_confidence() {
        let a = observation("view_count", 10.0);
        let mut b = observation("view_count", 99.0);
        b.source_confidence = 0.1;
        b.region = "JP".to_string();
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn natural_key_differs_by_metric() {
        let a = observation("view_count", 10.0);
        let b = observation("like_count", 10.0);
        assert_ne!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn engagement_serializes_field_names() {
        let engagement = Engagement {
            views: 10,
            likes: 2,
            comments: 1,
            shares: 0,
        };
        let json = serde_json::to_value(engagement).unwrap();
        assert_eq!(json["views"], 10);
        assert_eq!(json["shares"], 0);
    }
}
