use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::signals::entity_slug;
use crate::ConfigError;

/// Per-adapter collection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum delay before every request to this source.
    #[serde(default)]
    pub min_delay_ms: u64,
    pub max_results: u32,
    pub region: String,
    pub source_confidence: f64,
    pub terms: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

/// Coefficients of the TCS weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TcsWeights {
    pub velocity: f64,
    pub persistence: f64,
    pub geo_spread: f64,
    pub creator_grade: f64,
    pub commerce_delta: f64,
}

impl Default for TcsWeights {
    fn default() -> Self {
        Self {
            velocity: 0.35,
            persistence: 0.25,
            geo_spread: 0.15,
            creator_grade: 0.15,
            commerce_delta: 0.10,
        }
    }
}

impl TcsWeights {
    #[must_use]
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.velocity,
            self.persistence,
            self.geo_spread,
            self.creator_grade,
            self.commerce_delta,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub high_min_signals: u32,
    pub high_min_tcs: u8,
    pub medium_min_signals: u32,
    pub medium_min_tcs: u8,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high_min_signals: 5,
            high_min_tcs: 70,
            medium_min_signals: 3,
            medium_min_tcs: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: TcsWeights,
    #[serde(default)]
    pub thresholds: TierThresholds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicsFile {
    /// Regions considered when computing geographic spread.
    pub region_universe: Vec<String>,
    /// Keyed by adapter name (`youtube`, `instagram`, `naver`).
    pub sources: BTreeMap<String, SourcePolicy>,
    #[serde(default)]
    pub scoring: ScoringSettings,
}

impl TopicsFile {
    /// Enabled policies, in adapter-name order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = (&str, &SourcePolicy)> {
        self.sources
            .iter()
            .filter(|(_, policy)| policy.enabled)
            .map(|(name, policy)| (name.as_str(), policy))
    }
}

/// Load and validate the topics configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_topics(path: &Path) -> Result<TopicsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::TopicsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_topics(&content)
}

/// Parse and validate topics YAML.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_topics(content: &str) -> Result<TopicsFile, ConfigError> {
    let topics: TopicsFile = serde_yaml::from_str(content).map_err(ConfigError::TopicsFileParse)?;
    validate_topics(&topics)?;
    Ok(topics)
}

fn validate_topics(topics: &TopicsFile) -> Result<(), ConfigError> {
    if topics.region_universe.is_empty() {
        return Err(ConfigError::Validation(
            "region_universe must list at least one region".to_string(),
        ));
    }

    for (name, policy) in &topics.sources {
        if !policy.enabled {
            continue;
        }

        if policy.terms.is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{name}' is enabled but has no terms"
            )));
        }

        let mut seen = HashSet::new();
        for term in &policy.terms {
            let trimmed = term.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "source '{name}' has a blank term"
                )));
            }
            if entity_slug(trimmed).is_empty() {
                return Err(ConfigError::Validation(format!(
                    "source '{name}' term '{trimmed}' has no letters or digits"
                )));
            }
            if !seen.insert(trimmed.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "source '{name}' lists term '{trimmed}' twice"
                )));
            }
        }

        if policy.max_results == 0 {
            return Err(ConfigError::Validation(format!(
                "source '{name}' must allow at least one result"
            )));
        }

        if !(policy.source_confidence > 0.0 && policy.source_confidence <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "source '{name}' has source_confidence {} outside (0, 1]",
                policy.source_confidence
            )));
        }
    }

    let weights = topics.scoring.weights.as_array();
    if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
        return Err(ConfigError::Validation(
            "every scoring weight must lie in [0, 1]".to_string(),
        ));
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || total > 1.0 + 1e-9 {
        return Err(ConfigError::Validation(format!(
            "scoring weights must sum to a value in (0, 1], got {total}"
        )));
    }

    let t = &topics.scoring.thresholds;
    if t.high_min_tcs > 100 || t.medium_min_tcs > 100 {
        return Err(ConfigError::Validation(
            "tier TCS thresholds must be at most 100".to_string(),
        ));
    }
    if t.high_min_signals < t.medium_min_signals || t.high_min_tcs < t.medium_min_tcs {
        return Err(ConfigError::Validation(
            "high tier thresholds must not be below medium tier thresholds".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[path = "topics_test.rs"]
mod tests;
