//! Build the enabled adapters from configuration.

use trendgate_core::{AppConfig, SourcePolicy, TopicsFile};
use trendgate_sources::{
    HttpSettings, InstagramAdapter, InstagramCredentials, NaverAdapter, NaverCredentials,
    RetryPolicy, SourceAdapter, SourceError, YoutubeAdapter,
};

use crate::orchestrator::{AdapterJob, SourceReport};
use crate::CollectorError;

/// Adapters ready to query plus the sources left out of this run.
#[derive(Debug, Default)]
pub struct JobSet {
    pub jobs: Vec<AdapterJob>,
    pub skipped: Vec<SourceReport>,
}

#[must_use]
pub fn http_settings(config: &AppConfig) -> HttpSettings {
    HttpSettings {
        timeout_secs: config.http_request_timeout_secs,
        user_agent: config.http_user_agent.clone(),
        retry: RetryPolicy {
            max_retries: config.source_max_retries,
            backoff_base_ms: config.source_retry_backoff_base_ms,
        },
    }
}

/// Construct one adapter per enabled source with credentials.
///
/// Disabled sources, sources without credentials, and unknown source names
/// become `skipped` reports.
///
/// # Errors
///
/// Returns [`CollectorError::Source`] if an adapter's HTTP client cannot be
/// built.
pub fn build_jobs(
    config: &AppConfig,
    topics: &TopicsFile,
    only: Option<&str>,
) -> Result<JobSet, CollectorError> {
    let settings = http_settings(config);
    let mut set = JobSet::default();

    for (name, policy) in &topics.sources {
        if only.is_some_and(|wanted| wanted != name) {
            continue;
        }
        if !policy.enabled {
            set.skipped.push(SourceReport::skipped(name, "disabled in topics file"));
            continue;
        }

        match build_adapter(name, config, &settings)? {
            Some(adapter) => set.jobs.push(AdapterJob {
                adapter,
                policy: policy.clone(),
            }),
            None => {
                tracing::warn!(source = %name, "credentials not configured; source skipped");
                set.skipped.push(SourceReport::skipped(name, "credentials not configured"));
            }
        }
    }

    Ok(set)
}

fn build_adapter(
    name: &str,
    config: &AppConfig,
    settings: &HttpSettings,
) -> Result<Option<Box<dyn SourceAdapter>>, SourceError> {
    let adapter: Option<Box<dyn SourceAdapter>> = match name {
        "youtube" => match config.youtube_api_key.as_deref() {
            Some(key) => Some(Box::new(YoutubeAdapter::new(key, settings)?)),
            None => None,
        },
        "instagram" => match (&config.instagram_access_token, &config.instagram_user_id) {
            (Some(access_token), Some(user_id)) => Some(Box::new(InstagramAdapter::new(
                InstagramCredentials {
                    access_token: access_token.clone(),
                    user_id: user_id.clone(),
                },
                settings,
            )?)),
            _ => None,
        },
        "naver" => match (&config.naver_client_id, &config.naver_client_secret) {
            (Some(client_id), Some(client_secret)) => Some(Box::new(NaverAdapter::new(
                NaverCredentials {
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                },
                settings,
            )?)),
            _ => None,
        },
        other => {
            tracing::warn!(source = other, "no adapter for source");
            None
        }
    };
    Ok(adapter)
}

/// Policies of the enabled sources, for dry runs.
pub fn planned_sources(topics: &TopicsFile) -> impl Iterator<Item = (&str, &SourcePolicy)> {
    topics.enabled_sources()
}
