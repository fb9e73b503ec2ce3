//! Naver DataLab search-trend adapter.
//!
//! Each term becomes one keyword group queried weekly over a 90-day
//! lookback ending at the run's observation bucket. Every reported period
//! yields one `search_index` observation.

use async_trait::async_trait;
use chrono::TimeDelta;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use trendgate_core::{entity_slug, Observation};

use crate::adapter::SourceAdapter;
use crate::error::SourceError;
use crate::http::{FetchError, HttpClient, HttpSettings};
use crate::normalize::parse_period;
use crate::types::{QueryContext, SourceBatch};

const NAME: &str = "naver";
const DEFAULT_BASE_URL: &str = "https://openapi.naver.com/";
const LOOKBACK_DAYS: i64 = 90;
/// DataLab's daily quota error code.
const QUOTA_ERROR_CODE: &str = "010";

#[derive(Debug, Clone)]
pub struct NaverCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    start_date: String,
    end_date: String,
    time_unit: &'static str,
    keyword_groups: [KeywordGroup<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeywordGroup<'a> {
    group_name: &'a str,
    keywords: [&'a str; 1],
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    data: Vec<PeriodRatio>,
}

#[derive(Deserialize)]
struct PeriodRatio {
    period: String,
    ratio: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NaverErrorBody {
    error_code: String,
}

fn naver_quota(_status: StatusCode, body: &str) -> bool {
    serde_json::from_str::<NaverErrorBody>(body).is_ok_and(|b| b.error_code == QUOTA_ERROR_CODE)
}

pub struct NaverAdapter {
    http: HttpClient,
    credentials: NaverCredentials,
    search_url: Url,
}

impl NaverAdapter {
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the HTTP client cannot be built.
    pub fn new(credentials: NaverCredentials, settings: &HttpSettings) -> Result<Self, SourceError> {
        Self::with_base_url(credentials, settings, DEFAULT_BASE_URL)
    }

    /// Point the adapter at a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the HTTP client cannot be built or
    /// `base_url` is not a valid URL.
    pub fn with_base_url(
        credentials: NaverCredentials,
        settings: &HttpSettings,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        let search_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .and_then(|base| base.join("v1/datalab/search"))
            .map_err(|e| SourceError::Config {
                adapter: NAME,
                reason: format!("invalid base URL '{base_url}': {e}"),
            })?;

        Ok(Self {
            http: HttpClient::new(NAME, settings)?,
            credentials,
            search_url,
        })
    }

    async fn fetch(&self, term: &str, ctx: &QueryContext) -> Result<SourceBatch, FetchError> {
        let end = ctx.observed_at.date_naive();
        let start = (ctx.observed_at - TimeDelta::days(LOOKBACK_DAYS)).date_naive();
        let body = SearchRequest {
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
            time_unit: "week",
            keyword_groups: [KeywordGroup {
                group_name: term,
                keywords: [term],
            }],
        };

        let response: SearchResponse = self
            .http
            .send_json(&format!("datalab/search(q={term})"), naver_quota, |client| {
                client
                    .post(self.search_url.clone())
                    .header("X-Naver-Client-Id", &self.credentials.client_id)
                    .header("X-Naver-Client-Secret", &self.credentials.client_secret)
                    .json(&body)
            })
            .await?;

        Ok(build_batch(term, ctx, response))
    }
}

fn build_batch(term: &str, ctx: &QueryContext, response: SearchResponse) -> SourceBatch {
    let entity_id = entity_slug(term);
    let limit = usize::try_from(ctx.limit).unwrap_or(usize::MAX);

    let mut observations: Vec<Observation> = response
        .results
        .into_iter()
        .flat_map(|result| result.data)
        .filter_map(|point| {
            let observed_at = parse_period(&point.period)?;
            Some(Observation {
                source: NAME.to_string(),
                entity_id: entity_id.clone(),
                region: ctx.region.clone(),
                metric: "search_index".to_string(),
                value: point.ratio,
                observed_at,
                source_confidence: ctx.source_confidence,
            })
        })
        .collect();

    // Keep the most recent periods when the window reports more than the limit.
    observations.sort_by_key(|o| o.observed_at);
    if observations.len() > limit {
        observations.drain(..observations.len() - limit);
    }

    SourceBatch {
        observations,
        content: Vec::new(),
    }
}

#[async_trait]
impl SourceAdapter for NaverAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn query(&self, term: &str, ctx: &QueryContext) -> Result<SourceBatch, SourceError> {
        self.fetch(term, ctx)
            .await
            .map_err(|e| e.into_source_error(NAME))
    }
}
