//! YouTube Data API v3 adapter.
//!
//! One term costs two requests: `search` (type=video) for ids, then
//! `videos?part=statistics,snippet` for counters.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use trendgate_core::{entity_slug, Engagement, SocialContentItem};

use crate::adapter::SourceAdapter;
use crate::error::SourceError;
use crate::http::{FetchError, HttpClient, HttpSettings};
use crate::normalize::{aggregate_observations, clean_text, content_flags, parse_utc};
use crate::types::{QueryContext, SourceBatch};

const NAME: &str = "youtube";
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/";
/// `search.list` rejects larger `maxResults`.
const MAX_RESULTS_CAP: u32 = 50;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Deserialize)]
struct Video {
    id: String,
    snippet: VideoSnippet,
    #[serde(default)]
    statistics: VideoStatistics,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    published_at: Option<String>,
    channel_title: Option<String>,
}

/// The API returns counters as decimal strings and omits hidden ones.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

fn counter(raw: Option<&String>) -> i64 {
    raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0)
}

/// `403` with `quotaExceeded` or `rateLimitExceeded` is YouTube's throttle signal.
fn youtube_quota(status: StatusCode, body: &str) -> bool {
    status == StatusCode::FORBIDDEN
        && ["quotaExceeded", "rateLimitExceeded", "dailyLimitExceeded"]
            .iter()
            .any(|reason| body.contains(reason))
}

pub struct YoutubeAdapter {
    http: HttpClient,
    api_key: String,
    search_url: Url,
    videos_url: Url,
}

impl YoutubeAdapter {
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the HTTP client cannot be built.
    pub fn new(api_key: &str, settings: &HttpSettings) -> Result<Self, SourceError> {
        Self::with_base_url(api_key, settings, DEFAULT_BASE_URL)
    }

    /// Point the adapter at a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the HTTP client cannot be built or
    /// `base_url` is not a valid URL.
    pub fn with_base_url(
        api_key: &str,
        settings: &HttpSettings,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        let config_err = |reason: String| SourceError::Config {
            adapter: NAME,
            reason,
        };
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| config_err(format!("invalid base URL '{base_url}': {e}")))?;
        let search_url = base
            .join("search")
            .map_err(|e| config_err(e.to_string()))?;
        let videos_url = base
            .join("videos")
            .map_err(|e| config_err(e.to_string()))?;

        Ok(Self {
            http: HttpClient::new(NAME, settings)?,
            api_key: api_key.to_owned(),
            search_url,
            videos_url,
        })
    }

    async fn fetch(&self, term: &str, ctx: &QueryContext) -> Result<SourceBatch, FetchError> {
        let max_results = ctx.limit.clamp(1, MAX_RESULTS_CAP).to_string();

        let search: SearchResponse = self
            .http
            .send_json(&format!("search(q={term})"), youtube_quota, |client| {
                client.get(self.search_url.clone()).query(&[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("q", term),
                    ("maxResults", max_results.as_str()),
                    ("regionCode", ctx.region.as_str()),
                    ("relevanceLanguage", "ko"),
                    ("key", self.api_key.as_str()),
                ])
            })
            .await?;

        let ids: Vec<String> = search
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();
        if ids.is_empty() {
            return Ok(SourceBatch::default());
        }
        let joined = ids.join(",");

        let videos: VideosResponse = self
            .http
            .send_json(&format!("videos(q={term})"), youtube_quota, |client| {
                client.get(self.videos_url.clone()).query(&[
                    ("part", "statistics,snippet"),
                    ("id", joined.as_str()),
                    ("key", self.api_key.as_str()),
                ])
            })
            .await?;

        Ok(build_batch(term, ctx, videos.items))
    }
}

fn build_batch(term: &str, ctx: &QueryContext, videos: Vec<Video>) -> SourceBatch {
    let entity_id = entity_slug(term);
    let mut totals = Engagement::default();
    let mut content = Vec::with_capacity(videos.len());

    for video in videos {
        let engagement = Engagement {
            views: counter(video.statistics.view_count.as_ref()),
            likes: counter(video.statistics.like_count.as_ref()),
            comments: counter(video.statistics.comment_count.as_ref()),
            shares: 0,
        };
        totals.views += engagement.views;
        totals.likes += engagement.likes;
        totals.comments += engagement.comments;

        let title = clean_text(&video.snippet.title);
        let flags = content_flags(&format!("{} {}", title, video.snippet.description));
        content.push(SocialContentItem {
            platform: NAME.to_string(),
            url: Some(format!("https://www.youtube.com/watch?v={}", video.id)),
            platform_id: video.id,
            entity_id: entity_id.clone(),
            title: Some(title).filter(|t| !t.is_empty()),
            creator: video.snippet.channel_title,
            published_at: video.snippet.published_at.as_deref().and_then(parse_utc),
            engagement,
            flags,
        });
    }

    if content.is_empty() {
        return SourceBatch::default();
    }

    #[allow(clippy::cast_precision_loss)]
    let observations = aggregate_observations(
        NAME,
        &entity_id,
        ctx,
        &[
            ("video_count", content.len() as f64),
            ("view_count", totals.views as f64),
            ("like_count", totals.likes as f64),
            ("comment_count", totals.comments as f64),
        ],
    );

    SourceBatch {
        observations,
        content,
    }
}

#[async_trait]
impl SourceAdapter for YoutubeAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn query(&self, term: &str, ctx: &QueryContext) -> Result<SourceBatch, SourceError> {
        self.fetch(term, ctx)
            .await
            .map_err(|e| e.into_source_error(NAME))
    }
}
