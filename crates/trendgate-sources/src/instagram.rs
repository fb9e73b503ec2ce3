//! Instagram Graph API hashtag adapter.
//!
//! `ig_hashtag_search` resolves the hashtag id, then `{hashtag-id}/recent_media`
//! is paged through `paging.next` until the context limit is reached.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use trendgate_core::{entity_slug, Engagement, SocialContentItem};

use crate::adapter::SourceAdapter;
use crate::error::SourceError;
use crate::http::{FetchError, HttpClient, HttpSettings};
use crate::normalize::{aggregate_observations, clean_text, content_flags, hashtag, parse_utc};
use crate::types::{QueryContext, SourceBatch};

const NAME: &str = "instagram";
const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0/";
const PAGE_SIZE_CAP: u32 = 50;
const MAX_PAGES: usize = 10;
const MEDIA_FIELDS: &str = "id,caption,media_type,permalink,timestamp,like_count,comments_count";

/// Graph API error codes for application, user, and business-use throttling.
const THROTTLE_CODES: &[i64] = &[4, 17, 32, 613];

#[derive(Debug, Clone)]
pub struct InstagramCredentials {
    pub access_token: String,
    pub user_id: String,
}

#[derive(Deserialize)]
struct HashtagSearchResponse {
    #[serde(default)]
    data: Vec<HashtagId>,
}

#[derive(Deserialize)]
struct HashtagId {
    id: String,
}

#[derive(Deserialize)]
struct MediaPage {
    #[serde(default)]
    data: Vec<Media>,
    paging: Option<Paging>,
}

#[derive(Deserialize)]
struct Paging {
    next: Option<String>,
}

#[derive(Deserialize)]
struct Media {
    id: String,
    caption: Option<String>,
    permalink: Option<String>,
    timestamp: Option<String>,
    like_count: Option<i64>,
    comments_count: Option<i64>,
}

#[derive(Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Deserialize)]
struct GraphError {
    code: i64,
}

fn instagram_quota(_status: StatusCode, body: &str) -> bool {
    serde_json::from_str::<GraphErrorBody>(body)
        .is_ok_and(|b| THROTTLE_CODES.contains(&b.error.code))
}

pub struct InstagramAdapter {
    http: HttpClient,
    credentials: InstagramCredentials,
    base_url: Url,
}

impl InstagramAdapter {
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the HTTP client cannot be built.
    pub fn new(
        credentials: InstagramCredentials,
        settings: &HttpSettings,
    ) -> Result<Self, SourceError> {
        Self::with_base_url(credentials, settings, DEFAULT_BASE_URL)
    }

    /// Point the adapter at a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the HTTP client cannot be built or
    /// `base_url` is not a valid URL.
    pub fn with_base_url(
        credentials: InstagramCredentials,
        settings: &HttpSettings,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/'))).map_err(|e| {
            SourceError::Config {
                adapter: NAME,
                reason: format!("invalid base URL '{base_url}': {e}"),
            }
        })?;

        Ok(Self {
            http: HttpClient::new(NAME, settings)?,
            credentials,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::Url(format!("{path}: {e}")))
    }

    async fn fetch(&self, term: &str, ctx: &QueryContext) -> Result<SourceBatch, FetchError> {
        let tag = hashtag(term);
        let search_url = self.endpoint("ig_hashtag_search")?;
        let token = self.credentials.access_token.as_str();
        let user_id = self.credentials.user_id.as_str();

        let found: HashtagSearchResponse = self
            .http
            .send_json(&format!("ig_hashtag_search(q={tag})"), instagram_quota, |client| {
                client.get(search_url.clone()).query(&[
                    ("user_id", user_id),
                    ("q", tag.as_str()),
                    ("access_token", token),
                ])
            })
            .await?;

        let Some(hashtag_id) = found.data.into_iter().next().map(|h| h.id) else {
            return Ok(SourceBatch::default());
        };

        let limit = usize::try_from(ctx.limit.max(1)).unwrap_or(usize::MAX);
        let page_size = ctx.limit.clamp(1, PAGE_SIZE_CAP).to_string();
        let first_page = self.endpoint(&format!("{hashtag_id}/recent_media"))?;

        let mut media: Vec<Media> = Vec::new();
        let mut next: Option<Url> = Some(first_page);
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            let is_first = pages == 0;
            let page: MediaPage = self
                .http
                .send_json(&format!("recent_media(q={tag})"), instagram_quota, |client| {
                    let request = client.get(url.clone());
                    // `paging.next` already carries every query parameter.
                    if is_first {
                        request.query(&[
                            ("user_id", user_id),
                            ("fields", MEDIA_FIELDS),
                            ("limit", page_size.as_str()),
                            ("access_token", token),
                        ])
                    } else {
                        request
                    }
                })
                .await?;
            pages += 1;

            media.extend(page.data);
            if media.len() >= limit || pages >= MAX_PAGES {
                break;
            }
            next = page
                .paging
                .and_then(|p| p.next)
                .and_then(|raw| Url::parse(&raw).ok());
        }

        media.truncate(limit);
        Ok(build_batch(term, ctx, media))
    }
}

fn build_batch(term: &str, ctx: &QueryContext, media: Vec<Media>) -> SourceBatch {
    if media.is_empty() {
        return SourceBatch::default();
    }

    let entity_id = entity_slug(term);
    let mut totals = Engagement::default();
    let content: Vec<SocialContentItem> = media
        .into_iter()
        .map(|post| {
            let caption = post.caption.as_deref().map(clean_text).unwrap_or_default();
            let engagement = Engagement {
                views: 0,
                likes: post.like_count.unwrap_or(0),
                comments: post.comments_count.unwrap_or(0),
                shares: 0,
            };
            totals.likes += engagement.likes;
            totals.comments += engagement.comments;

            SocialContentItem {
                platform: NAME.to_string(),
                platform_id: post.id,
                entity_id: entity_id.clone(),
                title: Some(caption.chars().take(100).collect::<String>())
                    .filter(|t| !t.is_empty()),
                url: post.permalink,
                creator: None,
                published_at: post.timestamp.as_deref().and_then(parse_utc),
                engagement,
                flags: content_flags(&caption),
            }
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let observations = aggregate_observations(
        NAME,
        &entity_id,
        ctx,
        &[
            ("post_count", content.len() as f64),
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
impl SourceAdapter for InstagramAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn query(&self, term: &str, ctx: &QueryContext) -> Result<SourceBatch, SourceError> {
        self.fetch(term, ctx)
            .await
            .map_err(|e| e.into_source_error(NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_codes_are_rate_limits() {
        let body = r#"{"error":{"message":"Application request limit reached","code":4}}"#;
        assert!(instagram_quota(StatusCode::BAD_REQUEST, body));
        let body = r#"{"error":{"message":"Invalid OAuth access token","code":190}}"#;
        assert!(!instagram_quota(StatusCode::BAD_REQUEST, body));
        assert!(!instagram_quota(StatusCode::BAD_GATEWAY, "<html>"));
    }
}
