//! Database operations for `social_content`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use trendgate_core::SocialContentItem;

use crate::DbError;

/// A row from the `social_content` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SocialContentRow {
    pub id: i64,
    pub platform: String,
    pub platform_id: String,
    pub entity_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub creator: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// `{views, likes, comments, shares}`.
    pub engagement: serde_json::Value,
    /// `{contains_recipe, contains_ingredients}`.
    pub flags: serde_json::Value,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Insert a content item or refresh its mutable fields.
///
/// Conflicts on `(platform, platform_id)` update engagement, flags and
/// `last_updated`; identity and `first_seen_at` are kept. Returns `true`
/// when a new row was inserted.
///
/// # Errors
///
/// Returns [`DbError::Serialization`] if engagement cannot be encoded, or
/// [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_social_content(
    pool: &PgPool,
    item: &SocialContentItem,
) -> Result<bool, DbError> {
    let engagement = serde_json::to_value(item.engagement)?;
    let flags = serde_json::to_value(item.flags)?;

    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO social_content \
             (platform, platform_id, entity_id, title, url, creator, published_at, \
              engagement, flags) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT ON CONSTRAINT social_content_natural_key DO UPDATE SET \
             engagement   = EXCLUDED.engagement, \
             flags        = EXCLUDED.flags, \
             title        = COALESCE(EXCLUDED.title, social_content.title), \
             creator      = COALESCE(EXCLUDED.creator, social_content.creator), \
             last_updated = NOW() \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(&item.platform)
    .bind(&item.platform_id)
    .bind(&item.entity_id)
    .bind(item.title.as_deref())
    .bind(item.url.as_deref())
    .bind(item.creator.as_deref())
    .bind(item.published_at)
    .bind(engagement)
    .bind(flags)
    .fetch_one(pool)
    .await?;

    Ok(inserted)
}

/// Content items for an entity, most recently updated first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_social_content(
    pool: &PgPool,
    entity_id: &str,
    limit: i64,
) -> Result<Vec<SocialContentRow>, DbError> {
    let rows = sqlx::query_as::<_, SocialContentRow>(
        "SELECT id, platform, platform_id, entity_id, title, url, creator, published_at, \
                engagement, flags, first_seen_at, last_updated \
         FROM social_content \
         WHERE entity_id = $1 \
         ORDER BY last_updated DESC, id DESC \
         LIMIT $2",
    )
    .bind(entity_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
