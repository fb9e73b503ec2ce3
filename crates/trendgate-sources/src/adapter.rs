use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};

use crate::error::SourceError;
use crate::types::{QueryContext, SourceBatch};

/// Uniform capability implemented once per external source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier stored as `signals_raw.source`.
    fn name(&self) -> &'static str;

    /// Run one fresh query for `term`. "No results" is an empty batch.
    async fn query(&self, term: &str, ctx: &QueryContext) -> Result<SourceBatch, SourceError>;
}

#[derive(Debug)]
pub struct TermResult {
    pub term: String,
    pub result: Result<SourceBatch, SourceError>,
}

/// Lazily query `terms` in order, sleeping `min_delay` before every request.
///
/// Nothing is requested until the stream is polled, and dropping it stops
/// further requests, so callers can abandon the remaining terms at any point.
pub fn term_stream<'a>(
    adapter: &'a dyn SourceAdapter,
    terms: &'a [String],
    ctx: &'a QueryContext,
    min_delay: Duration,
) -> impl Stream<Item = TermResult> + Send + 'a {
    stream::iter(terms).then(move |term| async move {
        if !min_delay.is_zero() {
            tokio::time::sleep(min_delay).await;
        }
        let result = adapter.query(term, ctx).await;
        TermResult {
            term: term.clone(),
            result,
        }
    })
}
