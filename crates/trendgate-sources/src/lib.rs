//! Source adapters that turn external trend APIs into normalized observations.
//!
//! Every adapter implements [`SourceAdapter`]. The collector drives adapters
//! through [`term_stream`], which issues one delayed query per term.

mod adapter;
pub mod error;
mod http;
mod instagram;
mod naver;
pub mod normalize;
mod types;
mod youtube;

pub use adapter::{term_stream, SourceAdapter, TermResult};
pub use error::SourceError;
pub use http::{HttpSettings, RetryPolicy};
pub use instagram::{InstagramAdapter, InstagramCredentials};
pub use naver::{NaverAdapter, NaverCredentials};
pub use types::{QueryContext, SourceBatch};
pub use youtube::YoutubeAdapter;
