//! Outbound HTTP: fetching with retry, politeness spacing and browser identity.

use async_trait::async_trait;

use crate::error::FetchError;

pub mod html;
pub mod http_client;
pub mod rate_limiter;
pub mod user_agent;

pub use http_client::Fetcher;
pub use rate_limiter::Politeness;
pub use user_agent::UserAgentPool;

/// Extra request headers as name/value pairs
pub type Headers = [(String, String)];

/// Raw bytes of a downloaded asset
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Retrieval of pages and binary assets.
///
/// [`Fetcher`] is the network implementation. Tests drive the pipeline
/// through fixture implementations of this trait.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a URL and return its body as text
    async fn fetch_text(&self, url: &str, headers: &Headers) -> Result<String, FetchError>;

    /// Fetch a URL and return its raw bytes
    async fn fetch_bytes(&self, url: &str, headers: &Headers) -> Result<FetchedAsset, FetchError>;
}
