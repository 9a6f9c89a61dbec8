use anyhow::Result;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Response,
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{FetchedAsset, Headers, PageFetcher, UserAgentPool};
use crate::config::FetchConfig;
use crate::error::FetchError;

/// HTTP client wrapper with linear-backoff retry and browser-like headers
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    user_agents: UserAgentPool,
}

impl Fetcher {
    /// Create new fetcher
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert("Accept-Language", HeaderValue::from_str(&config.accept_language)?);

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        info!(
            "HTTP fetcher initialized ({} attempts, {}ms linear backoff)",
            config.max_retries, config.retry_delay_ms
        );

        Ok(Self {
            client,
            config: config.clone(),
            user_agents: UserAgentPool::new(&config.user_agents),
        })
    }

    /// Run `op` up to `max_retries` times, sleeping `attempt * retry_delay` between attempts
    async fn retrying<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let max_retries = self.config.max_retries.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_retries {
            debug!("HTTP GET attempt {} for: {}", attempt, url);

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("HTTP request failed for {} (attempt {}): {}", url, attempt, e);
                    last_error = e;
                }
            }

            if attempt < max_retries {
                let delay = Duration::from_millis(self.config.retry_delay_ms * attempt as u64);
                tokio::time::sleep(delay).await;
            }
        }

        Err(FetchError::new(url, max_retries, last_error))
    }

    /// Make single HTTP request, failing on non-success statuses
    async fn make_request(&self, url: &str, headers: &Headers) -> Result<Response, String> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", self.user_agents.pick());

        for (name, value) in headers {
            if let (Ok(header_name), Ok(header_value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                request = request.header(header_name, header_value);
            }
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for Fetcher {
    async fn fetch_text(&self, url: &str, headers: &Headers) -> Result<String, FetchError> {
        self.retrying(url, || async {
            let response = self.make_request(url, headers).await?;
            response.text().await.map_err(|e| e.to_string())
        })
        .await
    }

    async fn fetch_bytes(&self, url: &str, headers: &Headers) -> Result<FetchedAsset, FetchError> {
        self.retrying(url, || async {
            let response = self.make_request(url, headers).await?;
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let bytes = response.bytes().await.map_err(|e| e.to_string())?;

            Ok(FetchedAsset {
                bytes: bytes.to_vec(),
                content_type,
            })
        })
        .await
    }
}
