use std::time::Duration;
use thiserror::Error;

/// Failure to retrieve a page or asset after the retry budget is spent
#[derive(Error, Debug, Clone, PartialEq)]
#[error("fetch failed after {attempts} attempt(s): {url} - {reason}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    pub reason: String,
}

impl FetchError {
    pub fn new(url: impl Into<String>, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempts,
            reason: reason.into(),
        }
    }
}

/// Errors raised by a content store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("content store rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("content store request failed: HTTP {status} - {body}")]
    Api { status: u16, body: String },

    #[error("content store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("content store response could not be decoded: {0}")]
    Decode(String),

    #[error("document not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Errors surfaced by a sync or maintenance run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Discovery failed for {source_name}: {error}")]
    Discovery { source_name: String, error: FetchError },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Asset upload failed: {url} - {message}")]
    Upload { url: String, message: String },

    #[error("No image could be materialized for {model}")]
    NoImagesMaterialized { model: String },

    #[error("Reconciliation failed for {model}: {error}")]
    Reconcile { model: String, error: StoreError },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Wrap a store error raised while writing a specific item
    pub fn reconcile(model: impl Into<String>, error: StoreError) -> Self {
        Self::Reconcile { model: model.into(), error }
    }

    /// Whether the run must stop instead of moving on to the next candidate
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration { .. } | Self::UnknownSource(_) | Self::Discovery { .. } => true,
            Self::Store(e) | Self::Reconcile { error: e, .. } => e.is_unauthorized(),
            Self::Fetch(_) | Self::Upload { .. } | Self::NoImagesMaterialized { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::UnknownSource(_) => "configuration",
            Self::Discovery { .. } => "discovery",
            Self::Fetch(_) => "fetch",
            Self::Upload { .. } | Self::NoImagesMaterialized { .. } => "asset",
            Self::Reconcile { .. } => "reconcile",
            Self::Store(e) if e.is_unauthorized() => "auth",
            Self::Store(_) => "store",
        }
    }

    /// Suggested wait before the operator retries the whole run
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::Discovery { .. } => Some(Duration::from_secs(60)),
            Self::Store(StoreError::Transport(_)) => Some(Duration::from_secs(30)),
            _ => None,
        }
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;
