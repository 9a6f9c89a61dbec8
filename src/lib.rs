//! Moto Catalog Sync - reconciling catalog ingestion for a motorcycle dealership
//!
//! This library provides the sync pipeline behind the `catalog-sync` binary:
//! - Per-site source adapters (manufacturer sites and a classifieds dealer page)
//! - Retrying, polite HTTP fetching
//! - Field and image extraction with a whitelist image gate
//! - Create / patch / skip reconciliation against the Sanity content store
//! - Explicit, operator-confirmed maintenance operations

pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod logging;
pub mod scraper;
pub mod sources;
pub mod store;
pub mod utils;

// Re-export main types for convenience
pub use crate::catalog::CatalogItem;
pub use crate::config::AppConfig;
pub use crate::core::{SyncOptions, SyncPipeline, SyncReport};
pub use crate::error::{SyncError, SyncResult};
