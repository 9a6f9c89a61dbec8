//! Per-site knowledge: where listings live and how detail pages read.
//!
//! Every adapter implements [`SourceAdapter`]. The pipeline only ever talks
//! to the trait, so adding a source means adding a module here and an entry
//! in [`registry`].

use async_trait::async_trait;
use std::time::Duration;

use crate::catalog::{Candidate, Category, Condition};
use crate::error::FetchError;
use crate::extract::{ExtractedFields, PriceBounds, Rejection, StudioClassifier};
use crate::scraper::PageFetcher;

pub mod discovery;
pub mod kymco;
pub mod moto_it;
pub mod pierer;
pub mod registry;
pub mod voge;

pub use discovery::CandidateSet;
pub use registry::{adapter_for, SOURCE_NAMES};

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short identifier used on the command line and in logs
    fn name(&self) -> &'static str;

    /// Fixed brand for manufacturer sites; `None` when each listing names its own
    fn brand(&self) -> Option<&str>;

    fn condition(&self) -> Condition {
        Condition::Nuova
    }

    /// Minimum spacing between detail fetches
    fn request_delay(&self) -> Duration;

    /// Items older than this model year are rejected
    fn year_cutoff(&self) -> Option<i32> {
        None
    }

    fn price_bounds(&self) -> PriceBounds {
        PriceBounds::default()
    }

    /// Slug substrings that never lead to a vehicle page
    fn blacklist(&self) -> &[&'static str] {
        &[]
    }

    /// URL substrings identifying studio shots; such URLs never reach the store
    fn studio_markers(&self) -> &[&'static str] {
        &[]
    }

    /// Headers sent with detail page requests
    fn detail_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Headers sent when downloading images for upload
    fn asset_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Walk the listing entry point and return deduplicated detail candidates.
    ///
    /// An error here means the entry point itself is unreachable.
    async fn discover(&self, fetcher: &dyn PageFetcher) -> Result<Vec<Candidate>, FetchError>;

    /// Pull raw fields out of a detail page
    fn extract_fields(&self, raw: &str, candidate: &Candidate) -> Result<ExtractedFields, Rejection>;

    /// Candidate image URLs in display order, hero first
    async fn extract_images(
        &self,
        raw: &str,
        candidate: &Candidate,
        classifier: &dyn StudioClassifier,
    ) -> Vec<String>;

    /// Category from the detail URL
    fn category_of(&self, url: &str) -> Category;
}

/// First matching substring wins; `fallback` otherwise
pub(crate) fn category_from_rules(url: &str, rules: &[(&str, Category)], fallback: Category) -> Category {
    let lower = url.to_lowercase();
    rules
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, category)| *category)
        .unwrap_or(fallback)
}
