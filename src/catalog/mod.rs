//! Catalog data model shared by extraction, reconciliation and the store.
//!
//! A [`CatalogItem`] is the normalised, source-independent view of one
//! vehicle. It is built per candidate page and consumed immediately by the
//! reconciler; nothing here is persisted directly.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::normalize_whitespace;

/// Maximum number of images kept per item.
pub const MAX_IMAGES: usize = 4;

/// Vehicle category, a closed set mirrored by the content schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Strada,
    Enduro,
    Cross,
    Scooter,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strada => "strada",
            Self::Enduro => "enduro",
            Self::Cross => "cross",
            Self::Scooter => "scooter",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// New or used stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Nuova,
    Usata,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nuova => "nuova",
            Self::Usata => "usata",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nuova" | "new" => Ok(Self::Nuova),
            "usata" | "used" => Ok(Self::Usata),
            other => Err(format!("unknown condition '{}'", other)),
        }
    }
}

/// Stable identity of an item at its origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// Listing identifier issued by the origin site, persisted on the record.
    Listing(String),
    /// Derived from brand, model and year when the origin exposes no ID.
    Composite(String),
}

impl SourceId {
    pub fn composite(brand: &str, model: &str, year: i32) -> Self {
        Self::Composite(crate::utils::slugify(&format!("{} {} {}", brand, model, year)))
    }

    pub fn listing_id(&self) -> Option<&str> {
        match self {
            Self::Listing(id) => Some(id),
            Self::Composite(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Listing(id) | Self::Composite(id) => id,
        }
    }
}

/// A detail page URL to visit, discovered from a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    /// Origin listing ID when the listing exposes one.
    pub listing_id: Option<String>,
}

impl Candidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            listing_id: None,
        }
    }

    pub fn with_listing_id(mut self, id: impl Into<String>) -> Self {
        self.listing_id = Some(id.into());
        self
    }
}

/// Normalised vehicle record produced by extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub source_id: SourceId,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub category: Category,
    pub condition: Condition,
    pub price: Option<f64>,
    /// Engine displacement in cc.
    pub displacement: Option<u32>,
    pub kilometers: Option<u32>,
    pub short_description: String,
    /// Accepted image URLs, display order, at most [`MAX_IMAGES`].
    pub images: Vec<String>,
    pub detail_url: String,
}

impl CatalogItem {
    /// Slug written on record creation.
    pub fn slug(&self) -> String {
        match &self.source_id {
            SourceId::Listing(id) => {
                crate::utils::slugify(&format!("{} {} {}", self.brand, self.model, id))
            }
            SourceId::Composite(_) => {
                crate::utils::slugify(&format!("{} {} {}", self.brand, self.model, self.year))
            }
        }
    }

    /// Alt text used for every uploaded image.
    pub fn image_alt(&self) -> String {
        format!("{} {}", self.brand, self.model)
    }
}

/// Brand names are compared and stored upper-cased.
pub fn normalize_brand(name: &str) -> String {
    normalize_whitespace(name).to_uppercase()
}

/// Model names are compared case-insensitively with collapsed whitespace.
pub fn normalize_model(model: &str) -> String {
    normalize_whitespace(model).to_lowercase()
}

/// Identity of a record for items without an origin listing ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub brand_id: String,
    pub model: String,
    pub condition: Condition,
}

impl NaturalKey {
    pub fn new(brand_id: impl Into<String>, model: &str, condition: Condition) -> Self {
        Self {
            brand_id: brand_id.into(),
            model: normalize_model(model),
            condition,
        }
    }
}
