//! Source-independent extraction.
//!
//! Adapters pull raw fields out of a detail page; [`Extractor`] then applies
//! the rules every source shares: regex fallbacks, price bounds, year
//! defaulting and cutoff, the image gate and category lookup.

use chrono::Datelike;
use std::fmt;

use crate::catalog::{normalize_brand, Candidate, CatalogItem, SourceId};
use crate::sources::SourceAdapter;
use crate::utils::normalize_whitespace;

pub mod images;
pub mod price;
pub mod specs;
pub mod studio;

pub use images::gate_images;
pub use price::{parse_locale_number, price_from_markup, PriceBounds};
pub use specs::{displacement_from_markup, parse_displacement, parse_integer, parse_year, resolve_year};
pub use studio::{NoStudioCheck, PixelInspector, StudioClassifier};

/// Raw values an adapter pulled from a detail page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    /// Only set by multi-brand sources
    pub brand: Option<String>,
    pub model: String,
    pub year: Option<i32>,
    pub price: Option<f64>,
    pub displacement: Option<u32>,
    pub kilometers: Option<u32>,
    pub description: String,
}

/// Why a candidate produced no item
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NotAVehiclePage(String),
    MissingBrand,
    MissingModel,
    Excluded(String),
    BelowYearCutoff { year: i32, cutoff: i32 },
    NoImages,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAVehiclePage(reason) => write!(f, "not a vehicle page: {}", reason),
            Self::MissingBrand => f.write_str("no brand found"),
            Self::MissingModel => f.write_str("no model name found"),
            Self::Excluded(model) => write!(f, "excluded model: {}", model),
            Self::BelowYearCutoff { year, cutoff } => write!(f, "year {} is before {}", year, cutoff),
            Self::NoImages => f.write_str("no acceptable images"),
        }
    }
}

/// Turns a fetched detail page into a [`CatalogItem`]
pub struct Extractor<'a> {
    adapter: &'a dyn SourceAdapter,
    classifier: &'a dyn StudioClassifier,
    current_year: i32,
}

impl<'a> Extractor<'a> {
    pub fn new(adapter: &'a dyn SourceAdapter, classifier: &'a dyn StudioClassifier) -> Self {
        Self {
            adapter,
            classifier,
            current_year: chrono::Utc::now().year(),
        }
    }

    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub async fn extract(&self, raw: &str, candidate: &Candidate) -> Result<CatalogItem, Rejection> {
        let fields = self.adapter.extract_fields(raw, candidate)?;

        let brand = self
            .adapter
            .brand()
            .map(str::to_string)
            .or(fields.brand)
            .map(|b| normalize_brand(&b))
            .filter(|b| !b.is_empty())
            .ok_or(Rejection::MissingBrand)?;

        let model = normalize_whitespace(&fields.model);
        if model.is_empty() {
            return Err(Rejection::MissingModel);
        }

        let year = resolve_year(fields.year, self.current_year);
        if let Some(cutoff) = self.adapter.year_cutoff() {
            if year < cutoff {
                return Err(Rejection::BelowYearCutoff { year, cutoff });
            }
        }

        let bounds = self.adapter.price_bounds();
        let price = bounds
            .check(fields.price)
            .or_else(|| price_from_markup(raw, bounds));

        let displacement = fields
            .displacement
            .filter(|cc| specs::DISPLACEMENT_RANGE.contains(cc))
            .or_else(|| displacement_from_markup(raw));

        let raw_images = self
            .adapter
            .extract_images(raw, candidate, self.classifier)
            .await;
        let images = gate_images(raw_images, self.adapter.studio_markers());
        if images.is_empty() {
            return Err(Rejection::NoImages);
        }

        let source_id = match &candidate.listing_id {
            Some(id) => SourceId::Listing(id.clone()),
            None => SourceId::composite(&brand, &model, year),
        };

        Ok(CatalogItem {
            source_id,
            brand,
            model,
            year,
            category: self.adapter.category_of(&candidate.url),
            condition: self.adapter.condition(),
            price,
            displacement,
            kilometers: fields.kilometers,
            short_description: normalize_whitespace(&fields.description),
            images,
            detail_url: candidate.url.clone(),
        })
    }
}
