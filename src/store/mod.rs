//! Content store boundary.
//!
//! The sync only needs a handful of primitives from the headless CMS:
//! reading brands and motorcycles, creating documents, partial patches,
//! deletes and binary image upload. [`ContentStore`] captures exactly that
//! so the reconciler can run against Sanity in production and against
//! [`memory::MemoryStore`] in tests.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`brands`](ContentStore::brands) | All brand documents |
//! | [`motorcycles`](ContentStore::motorcycles) | Motorcycle summaries, optionally filtered |
//! | [`create_brand`](ContentStore::create_brand) | Insert a brand, returning its ID |
//! | [`create_motorcycle`](ContentStore::create_motorcycle) | Insert a motorcycle, returning its ID |
//! | [`patch_motorcycle`](ContentStore::patch_motorcycle) | Set a subset of fields, leaving the rest alone |
//! | [`delete`](ContentStore::delete) | Remove any document by ID |
//! | [`upload_image`](ContentStore::upload_image) | Store image bytes, returning an asset ID |

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::catalog::{Category, Condition};
use crate::error::StoreError;

pub mod memory;
pub mod sanity;

pub use memory::MemoryStore;
pub use sanity::SanityStore;

/// A brand document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrandRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Projection of a motorcycle document with the fields reconciliation reads.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorcycleRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub brand_id: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub year: Option<i32>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub kilometers: Option<u32>,
    #[serde(default, rename = "cilindrata", deserialize_with = "lenient_number")]
    pub displacement: Option<u32>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default, rename = "motoItProductId", deserialize_with = "lenient_id")]
    pub listing_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub image_count: Option<u32>,
}

impl MotorcycleRecord {
    pub fn images(&self) -> u32 {
        self.image_count.unwrap_or(0)
    }

    pub fn has_description(&self) -> bool {
        self.short_description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }
}

/// Numbers in the dataset were written by several scripts; accept floats
/// where integers are expected.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_finite())
        .and_then(|v| T::try_from(v.round() as i64).ok()))
}

/// Listing IDs were stored both as strings and as numbers.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Filter for [`ContentStore::motorcycles`]; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorcycleQuery {
    pub brand_id: Option<String>,
    pub condition: Option<Condition>,
}

impl MotorcycleQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn brand(brand_id: impl Into<String>) -> Self {
        Self {
            brand_id: Some(brand_id.into()),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn matches(&self, record: &MotorcycleRecord) -> bool {
        let brand_ok = self
            .brand_id
            .as_ref()
            .map_or(true, |id| record.brand_id.as_ref() == Some(id));
        let condition_ok = self
            .condition
            .map_or(true, |c| record.condition == Some(c));
        brand_ok && condition_ok
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBrand {
    pub name: String,
    pub slug: String,
}

/// One entry of a motorcycle's image array.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    /// Array item key, unique within the document
    pub key: String,
    pub alt: String,
    pub asset_id: String,
}

/// A motorcycle document to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMotorcycle {
    pub brand_id: String,
    pub model: String,
    pub slug: String,
    pub year: i32,
    pub category: Category,
    pub condition: Condition,
    pub price: Option<f64>,
    pub kilometers: Option<u32>,
    pub displacement: Option<u32>,
    pub short_description: String,
    pub listing_id: Option<String>,
    pub images: Vec<ImageRef>,
}

/// Fields to set on an existing motorcycle. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorcyclePatch {
    pub brand_id: Option<String>,
    pub year: Option<i32>,
    pub price: Option<f64>,
    pub kilometers: Option<u32>,
    pub displacement: Option<u32>,
    pub short_description: Option<String>,
    pub images: Option<Vec<ImageRef>>,
}

impl MotorcyclePatch {
    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    /// Document field names this patch sets
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.brand_id.is_some() {
            names.push("brand");
        }
        if self.year.is_some() {
            names.push("year");
        }
        if self.price.is_some() {
            names.push("price");
        }
        if self.kilometers.is_some() {
            names.push("kilometers");
        }
        if self.displacement.is_some() {
            names.push("cilindrata");
        }
        if self.short_description.is_some() {
            names.push("shortDescription");
        }
        if self.images.is_some() {
            names.push("images");
        }
        names
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn brands(&self) -> Result<Vec<BrandRecord>, StoreError>;

    async fn motorcycles(&self, query: &MotorcycleQuery) -> Result<Vec<MotorcycleRecord>, StoreError>;

    async fn create_brand(&self, brand: &NewBrand) -> Result<String, StoreError>;

    async fn create_motorcycle(&self, motorcycle: &NewMotorcycle) -> Result<String, StoreError>;

    /// Set the given fields without clobbering the others
    async fn patch_motorcycle(&self, id: &str, patch: &MotorcyclePatch) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn upload_image(&self, bytes: Vec<u8>, content_type: &str, filename: &str) -> Result<String, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_decodes_projection() {
        let record: MotorcycleRecord = serde_json::from_value(json!({
            "_id": "moto-1",
            "brandId": "brand-ktm",
            "model": "450 SX-F",
            "year": 2026.0,
            "condition": "nuova",
            "price": 14220,
            "cilindrata": 449,
            "shortDescription": null,
            "motoItProductId": 9031842,
            "imageCount": 3
        }))
        .unwrap();

        assert_eq!(record.year, Some(2026));
        assert_eq!(record.displacement, Some(449));
        assert_eq!(record.listing_id.as_deref(), Some("9031842"));
        assert_eq!(record.images(), 3);
        assert_eq!(record.condition, Some(Condition::Nuova));
        assert!(!record.has_description());
    }

    #[test]
    fn test_record_tolerates_missing_fields() {
        let record: MotorcycleRecord = serde_json::from_value(json!({"_id": "moto-2", "imageCount": null})).unwrap();
        assert_eq!(record.images(), 0);
        assert_eq!(record.kilometers, None);
        assert_eq!(record.model, "");
    }

    #[test]
    fn test_query_matching() {
        let record = MotorcycleRecord {
            id: "m".into(),
            brand_id: Some("b1".into()),
            condition: Some(Condition::Usata),
            ..Default::default()
        };
        assert!(MotorcycleQuery::all().matches(&record));
        assert!(MotorcycleQuery::brand("b1").with_condition(Condition::Usata).matches(&record));
        assert!(!MotorcycleQuery::brand("b2").matches(&record));
        assert!(!MotorcycleQuery::all().with_condition(Condition::Nuova).matches(&record));
    }

    #[test]
    fn test_patch_field_names() {
        let patch = MotorcyclePatch {
            price: Some(13_990.0),
            displacement: Some(449),
            ..Default::default()
        };
        assert_eq!(patch.field_names(), vec!["price", "cilindrata"]);
        assert!(MotorcyclePatch::default().is_empty());
    }
}
