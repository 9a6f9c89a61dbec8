//! Create / patch / skip decisions against the existing catalog.
//!
//! [`decide`] is pure: it compares one extracted item with the stored record
//! it matched (if any) and returns an [`Action`]. [`Reconciler::apply`] then
//! performs the writes, materialising images first, or only reports what it
//! would have written in a dry run.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::assets::AssetMaterializer;
use crate::catalog::{normalize_brand, CatalogItem, NaturalKey};
use crate::error::{StoreError, SyncError};
use crate::store::{BrandRecord, ContentStore, MotorcyclePatch, MotorcycleRecord, NewBrand, NewMotorcycle};
use crate::utils::slugify;

/// Prices closer than this are considered equal
const PRICE_EPSILON: f64 = 0.005;

/// Existing motorcycles keyed both by origin listing ID and by natural key.
#[derive(Debug, Default)]
pub struct ExistingIndex {
    records: Vec<MotorcycleRecord>,
    by_listing: HashMap<String, usize>,
    by_key: HashMap<NaturalKey, usize>,
}

impl ExistingIndex {
    pub fn new(records: Vec<MotorcycleRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.insert(record);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add or replace a record
    pub fn insert(&mut self, record: MotorcycleRecord) {
        let key = record
            .brand_id
            .as_ref()
            .zip(record.condition)
            .map(|(brand_id, condition)| NaturalKey::new(brand_id.clone(), &record.model, condition));

        let existing = record
            .listing_id
            .as_ref()
            .and_then(|id| self.by_listing.get(id))
            .or_else(|| key.as_ref().and_then(|k| self.by_key.get(k)))
            .copied();

        let slot = match existing {
            Some(slot) => {
                self.records[slot] = record;
                slot
            }
            None => {
                self.records.push(record);
                self.records.len() - 1
            }
        };

        if let Some(id) = self.records[slot].listing_id.clone() {
            self.by_listing.insert(id, slot);
        }
        if let Some(key) = key {
            self.by_key.entry(key).or_insert(slot);
        }
    }

    /// Items with an origin listing ID match on it alone; others on the natural key
    pub fn find(&self, item: &CatalogItem, brand_id: &str) -> Option<&MotorcycleRecord> {
        let slot = match item.source_id.listing_id() {
            Some(listing_id) => self.by_listing.get(listing_id),
            None => self.by_key.get(&NaturalKey::new(brand_id, &item.model, item.condition)),
        };
        slot.map(|&i| &self.records[i])
    }

    /// Fold a patch into the indexed record so later decisions see it
    pub fn record_patch(&mut self, id: &str, patch: &MotorcyclePatch, image_count: Option<u32>) {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return;
        };
        if let Some(year) = patch.year {
            record.year = Some(year);
        }
        if let Some(price) = patch.price {
            record.price = Some(price);
        }
        if let Some(km) = patch.kilometers {
            record.kilometers = Some(km);
        }
        if let Some(cc) = patch.displacement {
            record.displacement = Some(cc);
        }
        if let Some(description) = &patch.short_description {
            record.short_description = Some(description.clone());
        }
        if let Some(count) = image_count {
            record.image_count = Some(count);
        }
    }
}

/// Field changes decided for a matched record. Images are only flagged
/// here; their asset references exist once they have been uploaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannedPatch {
    pub year: Option<i32>,
    pub price: Option<f64>,
    pub kilometers: Option<u32>,
    pub displacement: Option<u32>,
    pub short_description: Option<String>,
    pub replace_images: bool,
}

impl PlannedPatch {
    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        let mut patch = self.scalar_fields();
        if self.replace_images {
            patch.images = Some(Vec::new());
        }
        patch.field_names()
    }

    /// The patch without images
    fn scalar_fields(&self) -> MotorcyclePatch {
        MotorcyclePatch {
            year: self.year,
            price: self.price,
            kilometers: self.kilometers,
            displacement: self.displacement,
            short_description: self.short_description.clone(),
            ..MotorcyclePatch::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Create,
    Patch(PlannedPatch),
    Skip,
}

/// Compare an extracted item with its stored counterpart.
pub fn decide(item: &CatalogItem, existing: Option<&MotorcycleRecord>) -> Action {
    let Some(stored) = existing else {
        return Action::Create;
    };

    let mut patch = PlannedPatch::default();

    if let Some(price) = item.price {
        let changed = stored.price.map_or(true, |old| (old - price).abs() > PRICE_EPSILON);
        if changed {
            patch.price = Some(price);
        }
    }

    if stored.year.map_or(true, |old| item.year > old) {
        patch.year = Some(item.year);
    }

    if stored.displacement.is_none() {
        patch.displacement = item.displacement;
    }

    if !stored.has_description() && !item.short_description.is_empty() {
        patch.short_description = Some(item.short_description.clone());
    }

    if let Some(km) = item.kilometers {
        if stored.kilometers != Some(km) {
            patch.kilometers = Some(km);
        }
    }

    if item.images.len() as u32 != stored.images() {
        patch.replace_images = true;
    }

    if patch.is_empty() {
        Action::Skip
    } else {
        Action::Patch(patch)
    }
}

/// What [`Reconciler::apply`] did (or would have done) for one item
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Created { id: String, images: usize },
    Patched { id: String, fields: Vec<&'static str> },
    Unchanged { id: String },
}

/// Brand lookup with lazy, upper-cased creation.
#[derive(Debug, Default)]
pub struct BrandRegistry {
    brands: Vec<BrandRecord>,
}

impl BrandRegistry {
    pub fn new(brands: Vec<BrandRecord>) -> Self {
        Self { brands }
    }

    /// Case-insensitive lookup
    pub fn find(&self, name: &str) -> Option<&BrandRecord> {
        let wanted = normalize_brand(name);
        self.brands.iter().find(|b| normalize_brand(&b.name) == wanted)
    }

    /// Exact-name lookup, for telling duplicate spellings apart
    pub fn find_exact(&self, name: &str) -> Option<&BrandRecord> {
        self.brands.iter().find(|b| b.name == name)
    }

    /// ID of the named brand, creating it on first sight
    pub async fn resolve(&mut self, name: &str, store: &dyn ContentStore, dry_run: bool) -> Result<String, StoreError> {
        if let Some(brand) = self.find(name) {
            return Ok(brand.id.clone());
        }

        let name = normalize_brand(name);
        let slug = slugify(&name);
        let id = if dry_run {
            info!("[dry-run] would create brand {} ({})", name, slug);
            format!("dry-run-brand-{}", slug)
        } else {
            info!("Creating brand {} ({})", name, slug);
            store
                .create_brand(&NewBrand {
                    name: name.clone(),
                    slug: slug.clone(),
                })
                .await?
        };

        self.brands.push(BrandRecord {
            id: id.clone(),
            name,
            slug: Some(slug),
        });
        Ok(id)
    }
}

/// Performs decided actions against the store.
pub struct Reconciler<'a> {
    store: &'a dyn ContentStore,
    assets: AssetMaterializer<'a>,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn ContentStore, assets: AssetMaterializer<'a>, dry_run: bool) -> Self {
        Self { store, assets, dry_run }
    }

    /// Decide and apply for one item, keeping `index` current
    pub async fn apply(
        &self,
        item: &CatalogItem,
        brand_id: &str,
        index: &mut ExistingIndex,
        asset_headers: &[(String, String)],
    ) -> Result<Applied, SyncError> {
        let existing = index.find(item, brand_id).cloned();

        match (decide(item, existing.as_ref()), existing) {
            (Action::Create, _) => self.create(item, brand_id, index, asset_headers).await,
            (Action::Patch(planned), Some(record)) => self.patch(item, &record.id, planned, index, asset_headers).await,
            (_, record) => {
                let id = record.map(|r| r.id).unwrap_or_default();
                debug!("No material change for {} {}", item.brand, item.model);
                Ok(Applied::Unchanged { id })
            }
        }
    }

    async fn create(
        &self,
        item: &CatalogItem,
        brand_id: &str,
        index: &mut ExistingIndex,
        asset_headers: &[(String, String)],
    ) -> Result<Applied, SyncError> {
        let slug = item.slug();

        let (id, image_count) = if self.dry_run {
            info!(
                "[dry-run] would create {} {} ({}) with {} image(s)",
                item.brand,
                item.model,
                item.year,
                item.images.len()
            );
            (format!("dry-run-{}", slug), item.images.len())
        } else {
            let images = self.assets.materialize(item, asset_headers).await;
            if images.is_empty() {
                return Err(SyncError::NoImagesMaterialized {
                    model: item.model.clone(),
                });
            }
            let count = images.len();

            let new = NewMotorcycle {
                brand_id: brand_id.to_string(),
                model: item.model.clone(),
                slug,
                year: item.year,
                category: item.category,
                condition: item.condition,
                price: item.price,
                kilometers: item.kilometers,
                displacement: item.displacement,
                short_description: item.short_description.clone(),
                listing_id: item.source_id.listing_id().map(str::to_string),
                images,
            };
            let id = self
                .store
                .create_motorcycle(&new)
                .await
                .map_err(|e| SyncError::reconcile(&item.model, e))?;
            (id, count)
        };

        index.insert(MotorcycleRecord {
            id: id.clone(),
            brand_id: Some(brand_id.to_string()),
            model: item.model.clone(),
            year: Some(item.year),
            condition: Some(item.condition),
            price: item.price,
            kilometers: item.kilometers,
            displacement: item.displacement,
            short_description: Some(item.short_description.clone()),
            listing_id: item.source_id.listing_id().map(str::to_string),
            image_count: Some(image_count as u32),
        });

        Ok(Applied::Created { id, images: image_count })
    }

    async fn patch(
        &self,
        item: &CatalogItem,
        id: &str,
        planned: PlannedPatch,
        index: &mut ExistingIndex,
        asset_headers: &[(String, String)],
    ) -> Result<Applied, SyncError> {
        let mut patch = planned.scalar_fields();
        let mut image_count = None;

        if self.dry_run {
            let fields = planned.field_names();
            info!("[dry-run] would update {} {}: {}", item.brand, item.model, fields.join(", "));
            if planned.replace_images {
                image_count = Some(item.images.len() as u32);
            }
            index.record_patch(id, &patch, image_count);
            return Ok(Applied::Patched {
                id: id.to_string(),
                fields,
            });
        }

        if planned.replace_images {
            let images = self.assets.materialize(item, asset_headers).await;
            if images.is_empty() {
                warn!("Keeping existing images for {}: no replacement could be uploaded", item.model);
            } else {
                image_count = Some(images.len() as u32);
                patch.images = Some(images);
            }
        }

        if patch.is_empty() {
            return Ok(Applied::Unchanged { id: id.to_string() });
        }

        let fields = patch.field_names();
        self.store
            .patch_motorcycle(id, &patch)
            .await
            .map_err(|e| SyncError::reconcile(&item.model, e))?;
        index.record_patch(id, &patch, image_count);

        info!("Updated {} {}: {}", item.brand, item.model, fields.join(", "));
        Ok(Applied::Patched {
            id: id.to_string(),
            fields,
        })
    }
}
