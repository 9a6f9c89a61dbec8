//! In-memory [`ContentStore`] used by tests and local experiments.
//!
//! Documents live in plain collections behind a `tokio` mutex. Every
//! mutating call is appended to a log so callers can assert exactly which
//! writes a run issued (or, for a dry run, that none were).

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    BrandRecord, ContentStore, ImageRef, MotorcycleQuery, MotorcyclePatch, MotorcycleRecord, NewBrand, NewMotorcycle,
};
use crate::error::StoreError;

/// One mutating call received by the store
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateBrand { name: String },
    CreateMotorcycle { id: String, motorcycle: NewMotorcycle },
    Patch { id: String, patch: MotorcyclePatch },
    Delete { id: String },
    Upload { filename: String },
}

#[derive(Default)]
struct State {
    brands: Vec<BrandRecord>,
    motorcycles: Vec<(MotorcycleRecord, Vec<ImageRef>)>,
    mutations: Vec<Mutation>,
    next_id: u64,
}

impl State {
    fn issue_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    reject_credentials: bool,
    fail_uploads: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails as if the token were revoked
    pub fn unauthorized() -> Self {
        Self {
            reject_credentials: true,
            ..Self::default()
        }
    }

    /// Image uploads fail; documents are still accepted
    pub fn with_failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub async fn seed_brand(&self, name: &str) -> String {
        let mut state = self.state.lock().await;
        let id = state.issue_id("brand");
        state.brands.push(BrandRecord {
            id: id.clone(),
            name: name.to_string(),
            slug: Some(crate::utils::slugify(name)),
        });
        id
    }

    /// Insert a motorcycle directly, bypassing the mutation log
    pub async fn seed_motorcycle(&self, record: MotorcycleRecord) {
        let mut state = self.state.lock().await;
        state.motorcycles.push((record, Vec::new()));
    }

    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().await.mutations.clone()
    }

    pub async fn motorcycle(&self, id: &str) -> Option<MotorcycleRecord> {
        self.state
            .lock()
            .await
            .motorcycles
            .iter()
            .find(|(record, _)| record.id == id)
            .map(|(record, _)| record.clone())
    }

    pub async fn images_of(&self, id: &str) -> Vec<ImageRef> {
        self.state
            .lock()
            .await
            .motorcycles
            .iter()
            .find(|(record, _)| record.id == id)
            .map(|(_, images)| images.clone())
            .unwrap_or_default()
    }

    fn authorize(&self) -> Result<(), StoreError> {
        if self.reject_credentials {
            Err(StoreError::Unauthorized { status: 401 })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn brands(&self) -> Result<Vec<BrandRecord>, StoreError> {
        self.authorize()?;
        Ok(self.state.lock().await.brands.clone())
    }

    async fn motorcycles(&self, query: &MotorcycleQuery) -> Result<Vec<MotorcycleRecord>, StoreError> {
        self.authorize()?;
        let state = self.state.lock().await;
        Ok(state
            .motorcycles
            .iter()
            .map(|(record, _)| record)
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }

    async fn create_brand(&self, brand: &NewBrand) -> Result<String, StoreError> {
        self.authorize()?;
        let mut state = self.state.lock().await;
        let id = state.issue_id("brand");
        state.brands.push(BrandRecord {
            id: id.clone(),
            name: brand.name.clone(),
            slug: Some(brand.slug.clone()),
        });
        state.mutations.push(Mutation::CreateBrand {
            name: brand.name.clone(),
        });
        Ok(id)
    }

    async fn create_motorcycle(&self, motorcycle: &NewMotorcycle) -> Result<String, StoreError> {
        self.authorize()?;
        let mut state = self.state.lock().await;
        let id = state.issue_id("motorcycle");
        let record = MotorcycleRecord {
            id: id.clone(),
            brand_id: Some(motorcycle.brand_id.clone()),
            model: motorcycle.model.clone(),
            year: Some(motorcycle.year),
            condition: Some(motorcycle.condition),
            price: motorcycle.price,
            kilometers: motorcycle.kilometers,
            displacement: motorcycle.displacement,
            short_description: Some(motorcycle.short_description.clone()),
            listing_id: motorcycle.listing_id.clone(),
            image_count: Some(motorcycle.images.len() as u32),
        };
        state.motorcycles.push((record, motorcycle.images.clone()));
        state.mutations.push(Mutation::CreateMotorcycle {
            id: id.clone(),
            motorcycle: motorcycle.clone(),
        });
        Ok(id)
    }

    async fn patch_motorcycle(&self, id: &str, patch: &MotorcyclePatch) -> Result<(), StoreError> {
        self.authorize()?;
        let mut state = self.state.lock().await;
        let (record, images) = state
            .motorcycles
            .iter_mut()
            .find(|(record, _)| record.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(brand_id) = &patch.brand_id {
            record.brand_id = Some(brand_id.clone());
        }
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
        if let Some(new_images) = &patch.images {
            record.image_count = Some(new_images.len() as u32);
            *images = new_images.clone();
        }

        state.mutations.push(Mutation::Patch {
            id: id.to_string(),
            patch: patch.clone(),
        });
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.authorize()?;
        let mut state = self.state.lock().await;
        let before = state.motorcycles.len() + state.brands.len();
        state.motorcycles.retain(|(record, _)| record.id != id);
        state.brands.retain(|brand| brand.id != id);
        if state.motorcycles.len() + state.brands.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        state.mutations.push(Mutation::Delete { id: id.to_string() });
        Ok(())
    }

    async fn upload_image(&self, _bytes: Vec<u8>, _content_type: &str, filename: &str) -> Result<String, StoreError> {
        self.authorize()?;
        if self.fail_uploads {
            return Err(StoreError::Api {
                status: 500,
                body: "upload rejected".to_string(),
            });
        }
        let mut state = self.state.lock().await;
        let id = state.issue_id("image");
        state.mutations.push(Mutation::Upload {
            filename: filename.to_string(),
        });
        Ok(id)
    }
}
