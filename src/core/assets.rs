use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::catalog::CatalogItem;
use crate::error::SyncError;
use crate::scraper::{PageFetcher, Politeness};
use crate::store::{ContentStore, ImageRef};

/// Downloads accepted images and stores them as content store assets.
///
/// Uploads are best effort: a failed image is logged and skipped, and the
/// caller receives whatever succeeded, in source order.
pub struct AssetMaterializer<'a> {
    fetcher: &'a dyn PageFetcher,
    store: &'a dyn ContentStore,
    spacing: Politeness,
}

impl<'a> AssetMaterializer<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, store: &'a dyn ContentStore, spacing: Duration) -> Self {
        Self {
            fetcher,
            store,
            spacing: Politeness::new(spacing),
        }
    }

    pub async fn materialize(&self, item: &CatalogItem, headers: &[(String, String)]) -> Vec<ImageRef> {
        let slug = item.slug();
        let mut refs = Vec::with_capacity(item.images.len());

        for (index, url) in item.images.iter().enumerate() {
            self.spacing.wait().await;

            match self.upload_one(url, &slug, index, headers).await {
                Ok(asset_id) => refs.push(ImageRef {
                    key: image_key(),
                    alt: item.image_alt(),
                    asset_id,
                }),
                Err(e) => warn!("Skipping image for {} ({}): {}", item.model, e.category(), e),
            }
        }

        refs
    }

    async fn upload_one(
        &self,
        url: &str,
        slug: &str,
        index: usize,
        headers: &[(String, String)],
    ) -> Result<String, SyncError> {
        let asset = self.fetcher.fetch_bytes(url, headers).await?;
        let content_type = asset
            .content_type
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or_else(|| "image/jpeg".to_string());
        let filename = format!("{}-{}.{}", slug, index + 1, extension_for(&content_type));

        self.store
            .upload_image(asset.bytes, &content_type, &filename)
            .await
            .map_err(|e| SyncError::Upload {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

/// Array item key for an image entry
fn image_key() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type.split(';').next().unwrap_or_default().trim() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}
