//! Sanity HTTP API backend.
//!
//! Reads go through the GROQ query endpoint, writes through the mutate
//! endpoint and images through the assets endpoint. All requests carry the
//! bearer token; 401/403 are surfaced as [`StoreError::Unauthorized`] so the
//! pipeline can stop the run instead of failing every item.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{
    BrandRecord, ContentStore, ImageRef, MotorcycleQuery, MotorcyclePatch, MotorcycleRecord, NewBrand, NewMotorcycle,
};
use crate::config::StoreConfig;
use crate::error::StoreError;

const MOTORCYCLE_PROJECTION: &str = r#"{
  _id, model, year, condition, price, kilometers, cilindrata, shortDescription, motoItProductId,
  "brandId": brand._ref,
  "imageCount": count(images)
}"#;

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutateResult>,
}

#[derive(Debug, Deserialize)]
struct MutateResult {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    document: AssetDocument,
}

#[derive(Debug, Deserialize)]
struct AssetDocument {
    #[serde(rename = "_id")]
    id: String,
}

pub struct SanityStore {
    client: Client,
    config: StoreConfig,
}

impl SanityStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.token))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()?;

        info!(
            "Sanity store ready (project {}, dataset {}, API v{})",
            config.project_id, config.dataset, config.api_version
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self, kind: &str) -> String {
        format!(
            "https://{}.api.sanity.io/v{}/{}/{}",
            self.config.project_id, self.config.api_version, kind, self.config.dataset
        )
    }

    async fn query<T: DeserializeOwned>(&self, groq: &str, params: &[(String, Value)]) -> Result<T, StoreError> {
        let mut pairs = vec![("query".to_string(), groq.to_string())];
        for (name, value) in params {
            pairs.push((format!("${}", name), value.to_string()));
        }

        debug!("GROQ: {}", groq);
        let response = self
            .client
            .get(self.endpoint("data/query"))
            .query(&pairs)
            .send()
            .await?;
        let body: QueryResponse<T> = decode(check(response).await?).await?;
        Ok(body.result)
    }

    async fn mutate(&self, mutations: Vec<Value>) -> Result<Vec<String>, StoreError> {
        let response = self
            .client
            .post(self.endpoint("data/mutate"))
            .query(&[("returnIds", "true")])
            .json(&json!({ "mutations": mutations }))
            .send()
            .await?;
        let body: MutateResponse = decode(check(response).await?).await?;
        Ok(body.results.into_iter().map(|r| r.id).collect())
    }

    async fn create(&self, document: Value) -> Result<String, StoreError> {
        self.mutate(vec![json!({ "create": document })])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("create returned no document id".to_string()))
    }
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(StoreError::Unauthorized { status: status.as_u16() });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
}

/// GROQ filter and parameters for a motorcycle query
pub fn motorcycle_filter(query: &MotorcycleQuery) -> (String, Vec<(String, Value)>) {
    let mut clauses = vec![r#"_type == "motorcycle""#.to_string()];
    let mut params = Vec::new();

    if let Some(brand_id) = &query.brand_id {
        clauses.push("brand._ref == $brandId".to_string());
        params.push(("brandId".to_string(), Value::String(brand_id.clone())));
    }
    if let Some(condition) = query.condition {
        clauses.push("condition == $condition".to_string());
        params.push(("condition".to_string(), Value::String(condition.as_str().to_string())));
    }

    (format!("*[{}]", clauses.join(" && ")), params)
}

fn reference(id: &str) -> Value {
    json!({ "_type": "reference", "_ref": id })
}

fn images_value(images: &[ImageRef]) -> Value {
    Value::Array(
        images
            .iter()
            .map(|image| {
                json!({
                    "_key": image.key,
                    "_type": "image",
                    "alt": image.alt,
                    "asset": reference(&image.asset_id),
                })
            })
            .collect(),
    )
}

/// Document body for a new motorcycle
pub fn motorcycle_document(motorcycle: &NewMotorcycle) -> Value {
    let mut doc = json!({
        "_type": "motorcycle",
        "model": motorcycle.model,
        "slug": { "_type": "slug", "current": motorcycle.slug },
        "brand": reference(&motorcycle.brand_id),
        "year": motorcycle.year,
        "type": motorcycle.category.as_str(),
        "condition": motorcycle.condition.as_str(),
        "price": motorcycle.price,
        "shortDescription": motorcycle.short_description,
        "images": images_value(&motorcycle.images),
    });

    if let Some(map) = doc.as_object_mut() {
        if let Some(cc) = motorcycle.displacement {
            map.insert("cilindrata".to_string(), json!(cc));
        }
        if let Some(km) = motorcycle.kilometers {
            map.insert("kilometers".to_string(), json!(km));
        }
        if let Some(id) = &motorcycle.listing_id {
            map.insert("motoItProductId".to_string(), json!(id));
        }
    }
    doc
}

/// The `set` object of a patch mutation
pub fn patch_set(patch: &MotorcyclePatch) -> Map<String, Value> {
    let mut set = Map::new();
    if let Some(brand_id) = &patch.brand_id {
        set.insert("brand".to_string(), reference(brand_id));
    }
    if let Some(year) = patch.year {
        set.insert("year".to_string(), json!(year));
    }
    if let Some(price) = patch.price {
        set.insert("price".to_string(), json!(price));
    }
    if let Some(km) = patch.kilometers {
        set.insert("kilometers".to_string(), json!(km));
    }
    if let Some(cc) = patch.displacement {
        set.insert("cilindrata".to_string(), json!(cc));
    }
    if let Some(description) = &patch.short_description {
        set.insert("shortDescription".to_string(), json!(description));
    }
    if let Some(images) = &patch.images {
        set.insert("images".to_string(), images_value(images));
    }
    set
}

#[async_trait]
impl ContentStore for SanityStore {
    async fn brands(&self) -> Result<Vec<BrandRecord>, StoreError> {
        self.query(r#"*[_type == "brand"]{ _id, name, "slug": slug.current }"#, &[])
            .await
    }

    async fn motorcycles(&self, query: &MotorcycleQuery) -> Result<Vec<MotorcycleRecord>, StoreError> {
        let (filter, params) = motorcycle_filter(query);
        self.query(&format!("{} {}", filter, MOTORCYCLE_PROJECTION), &params)
            .await
    }

    async fn create_brand(&self, brand: &NewBrand) -> Result<String, StoreError> {
        self.create(json!({
            "_type": "brand",
            "name": brand.name,
            "slug": { "_type": "slug", "current": brand.slug },
        }))
        .await
    }

    async fn create_motorcycle(&self, motorcycle: &NewMotorcycle) -> Result<String, StoreError> {
        self.create(motorcycle_document(motorcycle)).await
    }

    async fn patch_motorcycle(&self, id: &str, patch: &MotorcyclePatch) -> Result<(), StoreError> {
        let set = patch_set(patch);
        if set.is_empty() {
            return Ok(());
        }
        self.mutate(vec![json!({ "patch": { "id": id, "set": set } })])
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.mutate(vec![json!({ "delete": { "id": id } })]).await?;
        Ok(())
    }

    async fn upload_image(&self, bytes: Vec<u8>, content_type: &str, filename: &str) -> Result<String, StoreError> {
        let response = self
            .client
            .post(self.endpoint("assets/images"))
            .query(&[("filename", filename)])
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let body: AssetResponse = decode(check(response).await?).await?;
        Ok(body.document.id)
    }
}
