//! KYMCO Italia scooters. Product photos are CSS background images and the
//! uploads folder mixes outdoor shots with white-background renders, so
//! images go through pixel inspection.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use super::{CandidateSet, SourceAdapter};
use crate::catalog::{Candidate, Category};
use crate::error::FetchError;
use crate::extract::{parse_locale_number, ExtractedFields, Rejection, StudioClassifier};
use crate::scraper::html::{body_text, first_text, selector, title_text};
use crate::scraper::PageFetcher;
use crate::utils::absolutize;

const CATEGORY_URL: &str = "https://kymco.it/prodotti_categorie/scooter/";

/// Upper bound on images downloaded for pixel inspection per page
const MAX_INSPECTED: usize = 12;

static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static STYLED: LazyLock<Selector> = LazyLock::new(|| selector(r#"[style*="background"]"#));

static PRODUCT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)kymco\.it/Prodotti/_").expect("product link pattern"));
static PRICE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"€\s*([\d.]+,\d{2})").expect("price pattern"));
static DISPLACEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)cilindrata[:\s]*(\d+)").expect("displacement pattern"));
static CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(['"]?(.*?)['"]?\)"#).expect("css url pattern"));

pub struct Kymco;

fn product_links(raw: &str) -> Vec<String> {
    let doc = Html::parse_document(raw);
    doc.select(&LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| absolutize(CATEGORY_URL, href))
        .filter(|url| PRODUCT_LINK.is_match(url))
        .collect()
}

/// Upload-folder JPEG backgrounds; catalogue sheets, logos and banners are skipped
fn background_images(raw: &str, page_url: &str) -> Vec<String> {
    let doc = Html::parse_document(raw);
    let mut seen = HashSet::new();

    doc.select(&STYLED)
        .filter_map(|el| el.value().attr("style"))
        .filter_map(|style| CSS_URL.captures(style).map(|caps| caps[1].to_string()))
        .filter(|url| {
            let lower = url.to_lowercase();
            !lower.contains("/media/")
                && !lower.contains("logo")
                && !lower.contains("icon")
                && !lower.contains("banner")
                && lower.contains("/wp-content/uploads/")
                && (lower.contains(".jpg") || lower.contains(".jpeg"))
        })
        .filter_map(|url| absolutize(page_url, &url))
        .filter(|url| seen.insert(url.clone()))
        .take(MAX_INSPECTED)
        .collect()
}

#[async_trait]
impl SourceAdapter for Kymco {
    fn name(&self) -> &'static str {
        "kymco"
    }

    fn brand(&self) -> Option<&str> {
        Some("KYMCO")
    }

    fn request_delay(&self) -> Duration {
        Duration::from_millis(1500)
    }

    fn studio_markers(&self) -> &[&'static str] {
        &["/media/schede/"]
    }

    async fn discover(&self, fetcher: &dyn PageFetcher) -> Result<Vec<Candidate>, FetchError> {
        let page = fetcher.fetch_text(CATEGORY_URL, &[]).await?;

        let mut candidates = CandidateSet::new(self.blacklist());
        for url in product_links(&page) {
            candidates.push(Candidate::new(url));
        }
        Ok(candidates.into_vec())
    }

    fn extract_fields(&self, raw: &str, _candidate: &Candidate) -> Result<ExtractedFields, Rejection> {
        let doc = Html::parse_document(raw);

        if let Some(title) = title_text(&doc) {
            if title.contains("404") || title.to_lowercase().contains("non trovata") {
                return Err(Rejection::NotAVehiclePage(title));
            }
        }

        let model = first_text(&doc, &H1).ok_or(Rejection::MissingModel)?;
        let text = body_text(&doc);

        let price = PRICE
            .captures(&text)
            .and_then(|caps| parse_locale_number(&caps[1]));
        let displacement = DISPLACEMENT
            .captures(&text)
            .and_then(|caps| caps[1].parse::<u32>().ok());

        Ok(ExtractedFields {
            brand: None,
            model,
            year: None,
            price,
            displacement,
            kilometers: None,
            description: String::new(),
        })
    }

    async fn extract_images(
        &self,
        raw: &str,
        candidate: &Candidate,
        classifier: &dyn StudioClassifier,
    ) -> Vec<String> {
        let backgrounds = background_images(raw, &candidate.url);

        let mut action = Vec::new();
        for url in backgrounds {
            if classifier.is_studio(&url).await {
                debug!("kymco: studio background {}", url);
            } else {
                action.push(url);
            }
        }
        action
    }

    fn category_of(&self, _url: &str) -> Category {
        Category::Scooter
    }
}
