//! Voge Italia runs on WordPress: model pages are plain WP pages, so the
//! pages REST endpoint doubles as a flat listing once non-product slugs are
//! filtered out.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

use super::{category_from_rules, CandidateSet, SourceAdapter};
use crate::catalog::{Candidate, Category};
use crate::error::FetchError;
use crate::extract::{parse_displacement, parse_locale_number, ExtractedFields, Rejection, StudioClassifier};
use crate::scraper::html::{closest, element_text, first_text, next_element_sibling, selector, title_text};
use crate::scraper::PageFetcher;

const BASE_URL: &str = "https://vogeitaly.it";
const PAGES_ENDPOINT: &str = "https://vogeitaly.it/wp-json/wp/v2/pages?per_page=100&_fields=id,link,slug,title";

/// WordPress pages that are not vehicle pages
const BLACKLIST: &[&str] = &[
    "accessori",
    "care",
    "coming-soon",
    "social",
    "loncin",
    "informativa-clienti-e-fornitori",
    "privacy-policy",
    "vuoidiventarerivenditore",
    "eicma2024",
    "sample-page",
    "concessionari",
    "promozioni",
    "chi-siamo",
    "contatti",
    "news",
    "faq",
    "garanzia",
    "promo",
    "di-nuovo",
    "areastampa",
    "cookie-policy",
    "informativa-al-trattamento-dei-dati",
    "promo-news",
];

static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static CUSTOM_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h2.vc_custom_heading"));
static PROMO_PRICE: LazyLock<Selector> = LazyLock::new(|| selector(".promo-price"));
static TD: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static PRICE_HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("p strong, p > span > strong, h2, h3, h4"));
static COPY: LazyLock<Selector> = LazyLock::new(|| selector(".wpb_wrapper p"));
static HERO: LazyLock<Selector> = LazyLock::new(|| selector("img.rev-slidebg"));
static GALLERY: LazyLock<Selector> = LazyLock::new(|| selector("img.vc_single_image-img"));
static LIGHTBOX: LazyLock<Selector> = LazyLock::new(|| selector(".mkdf-ig-lightbox img"));

static LIST_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:[.,]\d{3})*(?:[.,]\d{2})?").expect("list price pattern"));
static JPEG_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg)$").expect("jpeg pattern"));

#[derive(Debug, Deserialize)]
struct WpPage {
    link: String,
    slug: String,
}

pub struct Voge;

fn model_name(doc: &Html) -> String {
    let heading = first_text(doc, &H1)
        .or_else(|| first_text(doc, &CUSTOM_HEADING))
        .or_else(|| {
            title_text(doc).map(|t| t.split('–').next().unwrap_or_default().trim().to_string())
        })
        .unwrap_or_default();

    heading.replacen("VOGE", "", 1).trim().to_string()
}

/// Value cell following a label cell whose text contains `label`
fn labelled_cell(doc: &Html, label: &str) -> Option<String> {
    doc.select(&TD)
        .filter(|td| element_text(td).to_lowercase().contains(label))
        .filter_map(|td| next_element_sibling(&td))
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .map(|cell| element_text(&cell))
        .find(|text| !text.is_empty())
}

fn price(doc: &Html) -> Option<f64> {
    if let Some(promo) = first_text(doc, &PROMO_PRICE).and_then(|t| parse_locale_number(&t)) {
        return Some(promo);
    }

    if let Some(listed) = labelled_cell(doc, "prezzo").and_then(|t| parse_locale_number(&t)) {
        return Some(listed);
    }

    doc.select(&PRICE_HEADINGS)
        .map(|el| element_text(&el))
        .filter(|text| {
            let lower = text.to_lowercase();
            text.contains('€') && (lower.contains("prezzo") || lower.contains("listino"))
        })
        .find_map(|text| {
            LIST_PRICE
                .find(&text)
                .and_then(|m| parse_locale_number(m.as_str()))
        })
}

fn description(doc: &Html) -> String {
    doc.select(&COPY)
        .map(|p| element_text(&p))
        .find(|text| {
            text.chars().count() > 30
                && !text.contains("Prezzo")
                && !text.contains('€')
                && !text.contains("Listino")
        })
        .unwrap_or_default()
}

/// Only JPEG photos; PNG renders, logos and icons are studio or chrome
fn accept_image(url: &str) -> Option<String> {
    if !url.starts_with("http") {
        return None;
    }
    let lower = url.to_lowercase();
    if lower.contains(".png") || lower.contains("logo") || lower.contains("icon") {
        return None;
    }
    (lower.contains(".jpg") || lower.contains(".jpeg")).then(|| url.to_string())
}

/// Full-size link of a gallery thumbnail, when it points straight at a JPEG
fn gallery_links(doc: &Html, thumbnails: &Selector) -> Vec<String> {
    doc.select(thumbnails)
        .filter_map(|img| closest(&img, "a"))
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| JPEG_LINK.is_match(href))
        .filter(|href| !href.to_lowercase().contains("estudio"))
        .filter_map(accept_image)
        .collect()
}

fn collect_images(raw: &str) -> Vec<String> {
    let doc = Html::parse_document(raw);
    let mut images: Vec<String> = doc
        .select(&HERO)
        .next()
        .and_then(|hero| hero.value().attr("src"))
        .and_then(accept_image)
        .into_iter()
        .collect();

    let gallery = gallery_links(&doc, &GALLERY);
    if gallery.is_empty() {
        images.extend(gallery_links(&doc, &LIGHTBOX));
    } else {
        images.extend(gallery);
    }

    images
}

#[async_trait]
impl SourceAdapter for Voge {
    fn name(&self) -> &'static str {
        "voge"
    }

    fn brand(&self) -> Option<&str> {
        Some("VOGE")
    }

    fn request_delay(&self) -> Duration {
        Duration::from_millis(1500)
    }

    fn blacklist(&self) -> &[&'static str] {
        BLACKLIST
    }

    fn studio_markers(&self) -> &[&'static str] {
        &[".png", "estudio"]
    }

    async fn discover(&self, fetcher: &dyn PageFetcher) -> Result<Vec<Candidate>, FetchError> {
        let body = fetcher.fetch_text(PAGES_ENDPOINT, &[]).await?;
        let pages: Vec<WpPage> = serde_json::from_str(&body)
            .map_err(|e| FetchError::new(PAGES_ENDPOINT, 1, format!("invalid pages listing: {}", e)))?;

        let home = format!("{}/", BASE_URL);
        let mut candidates = CandidateSet::new(self.blacklist());
        for page in pages {
            if page.slug.trim().is_empty() || page.link == home {
                continue;
            }
            if BLACKLIST.contains(&page.slug.to_lowercase().as_str()) {
                continue;
            }
            candidates.push(Candidate::new(page.link));
        }

        Ok(candidates.into_vec())
    }

    fn extract_fields(&self, raw: &str, _candidate: &Candidate) -> Result<ExtractedFields, Rejection> {
        let doc = Html::parse_document(raw);

        let model = model_name(&doc);
        if model.is_empty() {
            return Err(Rejection::MissingModel);
        }

        Ok(ExtractedFields {
            brand: None,
            model,
            year: None,
            price: price(&doc),
            displacement: labelled_cell(&doc, "cilindrata").and_then(|t| parse_displacement(&t)),
            kilometers: None,
            description: description(&doc),
        })
    }

    async fn extract_images(
        &self,
        raw: &str,
        _candidate: &Candidate,
        _classifier: &dyn StudioClassifier,
    ) -> Vec<String> {
        collect_images(raw)
    }

    fn category_of(&self, url: &str) -> Category {
        category_from_rules(url, &[("sfida", Category::Scooter)], Category::Strada)
    }
}
