//! KTM and Husqvarna share one site platform: a models index linking to
//! category pages, which link to model pages with the same price block,
//! technical data list and image naming scheme (`PHO_STAGE`, `PHO_BIKE_DET`).

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

use super::{category_from_rules, CandidateSet, SourceAdapter};
use crate::catalog::{Candidate, Category};
use crate::error::FetchError;
use crate::extract::{parse_displacement, parse_locale_number, ExtractedFields, Rejection, StudioClassifier};
use crate::scraper::html::{element_text, first_text, has_ancestor_with_class, next_element_sibling, parent_element, selector, srcset_first};
use crate::scraper::PageFetcher;
use crate::utils::{absolutize, normalize_whitespace};

static MODEL_LINKS: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href*="/models/"]"#));
static HEADLINE: LazyLock<Selector> = LazyLock::new(|| selector("h1.priceinfo__headline"));
static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static PRICEINFO_VALUE: LazyLock<Selector> = LazyLock::new(|| selector(".priceinfo__price-value"));
static JS_MODEL_PRICE: LazyLock<Selector> = LazyLock::new(|| selector(".js-model-price p"));
static TECH_LABEL: LazyLock<Selector> = LazyLock::new(|| selector(".c-technical-data__list-label"));
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static SOURCE_OR_IMG: LazyLock<Selector> = LazyLock::new(|| selector("source, img"));

static YEAR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^((?:19|20)\d{2})\s+(?:KTM\s+)?(.+)$").expect("year prefix pattern"));
static YEAR_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(\d{4})(?:\s|$)").expect("year word pattern"));
static YEAR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|?\s*(\d{4})$").expect("year suffix pattern"));
static URL_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/-](\d{4})(?:\.html|[/-]|$)").expect("url year pattern"));

/// Containers holding the white-background model carousel
const SLIDER_CLASSES: &[&str] = &["js-model-slide", "models__slide", "glide__slide"];

/// How the model year appears in the page headline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleStyle {
    /// `2026 KTM 450 SX-F`
    YearPrefix,
    /// `Norden 901 Expedition 2026`, `Svartpilen 401 | 2025`, or only in the URL
    YearAnywhere,
}

/// One site on the shared platform
pub struct PiererSite {
    name: &'static str,
    brand: &'static str,
    models_url: &'static str,
    title_style: TitleStyle,
    price_selectors: &'static [&'static LazyLock<Selector>],
    categories: &'static [(&'static str, Category)],
    excluded_models: &'static [&'static str],
    headers: &'static [(&'static str, &'static str)],
}

pub fn ktm() -> PiererSite {
    static PRICES: [&LazyLock<Selector>; 1] = [&PRICEINFO_VALUE];
    PiererSite {
        name: "ktm",
        brand: "KTM",
        models_url: "https://www.ktm.com/it-it/models.html",
        title_style: TitleStyle::YearPrefix,
        price_selectors: &PRICES,
        categories: &[
            ("/motocross/", Category::Cross),
            ("/mx/", Category::Cross),
            ("/enduro/", Category::Enduro),
            ("sx-e", Category::Cross),
            ("freeride", Category::Enduro),
        ],
        excluded_models: &["BRABUS"],
        headers: &[],
    }
}

pub fn husqvarna() -> PiererSite {
    static PRICES: [&LazyLock<Selector>; 2] = [&JS_MODEL_PRICE, &PRICEINFO_VALUE];
    PiererSite {
        name: "husqvarna",
        brand: "HUSQVARNA",
        models_url: "https://www.husqvarna-motorcycles.com/it-it/models.html",
        title_style: TitleStyle::YearAnywhere,
        price_selectors: &PRICES,
        categories: &[
            ("/motocross/", Category::Cross),
            ("/kids-motocross/", Category::Cross),
            ("/enduro/", Category::Enduro),
            ("/electric/", Category::Cross),
        ],
        excluded_models: &[],
        headers: &[("Cookie", "onetrust-policy=accepted")],
    }
}

/// Part of an href after the first `/models/`, if any
fn after_models(href: &str) -> Option<&str> {
    href.split_once("/models/").map(|(_, rest)| rest).filter(|rest| !rest.is_empty())
}

/// Category pages sit one level below `/models/`
fn category_links(raw: &str, page_url: &str) -> Vec<String> {
    let doc = Html::parse_document(raw);
    doc.select(&MODEL_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.ends_with("models.html"))
        .filter(|href| after_models(href).is_some_and(|rest| !rest.contains('/')))
        .filter_map(|href| absolutize(page_url, href))
        .collect()
}

/// Model pages sit at least two levels below `/models/`
fn model_links(raw: &str, page_url: &str) -> Vec<String> {
    let doc = Html::parse_document(raw);
    doc.select(&MODEL_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| after_models(href).is_some_and(|rest| rest.contains('/')))
        .filter_map(|href| absolutize(page_url, href))
        .collect()
}

impl PiererSite {
    fn request_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Split the headline into model name and year
    fn parse_title(&self, headline: &str, url: &str) -> (String, Option<i32>) {
        match self.title_style {
            TitleStyle::YearPrefix => match YEAR_PREFIX.captures(headline) {
                Some(caps) => (caps[2].trim().to_string(), caps[1].parse().ok()),
                None => (headline.to_string(), None),
            },
            TitleStyle::YearAnywhere => {
                let found = YEAR_WORD
                    .captures(headline)
                    .or_else(|| YEAR_SUFFIX.captures(headline));

                let (model, year) = match found {
                    Some(caps) => {
                        let model = headline.replacen(&caps[0], " ", 1);
                        let model = model.trim().trim_end_matches('|').trim().to_string();
                        (model, caps[1].parse().ok())
                    }
                    None => (headline.to_string(), None),
                };

                let year = year.or_else(|| {
                    URL_YEAR.captures(url).and_then(|caps| caps[1].parse().ok())
                });
                (normalize_whitespace(&model), year)
            }
        }
    }

    fn price(&self, doc: &Html) -> Option<f64> {
        self.price_selectors
            .iter()
            .find_map(|sel| first_text(doc, sel))
            .and_then(|text| parse_locale_number(&text))
    }
}

fn displacement(doc: &Html) -> Option<u32> {
    doc.select(&TECH_LABEL).find_map(|label| {
        let label_text = element_text(&label);
        let lower = label_text.to_lowercase();
        if !lower.contains("cilindrata") && !lower.contains("displacement") {
            return None;
        }

        let value = next_element_sibling(&label)
            .map(|el| element_text(&el))
            .filter(|v| !v.is_empty())
            .or_else(|| {
                parent_element(&label).map(|parent| element_text(&parent).replacen(&label_text, "", 1))
            })?;

        parse_displacement(&value)
    })
}

/// First paragraph that reads like marketing copy rather than a disclaimer
fn description(doc: &Html) -> String {
    doc.select(&PARAGRAPH)
        .map(|p| element_text(&p))
        .find(|text| {
            text.chars().count() > 50
                && !text.starts_with('*')
                && !text.contains("IVA")
                && !text.contains("Prezzo")
                && !text.contains("Cookie")
        })
        .unwrap_or_default()
}

/// Hero stage shots first, then outdoor action details outside the studio carousel
fn collect_images(raw: &str, page_url: &str) -> Vec<String> {
    let doc = Html::parse_document(raw);
    let mut stage = Vec::new();
    let mut action = Vec::new();

    for el in doc.select(&SOURCE_OR_IMG) {
        let attrs = el.value();
        let candidate = attrs
            .attr("srcset")
            .and_then(srcset_first)
            .or_else(|| attrs.attr("src"));
        let Some(url) = candidate.and_then(|c| absolutize(page_url, c)) else {
            continue;
        };

        if !url.starts_with("http") || url.contains("MOBILE") {
            continue;
        }

        if url.contains("PHO_STAGE") {
            stage.push(url);
        } else if url.contains("PHO_BIKE_DET")
            && url.to_lowercase().contains("action")
            && !has_ancestor_with_class(&el, SLIDER_CLASSES)
        {
            action.push(url);
        }
    }

    stage.extend(action);
    stage
}

#[async_trait]
impl SourceAdapter for PiererSite {
    fn name(&self) -> &'static str {
        self.name
    }

    fn brand(&self) -> Option<&str> {
        Some(self.brand)
    }

    fn request_delay(&self) -> Duration {
        Duration::from_millis(1000)
    }

    fn year_cutoff(&self) -> Option<i32> {
        Some(2025)
    }

    fn studio_markers(&self) -> &[&'static str] {
        &["PHO_BIKE_90", "PHO_BIKE_PERS"]
    }

    fn detail_headers(&self) -> Vec<(String, String)> {
        self.request_headers()
    }

    async fn discover(&self, fetcher: &dyn PageFetcher) -> Result<Vec<Candidate>, FetchError> {
        let headers = self.request_headers();
        let index = fetcher.fetch_text(self.models_url, &headers).await?;

        let mut categories = category_links(&index, self.models_url);
        let mut seen_categories = std::collections::HashSet::new();
        categories.retain(|c| seen_categories.insert(c.clone()));
        debug!("{}: {} category pages", self.name, categories.len());

        let mut candidates = CandidateSet::new(self.blacklist());
        for category_url in categories {
            let page = match fetcher.fetch_text(&category_url, &headers).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("{}: skipping category {}: {}", self.name, category_url, e);
                    continue;
                }
            };

            for url in model_links(&page, &category_url) {
                candidates.push(Candidate::new(url));
            }
        }

        Ok(candidates.into_vec())
    }

    fn extract_fields(&self, raw: &str, candidate: &Candidate) -> Result<ExtractedFields, Rejection> {
        let doc = Html::parse_document(raw);

        let headline = first_text(&doc, &HEADLINE)
            .or_else(|| first_text(&doc, &H1))
            .ok_or(Rejection::MissingModel)?;
        let (model, year) = self.parse_title(&headline, &candidate.url);

        let upper = model.to_uppercase();
        if let Some(excluded) = self.excluded_models.iter().find(|m| upper.contains(*m)) {
            return Err(Rejection::Excluded(excluded.to_string()));
        }

        Ok(ExtractedFields {
            brand: None,
            model,
            year,
            price: self.price(&doc),
            displacement: displacement(&doc),
            kilometers: None,
            description: description(&doc),
        })
    }

    async fn extract_images(
        &self,
        raw: &str,
        candidate: &Candidate,
        _classifier: &dyn StudioClassifier,
    ) -> Vec<String> {
        collect_images(raw, &candidate.url)
    }

    fn category_of(&self, url: &str) -> Category {
        category_from_rules(url, self.categories, Category::Strada)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::{FixtureFetcher, MarkerClassifier};

    const KTM_MODEL_PAGE: &str = r#"
        <html><body>
          <h1 class="priceinfo__headline">2026 KTM 450 SX-F</h1>
          <div class="priceinfo__price-value">€ 11.990</div>
          <ul class="c-technical-data__list">
            <li><span class="c-technical-data__list-label">Cilindrata</span><span>449,9 cm³</span></li>
          </ul>
          <p>* Prezzo chiavi in mano IVA inclusa, esclusa messa su strada.</p>
          <p>La KTM 450 SX-F è la moto da cross più vincente della sua categoria, ora ancora più leggera.</p>
          <picture>
            <source srcset="https://cdn.ktm.com/PHO_STAGE_MOBILE_450.jpg 1x">
            <source srcset="https://cdn.ktm.com/PHO_STAGE_450.jpg 1x, https://cdn.ktm.com/PHO_STAGE_450@2x.jpg 2x">
            <img src="https://cdn.ktm.com/PHO_STAGE_450_fallback.jpg">
          </picture>
          <div class="glide__slide"><img src="https://cdn.ktm.com/PHO_BIKE_DET_action_slider.jpg"></div>
          <img src="//cdn.ktm.com/PHO_BIKE_DET_450_Action_1.jpg">
          <img src="https://cdn.ktm.com/PHO_BIKE_DET_450_engine.jpg">
          <img src="https://cdn.ktm.com/PHO_BIKE_90_RE_450.png">
        </body></html>
    "#;

    #[test]
    fn test_ktm_extract_fields() {
        let site = ktm();
        let candidate = Candidate::new("https://www.ktm.com/it-it/models/motocross/2026-ktm-450-sx-f.html");
        let fields = site.extract_fields(KTM_MODEL_PAGE, &candidate).unwrap();

        assert_eq!(fields.model, "450 SX-F");
        assert_eq!(fields.year, Some(2026));
        assert_eq!(fields.price, Some(11990.0));
        assert_eq!(fields.displacement, Some(449));
        assert!(fields.description.starts_with("La KTM 450 SX-F"));
    }

    #[tokio::test]
    async fn test_ktm_image_rules() {
        let site = ktm();
        let candidate = Candidate::new("https://www.ktm.com/it-it/models/motocross/2026-ktm-450-sx-f.html");
        let images = site.extract_images(KTM_MODEL_PAGE, &candidate, &MarkerClassifier).await;

        assert_eq!(
            images,
            vec![
                "https://cdn.ktm.com/PHO_STAGE_450.jpg".to_string(),
                "https://cdn.ktm.com/PHO_STAGE_450_fallback.jpg".to_string(),
                "https://cdn.ktm.com/PHO_BIKE_DET_450_Action_1.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn test_ktm_excludes_brabus() {
        let page = r#"<h1 class="priceinfo__headline">2025 BRABUS 1300 R</h1>"#;
        let candidate = Candidate::new("https://www.ktm.com/it-it/models/naked-bike/brabus-1300-r.html");
        assert_eq!(
            ktm().extract_fields(page, &candidate),
            Err(Rejection::Excluded("BRABUS".to_string()))
        );
    }

    #[test]
    fn test_ktm_leading_displacement_is_not_a_year() {
        let site = ktm();
        assert_eq!(
            site.parse_title("1390 Super Duke R", "https://x/models/naked-bike/1390-super-duke-r.html"),
            ("1390 Super Duke R".to_string(), None)
        );
        assert_eq!(
            site.parse_title("2026 KTM 1390 Super Duke R", "https://x/models/naked-bike/1390-super-duke-r.html"),
            ("1390 Super Duke R".to_string(), Some(2026))
        );
    }

    #[test]
    fn test_husqvarna_title_years() {
        let site = husqvarna();
        assert_eq!(
            site.parse_title("Norden 901 Expedition 2026", "https://x/models/travel/norden.html"),
            ("Norden 901 Expedition".to_string(), Some(2026))
        );
        assert_eq!(
            site.parse_title("Svartpilen 401 | 2025", "https://x/models/naked/svartpilen.html"),
            ("Svartpilen 401".to_string(), Some(2025))
        );
        assert_eq!(
            site.parse_title("FC 450", "https://x/models/motocross/fc-450-2026.html"),
            ("FC 450".to_string(), Some(2026))
        );
        assert_eq!(site.parse_title("TE 300", "https://x/models/enduro/te-300.html").1, None);
    }

    #[test]
    fn test_husqvarna_price_selector_priority() {
        let page = r#"
            <h1>Vitpilen 401 2025</h1>
            <div class="js-model-price"><p>6.399 €</p></div>
            <div class="priceinfo__price-value">9.999</div>
        "#;
        let candidate = Candidate::new("https://www.husqvarna-motorcycles.com/it-it/models/naked/vitpilen-401.html");
        let fields = husqvarna().extract_fields(page, &candidate).unwrap();
        assert_eq!(fields.price, Some(6399.0));
        assert_eq!(fields.model, "Vitpilen 401");
    }

    #[test]
    fn test_categories() {
        let site = ktm();
        assert_eq!(site.category_of("https://www.ktm.com/it-it/models/motocross/450.html"), Category::Cross);
        assert_eq!(site.category_of("https://www.ktm.com/it-it/models/electric/ktm-sx-e-5.html"), Category::Cross);
        assert_eq!(site.category_of("https://www.ktm.com/it-it/models/electric/freeride-e.html"), Category::Enduro);
        assert_eq!(site.category_of("https://www.ktm.com/it-it/models/naked-bike/390-duke.html"), Category::Strada);

        let hqv = husqvarna();
        assert_eq!(hqv.category_of("https://x/it-it/models/kids-motocross/tc-50.html"), Category::Cross);
        assert_eq!(hqv.category_of("https://x/it-it/models/travel/norden-901.html"), Category::Strada);
    }

    #[tokio::test]
    async fn test_hierarchical_discovery() {
        let index = r#"
            <a href="/it-it/models.html">Tutti</a>
            <a href="/it-it/models/naked-bike.html">Naked</a>
            <a href="/it-it/models/motocross.html">Motocross</a>
            <a href="/it-it/models/naked-bike.html">Naked again</a>
            <a href="/it-it/models/naked-bike/ktm-390-duke.html">Featured</a>
        "#;
        let naked = r#"
            <a href="/it-it/models/naked-bike/ktm-390-duke.html">390</a>
            <a href="/it-it/models/naked-bike/ktm-390-duke.html#gallery">390 gallery</a>
            <a href="/it-it/models/naked-bike/ktm-990-duke.html">990</a>
        "#;
        let fetcher = FixtureFetcher::default()
            .with_page("https://www.ktm.com/it-it/models.html", index)
            .with_page("https://www.ktm.com/it-it/models/naked-bike.html", naked);

        let candidates = ktm().discover(&fetcher).await.unwrap();
        let urls: Vec<_> = candidates.iter().map(|c| c.url.as_str()).collect();

        assert_eq!(
            urls,
            vec![
                "https://www.ktm.com/it-it/models/naked-bike/ktm-390-duke.html",
                "https://www.ktm.com/it-it/models/naked-bike/ktm-990-duke.html",
            ]
        );
    }

    #[tokio::test]
    async fn test_discovery_fails_when_entry_point_is_unreachable() {
        let fetcher = FixtureFetcher::default();
        assert!(ktm().discover(&fetcher).await.is_err());
    }
}
