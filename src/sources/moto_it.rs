//! Used stock of a dealer on the moto.it classifieds platform.
//!
//! The listing is paginated and only exposes listing IDs; details come from
//! an AJAX endpoint returning a modal fragment. Listing IDs are persisted on
//! the record so a re-run matches the same ad even if its title changes.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CandidateSet, SourceAdapter};
use crate::catalog::{Candidate, Category, Condition};
use crate::error::FetchError;
use crate::extract::{parse_displacement, parse_integer, parse_locale_number, parse_year, ExtractedFields, Rejection, StudioClassifier};
use crate::scraper::html::{element_text, first_text, selector};
use crate::scraper::{PageFetcher, Politeness};
use crate::utils::{absolutize, host_of, truncate_chars};

const LISTING_URL: &str = "https://dealer.moto.it/avanzimoto/Usato";
const DETAIL_URL: &str = "https://dealer.moto.it/avanzimoto/Detail/Detail";
const MAX_PAGES: u32 = 10;
const PAGE_DELAY: Duration = Duration::from_millis(800);
const IMAGE_HOST: &str = "cdn-img.stcrm.it";
const MAX_DESCRIPTION_CHARS: usize = 500;

static DATA_TARGET: LazyLock<Selector> = LazyLock::new(|| selector("[data-target]"));
static BRAND: LazyLock<Selector> = LazyLock::new(|| selector(".dlr-modal__print__header__title"));
static MODEL: LazyLock<Selector> = LazyLock::new(|| selector(".dlr-modal__print__header__subtitle"));
static SPEC_ROWS: LazyLock<Selector> = LazyLock::new(|| selector(".dlr-modal__specs__table tr"));
static SPEC_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("th.spec-label"));
static SPEC_VALUE: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static ITEMPROP_PRICE: LazyLock<Selector> = LazyLock::new(|| selector(r#"[itemprop="price"]"#));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector(".dlr-modal__description__content"));
static CDN_IMAGES: LazyLock<Selector> = LazyLock::new(|| selector(r#"img[src*="cdn-img.stcrm.it"]"#));

static LISTING_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"annuncio_(\d+)").expect("listing id pattern"));
static YEAR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d{4}(\s*-\s*\d{2,4})?\)\s*$").expect("year suffix pattern"));
static GALLERY_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*:\s*"([^"]+)""#).expect("gallery href pattern"));
static THUMBNAIL_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/HOR_STD/\d+x/").expect("thumbnail size pattern"));

#[derive(Debug, Deserialize)]
struct GalleryEntry {
    #[serde(default)]
    href: Option<String>,
}

pub struct MotoIt;

fn page_url(page: u32) -> String {
    if page == 1 {
        LISTING_URL.to_string()
    } else {
        format!("{}/pagina-{}", LISTING_URL, page)
    }
}

pub fn detail_url(listing_id: &str) -> String {
    format!("{}?ID={}", DETAIL_URL, listing_id)
}

/// Listing IDs referenced by modal triggers on one listing page
fn listing_ids(raw: &str) -> Vec<String> {
    let doc = Html::parse_document(raw);
    doc.select(&DATA_TARGET)
        .filter_map(|el| el.value().attr("data-target"))
        .filter_map(|target| LISTING_ID.captures(target).map(|caps| caps[1].to_string()))
        .collect()
}

/// Image URLs from the `var annuncio_<id> = [...]` gallery script
fn gallery_script_images(raw: &str, listing_id: &str) -> Vec<String> {
    let pattern = format!(r"(?s)var\s+annuncio_{}\s*=\s*(\[.*?\])", regex::escape(listing_id));
    let Ok(script) = Regex::new(&pattern) else {
        return Vec::new();
    };
    let Some(array) = script.captures(raw).map(|caps| caps[1].to_string()) else {
        return Vec::new();
    };

    let hrefs: Vec<String> = match serde_json::from_str::<Vec<GalleryEntry>>(&array) {
        Ok(entries) => entries.into_iter().filter_map(|e| e.href).collect(),
        Err(e) => {
            debug!("moto-it: gallery for {} is not JSON ({}), scanning hrefs", listing_id, e);
            GALLERY_HREF
                .captures_iter(&array)
                .map(|caps| caps[1].to_string())
                .collect()
        }
    };

    hrefs
        .into_iter()
        .filter(|href| host_of(href).as_deref() == Some(IMAGE_HOST))
        .collect()
}

/// CDN thumbnails in the fragment, upgraded to the large rendition
fn inline_images(raw: &str, page_url: &str) -> Vec<String> {
    let doc = Html::parse_document(raw);
    doc.select(&CDN_IMAGES)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| absolutize(page_url, src))
        .map(|src| THUMBNAIL_SIZE.replace(&src, "/1000x750/").into_owned())
        .collect()
}

#[async_trait]
impl SourceAdapter for MotoIt {
    fn name(&self) -> &'static str {
        "moto-it"
    }

    fn brand(&self) -> Option<&str> {
        None
    }

    fn condition(&self) -> Condition {
        Condition::Usata
    }

    fn request_delay(&self) -> Duration {
        Duration::from_millis(600)
    }

    fn detail_headers(&self) -> Vec<(String, String)> {
        vec![("X-Requested-With".to_string(), "XMLHttpRequest".to_string())]
    }

    fn asset_headers(&self) -> Vec<(String, String)> {
        vec![("Referer".to_string(), "https://dealer.moto.it/".to_string())]
    }

    async fn discover(&self, fetcher: &dyn PageFetcher) -> Result<Vec<Candidate>, FetchError> {
        let politeness = Politeness::new(PAGE_DELAY);
        let mut candidates = CandidateSet::new(self.blacklist());

        for page in 1..=MAX_PAGES {
            politeness.wait().await;
            let url = page_url(page);

            let body = match fetcher.fetch_text(&url, &[]).await {
                Ok(body) => body,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!("moto-it: stopping pagination at page {}: {}", page, e);
                    break;
                }
            };

            let ids = listing_ids(&body);
            if ids.is_empty() {
                debug!("moto-it: page {} has no listings", page);
                break;
            }

            let before = candidates.len();
            for id in ids {
                candidates.push(Candidate::new(detail_url(&id)).with_listing_id(id));
            }
            info!("moto-it: page {} added {} listings", page, candidates.len() - before);
        }

        Ok(candidates.into_vec())
    }

    fn extract_fields(&self, raw: &str, _candidate: &Candidate) -> Result<ExtractedFields, Rejection> {
        let doc = Html::parse_document(raw);

        let brand = first_text(&doc, &BRAND).ok_or(Rejection::MissingBrand)?;
        let subtitle = first_text(&doc, &MODEL).unwrap_or_default();
        let model = YEAR_SUFFIX.replace(&subtitle, "").trim().to_string();
        let mut year = parse_year(&subtitle);

        let mut price = None;
        let mut kilometers = None;
        let mut displacement = None;

        for row in doc.select(&SPEC_ROWS) {
            let Some(label) = row.select(&SPEC_LABEL).next().map(|th| element_text(&th).to_lowercase()) else {
                continue;
            };
            let Some(cell) = row.select(&SPEC_VALUE).next() else {
                continue;
            };
            let value = element_text(&cell);

            if label.contains("prezzo") {
                let tagged = cell.select(&ITEMPROP_PRICE).next().map(|el| {
                    el.value()
                        .attr("content")
                        .map(str::to_string)
                        .unwrap_or_else(|| element_text(&el))
                });
                price = tagged
                    .filter(|t| !t.trim().is_empty())
                    .and_then(|t| parse_locale_number(&t))
                    .or_else(|| parse_locale_number(&value));
            } else if label == "km" {
                kilometers = parse_integer(&value);
            } else if label.contains("cilindrata") {
                displacement = parse_displacement(&value);
            } else if label.contains("anno") && year.is_none() {
                year = parse_year(&value);
            }
        }

        let description = first_text(&doc, &DESCRIPTION)
            .map(|text| truncate_chars(&text, MAX_DESCRIPTION_CHARS))
            .unwrap_or_default();

        Ok(ExtractedFields {
            brand: Some(brand),
            model,
            year,
            price,
            displacement,
            kilometers,
            description,
        })
    }

    async fn extract_images(
        &self,
        raw: &str,
        candidate: &Candidate,
        _classifier: &dyn StudioClassifier,
    ) -> Vec<String> {
        let scripted = candidate
            .listing_id
            .as_deref()
            .map(|id| gallery_script_images(raw, id))
            .unwrap_or_default();

        if scripted.is_empty() {
            inline_images(raw, &candidate.url)
        } else {
            scripted
        }
    }

    fn category_of(&self, _url: &str) -> Category {
        Category::Strada
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::{FixtureFetcher, MarkerClassifier};

    const DETAIL: &str = r#"
        <div class="dlr-modal">
          <div class="dlr-modal__print__header">
            <h1 class="dlr-modal__print__header__title">Honda</h1>
            <h2 class="dlr-modal__print__header__subtitle">CB 500 X (2021)</h2>
          </div>
          <table class="dlr-modal__specs__table">
            <tr><th class="spec-label">Prezzo</th><td>€ <span itemprop="price">5.690</span></td></tr>
            <tr><th class="spec-label">Km</th><td>8.723</td></tr>
            <tr><th class="spec-label">Cilindrata</th><td>471 cc</td></tr>
            <tr><th class="spec-label">Anno</th><td>03/2019</td></tr>
          </table>
          <div class="dlr-modal__description__content">
            Tagliandata, gomme nuove, unico proprietario.
          </div>
          <img src="https://cdn-img.stcrm.it/images/HOR_STD/400x/thumb.jpg">
          <script>
            var annuncio_9031842 = [{"href": "https://cdn-img.stcrm.it/images/1000x750/a.jpg"}, {"href": "https://cdn-img.stcrm.it/images/1000x750/b.jpg"}, {"href": "https://tracker.example/pixel.gif"}];
          </script>
        </div>
    "#;

    fn candidate() -> Candidate {
        Candidate::new(detail_url("9031842")).with_listing_id("9031842")
    }

    #[test]
    fn test_extract_fields_from_modal() {
        let fields = MotoIt.extract_fields(DETAIL, &candidate()).unwrap();

        assert_eq!(fields.brand.as_deref(), Some("Honda"));
        assert_eq!(fields.model, "CB 500 X");
        assert_eq!(fields.year, Some(2021));
        assert_eq!(fields.price, Some(5690.0));
        assert_eq!(fields.kilometers, Some(8723));
        assert_eq!(fields.displacement, Some(471));
        assert_eq!(fields.description, "Tagliandata, gomme nuove, unico proprietario.");
    }

    #[test]
    fn test_year_range_suffix_is_stripped() {
        let page = r#"
            <h1 class="dlr-modal__print__header__title">Yamaha</h1>
            <h2 class="dlr-modal__print__header__subtitle">Tracer 9 GT (2021 - 24)</h2>
        "#;
        let fields = MotoIt.extract_fields(page, &candidate()).unwrap();
        assert_eq!(fields.model, "Tracer 9 GT");
        assert_eq!(fields.year, Some(2021));
    }

    #[test]
    fn test_missing_brand_is_rejected() {
        let page = r#"<h2 class="dlr-modal__print__header__subtitle">CB 500 X</h2>"#;
        assert_eq!(MotoIt.extract_fields(page, &candidate()), Err(Rejection::MissingBrand));
    }

    #[tokio::test]
    async fn test_gallery_script_preferred() {
        let images = MotoIt.extract_images(DETAIL, &candidate(), &MarkerClassifier).await;
        assert_eq!(
            images,
            vec![
                "https://cdn-img.stcrm.it/images/1000x750/a.jpg".to_string(),
                "https://cdn-img.stcrm.it/images/1000x750/b.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn test_gallery_object_literal_falls_back_to_href_scan() {
        let raw = r#"var annuncio_77 = [{href: "https://cdn-img.stcrm.it/x/1.jpg", title: ""}];"#;
        assert_eq!(gallery_script_images(raw, "77"), vec!["https://cdn-img.stcrm.it/x/1.jpg"]);
    }

    #[tokio::test]
    async fn test_inline_thumbnails_upgraded_without_script() {
        let page = r#"<img src="https://cdn-img.stcrm.it/images/HOR_STD/400x/thumb.jpg">"#;
        let images = MotoIt.extract_images(page, &candidate(), &MarkerClassifier).await;
        assert_eq!(images, vec!["https://cdn-img.stcrm.it/images/1000x750/thumb.jpg".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_paginates_until_empty_page() {
        let page_one = r##"
            <a data-target="#annuncio_101">A</a>
            <a data-target="#annuncio_102">B</a>
            <a data-target="#annuncio_101">A again</a>
        "##;
        let page_two = r##"<a data-target="#annuncio_103">C</a>"##;
        let page_three = "<p>Nessun annuncio</p>";
        let fetcher = FixtureFetcher::default()
            .with_page(LISTING_URL, page_one)
            .with_page(&page_url(2), page_two)
            .with_page(&page_url(3), page_three);

        let candidates = MotoIt.discover(&fetcher).await.unwrap();
        let ids: Vec<_> = candidates.iter().filter_map(|c| c.listing_id.as_deref()).collect();
        assert_eq!(ids, vec!["101", "102", "103"]);
        assert_eq!(candidates[0].url, "https://dealer.moto.it/avanzimoto/Detail/Detail?ID=101");
        assert_eq!(fetcher.requested.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_first_page_is_an_error() {
        let fetcher = FixtureFetcher::default();
        assert!(MotoIt.discover(&fetcher).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_page_failure_keeps_earlier_listings() {
        let fetcher = FixtureFetcher::default().with_page(LISTING_URL, r##"<a data-target="#annuncio_5">A</a>"##);
        let candidates = MotoIt.discover(&fetcher).await.unwrap();
        assert_eq!(candidates.len(), 1);
    }
}
