use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use moto_catalog_sync::catalog::Condition;
use moto_catalog_sync::core::{SyncOptions, SyncPipeline};
use moto_catalog_sync::error::{FetchError, SyncError};
use moto_catalog_sync::scraper::{FetchedAsset, Headers, PageFetcher};
use moto_catalog_sync::sources::{adapter_for, SourceAdapter};
use moto_catalog_sync::store::memory::Mutation;
use moto_catalog_sync::store::{ContentStore, MemoryStore, MotorcyclePatch, MotorcycleQuery};

const KTM_INDEX: &str = "https://www.ktm.com/it-it/models.html";
const KTM_MOTOCROSS: &str = "https://www.ktm.com/it-it/models/motocross.html";
const KTM_450: &str = "https://www.ktm.com/it-it/models/motocross/450-sx-f.html";
const KTM_250_OLD: &str = "https://www.ktm.com/it-it/models/motocross/250-sx-f-2023.html";

/// Serves canned pages; any `.jpg` is served as image bytes
#[derive(Default)]
struct Site {
    pages: Mutex<HashMap<String, String>>,
    requested: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl Site {
    fn page(self, url: &str, body: &str) -> Self {
        self.set(url, body);
        self
    }

    fn set(&self, url: &str, body: &str) {
        self.pages.lock().unwrap().insert(url.to_string(), body.to_string());
    }

    fn headers_sent_to(&self, url: &str) -> Vec<(String, String)> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, h)| h.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageFetcher for Site {
    async fn fetch_text(&self, url: &str, headers: &Headers) -> Result<String, FetchError> {
        self.requested.lock().unwrap().push((url.to_string(), headers.to_vec()));
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::new(url, 3, "HTTP 404"))
    }

    async fn fetch_bytes(&self, url: &str, headers: &Headers) -> Result<FetchedAsset, FetchError> {
        self.requested.lock().unwrap().push((url.to_string(), headers.to_vec()));
        if url.ends_with(".jpg") {
            Ok(FetchedAsset {
                bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
                content_type: Some("image/jpeg".to_string()),
            })
        } else {
            Err(FetchError::new(url, 3, "HTTP 404"))
        }
    }
}

fn ktm_model_page(price: &str) -> String {
    format!(
        r#"<html><body>
          <h1 class="priceinfo__headline">2026 KTM 450 SX-F</h1>
          <div class="priceinfo__price-value">€ {price}</div>
          <ul><li><span class="c-technical-data__list-label">Cilindrata</span><span>449 cm³</span></li></ul>
          <p>La KTM 450 SX-F unisce potenza e leggerezza in un pacchetto pronto per vincere.</p>
          <img src="https://cdn.ktm.com/PHO_STAGE_450_SXF.jpg">
          <img src="https://cdn.ktm.com/PHO_BIKE_DET_450_action_1.jpg">
          <img src="https://cdn.ktm.com/PHO_BIKE_DET_450_action_2.jpg">
          <img src="https://cdn.ktm.com/PHO_BIKE_90_RE_450.png">
          <img src="https://cdn.ktm.com/PHO_BIKE_PERS_LI_450.png">
        </body></html>"#
    )
}

const KTM_OLD_PAGE: &str = r#"
    <h1 class="priceinfo__headline">2023 KTM 250 SX-F</h1>
    <div class="priceinfo__price-value">€ 9.990</div>
    <img src="https://cdn.ktm.com/PHO_STAGE_250.jpg">
"#;

fn ktm_site() -> Site {
    Site::default()
        .page(KTM_INDEX, r#"<a href="/it-it/models/motocross.html">Motocross</a>"#)
        .page(
            KTM_MOTOCROSS,
            r#"<a href="/it-it/models/motocross/450-sx-f.html">450</a>
               <a href="/it-it/models/motocross/250-sx-f-2023.html">250</a>"#,
        )
        .page(KTM_450, &ktm_model_page("14.220"))
        .page(KTM_250_OLD, KTM_OLD_PAGE)
}

fn options(dry_run: bool) -> SyncOptions {
    SyncOptions {
        dry_run,
        current_year: Some(2026),
        ..SyncOptions::default()
    }
}

async fn run(adapter: &dyn SourceAdapter, site: &Site, store: &MemoryStore, dry_run: bool) -> moto_catalog_sync::SyncReport {
    SyncPipeline::new(adapter, site, store, options(dry_run))
        .run()
        .await
        .expect("run should complete")
}

#[tokio::test(start_paused = true)]
async fn test_create_then_skip_then_patch_price() {
    let adapter = adapter_for("ktm").unwrap();
    let site = ktm_site();
    let store = MemoryStore::new();

    let first = run(adapter.as_ref(), &site, &store, false).await;
    assert_eq!(first.candidates, 2);
    assert_eq!(first.created, 1);
    assert_eq!(first.rejected, 1);
    assert_eq!(first.failed, 0);

    let mutations = store.mutations().await;
    assert_eq!(mutations[0], Mutation::CreateBrand { name: "KTM".into() });
    let uploads = mutations.iter().filter(|m| matches!(m, Mutation::Upload { .. })).count();
    assert_eq!(uploads, 3);
    let created = mutations
        .iter()
        .find_map(|m| match m {
            Mutation::CreateMotorcycle { id, motorcycle } => Some((id.clone(), motorcycle.clone())),
            _ => None,
        })
        .expect("a motorcycle was created");
    let (id, motorcycle) = created;
    assert_eq!(motorcycle.model, "450 SX-F");
    assert_eq!(motorcycle.year, 2026);
    assert_eq!(motorcycle.price, Some(14_220.0));
    assert_eq!(motorcycle.displacement, Some(449));
    assert_eq!(motorcycle.slug, "ktm-450-sx-f-2026");
    assert_eq!(motorcycle.images.len(), 3);
    assert!(motorcycle.images.iter().all(|i| i.alt == "KTM 450 SX-F"));

    let second = run(adapter.as_ref(), &site, &store, false).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(store.mutations().await.len(), mutations.len());

    site.set(KTM_450, &ktm_model_page("13.990"));
    let third = run(adapter.as_ref(), &site, &store, false).await;
    assert_eq!(third.updated, 1);
    assert_eq!(
        store.mutations().await.last(),
        Some(&Mutation::Patch {
            id: id.clone(),
            patch: MotorcyclePatch {
                price: Some(13_990.0),
                ..MotorcyclePatch::default()
            },
        })
    );
    assert_eq!(store.motorcycle(&id).await.unwrap().price, Some(13_990.0));
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_issues_no_mutation() {
    let adapter = adapter_for("ktm").unwrap();
    let site = ktm_site();
    let store = MemoryStore::new();

    let report = run(adapter.as_ref(), &site, &store, true).await;

    assert!(report.dry_run);
    assert_eq!(report.created, 1);
    assert!(store.mutations().await.is_empty());
    assert!(store.brands().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_displacement_is_kept() {
    let adapter = adapter_for("ktm").unwrap();
    let site = ktm_site();
    let store = MemoryStore::new();
    run(adapter.as_ref(), &site, &store, false).await;

    let id = store.motorcycles(&MotorcycleQuery::all()).await.unwrap()[0].id.clone();
    store
        .patch_motorcycle(
            &id,
            &MotorcyclePatch {
                displacement: Some(450),
                ..MotorcyclePatch::default()
            },
        )
        .await
        .unwrap();

    let report = run(adapter.as_ref(), &site, &store, false).await;
    assert_eq!(report.skipped, 1);
    assert_eq!(store.motorcycle(&id).await.unwrap().displacement, Some(450));
}

#[tokio::test(start_paused = true)]
async fn test_failed_uploads_do_not_create_a_record() {
    let adapter = adapter_for("ktm").unwrap();
    let site = ktm_site();
    let store = MemoryStore::new().with_failing_uploads();

    let report = run(adapter.as_ref(), &site, &store, false).await;

    assert_eq!(report.created, 0);
    assert_eq!(report.failed, 1);
    assert!(store.motorcycles(&MotorcycleQuery::all()).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_entry_point_is_fatal() {
    let adapter = adapter_for("ktm").unwrap();
    let site = Site::default();
    let store = MemoryStore::new();

    let result = SyncPipeline::new(adapter.as_ref(), &site, &store, options(false)).run().await;
    let error = result.unwrap_err();
    assert!(matches!(error, SyncError::Discovery { .. }));
    assert!(error.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credentials_are_fatal() {
    let adapter = adapter_for("ktm").unwrap();
    let site = ktm_site();
    let store = MemoryStore::unauthorized();

    let result = SyncPipeline::new(adapter.as_ref(), &site, &store, options(false)).run().await;
    let error = result.unwrap_err();
    assert!(error.is_fatal());
    assert_eq!(error.category(), "auth");
}

const DEALER_LISTING: &str = "https://dealer.moto.it/avanzimoto/Usato";
const DEALER_DETAIL: &str = "https://dealer.moto.it/avanzimoto/Detail/Detail?ID=9031842";

fn dealer_detail(subtitle: &str, km: &str) -> String {
    format!(
        r#"<div class="dlr-modal">
          <h1 class="dlr-modal__print__header__title">Honda</h1>
          <h2 class="dlr-modal__print__header__subtitle">{subtitle}</h2>
          <table class="dlr-modal__specs__table">
            <tr><th class="spec-label">Prezzo</th><td><span itemprop="price">5.690</span> €</td></tr>
            <tr><th class="spec-label">Km</th><td>{km}</td></tr>
            <tr><th class="spec-label">Cilindrata</th><td>471 cc</td></tr>
          </table>
          <div class="dlr-modal__description__content">Unico proprietario, tagliandi certificati.</div>
          <script>var annuncio_9031842 = [{{"href": "https://cdn-img.stcrm.it/images/1000x750/a.jpg"}}, {{"href": "https://cdn-img.stcrm.it/images/1000x750/b.jpg"}}];</script>
        </div>"#
    )
}

#[tokio::test(start_paused = true)]
async fn test_classified_listing_matches_by_listing_id() {
    let adapter = adapter_for("moto-it").unwrap();
    let site = Site::default()
        .page(DEALER_LISTING, r##"<a data-target="#annuncio_9031842">Honda CB 500 X</a>"##)
        .page(DEALER_DETAIL, &dealer_detail("CB 500 X (2021)", "8.723"));
    let store = MemoryStore::new();
    store.seed_brand("Honda").await;

    let first = run(adapter.as_ref(), &site, &store, false).await;
    assert_eq!(first.created, 1);
    assert!(site
        .headers_sent_to(DEALER_DETAIL)
        .contains(&("X-Requested-With".to_string(), "XMLHttpRequest".to_string())));
    assert!(site
        .headers_sent_to("https://cdn-img.stcrm.it/images/1000x750/a.jpg")
        .contains(&("Referer".to_string(), "https://dealer.moto.it/".to_string())));

    let records = store
        .motorcycles(&MotorcycleQuery::all().with_condition(Condition::Usata))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].listing_id.as_deref(), Some("9031842"));
    assert_eq!(records[0].kilometers, Some(8723));
    // existing brand reused despite different casing
    assert!(!store
        .mutations()
        .await
        .iter()
        .any(|m| matches!(m, Mutation::CreateBrand { .. })));

    // dealer retitled the ad and it gained kilometres: same record, patched
    site.set(DEALER_DETAIL, &dealer_detail("CB 500 X ABS (2021)", "9.100"));
    let second = run(adapter.as_ref(), &site, &store, false).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(store.motorcycles(&MotorcycleQuery::all()).await.unwrap().len(), 1);
    assert_eq!(records[0].id, store.motorcycles(&MotorcycleQuery::all()).await.unwrap()[0].id);
}

#[tokio::test(start_paused = true)]
async fn test_missing_model_page_counts_as_failed() {
    let adapter = adapter_for("ktm").unwrap();
    let site = ktm_site().page(
        KTM_MOTOCROSS,
        r#"<a href="/it-it/models/motocross/450-sx-f.html">450</a>
           <a href="/it-it/models/motocross/125-sx.html">125</a>"#,
    );
    let store = MemoryStore::new();

    let report = run(adapter.as_ref(), &site, &store, false).await;

    assert_eq!(report.candidates, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 1);
}
