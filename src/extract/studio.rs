use async_trait::async_trait;
use image::DynamicImage;
use tracing::debug;

use crate::scraper::PageFetcher;

/// Channel value above which a pixel counts as white background
pub const NEAR_WHITE_THRESHOLD: u8 = 245;

/// Offset from the top corners at which the background is sampled
const SAMPLE_OFFSET: u32 = 10;

/// Decides whether an image is a studio shot on a plain white background
#[async_trait]
pub trait StudioClassifier: Send + Sync {
    async fn is_studio(&self, url: &str) -> bool;
}

/// Downloads the image and samples its two top corners.
///
/// Any failure to download or decode classifies the image as studio.
pub struct PixelInspector<'a> {
    fetcher: &'a dyn PageFetcher,
    headers: Vec<(String, String)>,
}

impl<'a> PixelInspector<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, headers: Vec<(String, String)>) -> Self {
        Self { fetcher, headers }
    }
}

#[async_trait]
impl StudioClassifier for PixelInspector<'_> {
    async fn is_studio(&self, url: &str) -> bool {
        let asset = match self.fetcher.fetch_bytes(url, &self.headers).await {
            Ok(asset) => asset,
            Err(e) => {
                debug!("Studio check could not download {}: {}", url, e);
                return true;
            }
        };

        match image::load_from_memory(&asset.bytes) {
            Ok(img) => top_corners_near_white(&img),
            Err(e) => {
                debug!("Studio check could not decode {}: {}", url, e);
                true
            }
        }
    }
}

/// Both top corners near-white means studio.
///
/// Images too small to sample are treated as studio.
pub fn top_corners_near_white(img: &DynamicImage) -> bool {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width <= SAMPLE_OFFSET * 2 || height <= SAMPLE_OFFSET {
        return true;
    }

    let left = rgb.get_pixel(SAMPLE_OFFSET, SAMPLE_OFFSET);
    let right = rgb.get_pixel(width - SAMPLE_OFFSET, SAMPLE_OFFSET);

    is_near_white(left.0) && is_near_white(right.0)
}

fn is_near_white([r, g, b]: [u8; 3]) -> bool {
    r > NEAR_WHITE_THRESHOLD && g > NEAR_WHITE_THRESHOLD && b > NEAR_WHITE_THRESHOLD
}

/// Classifier that never flags anything, for sources without pixel inspection
pub struct NoStudioCheck;

#[async_trait]
impl StudioClassifier for NoStudioCheck {
    async fn is_studio(&self, _url: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::scraper::{FetchedAsset, Headers};
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn image_with_corners(left: [u8; 3], right: [u8; 3]) -> DynamicImage {
        let mut img = RgbImage::from_pixel(100, 60, Rgb([30, 30, 30]));
        img.put_pixel(10, 10, Rgb(left));
        img.put_pixel(90, 10, Rgb(right));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_both_corners_white_is_studio() {
        let img = image_with_corners([250, 250, 250], [255, 255, 255]);
        assert!(top_corners_near_white(&img));
    }

    #[test]
    fn test_one_dark_corner_is_action() {
        let img = image_with_corners([250, 250, 250], [120, 140, 90]);
        assert!(!top_corners_near_white(&img));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let img = image_with_corners([245, 250, 250], [250, 250, 250]);
        assert!(!top_corners_near_white(&img));
    }

    #[test]
    fn test_tiny_image_is_studio() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
        assert!(top_corners_near_white(&img));
    }

    struct OneAsset(Option<Vec<u8>>);

    #[async_trait]
    impl PageFetcher for OneAsset {
        async fn fetch_text(&self, url: &str, _headers: &Headers) -> Result<String, FetchError> {
            Err(FetchError::new(url, 1, "not used"))
        }

        async fn fetch_bytes(&self, url: &str, _headers: &Headers) -> Result<FetchedAsset, FetchError> {
            match &self.0 {
                Some(bytes) => Ok(FetchedAsset {
                    bytes: bytes.clone(),
                    content_type: Some("image/png".to_string()),
                }),
                None => Err(FetchError::new(url, 3, "HTTP 404")),
            }
        }
    }

    fn encoded(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_inspector_classifies_downloaded_image() {
        let action = image_with_corners([40, 90, 160], [40, 90, 160]);
        let fetcher = OneAsset(Some(encoded(&action)));
        let inspector = PixelInspector::new(&fetcher, Vec::new());
        assert!(!inspector.is_studio("https://kymco.it/wp-content/uploads/x.jpg").await);
    }

    #[tokio::test]
    async fn test_inspector_read_failures_count_as_studio() {
        let missing = OneAsset(None);
        assert!(PixelInspector::new(&missing, Vec::new()).is_studio("https://a/b.jpg").await);

        let garbage = OneAsset(Some(b"not an image".to_vec()));
        assert!(PixelInspector::new(&garbage, Vec::new()).is_studio("https://a/b.jpg").await);
    }
}
