use std::collections::HashSet;

use crate::catalog::MAX_IMAGES;

/// Final image gate: dedupe, drop studio-marked URLs, cap at [`MAX_IMAGES`].
///
/// Order is preserved, so adapters put the hero shot first.
pub fn gate_images<I>(urls: I, studio_markers: &[&str]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();

    urls.into_iter()
        .filter(|url| !url.is_empty())
        .filter(|url| !is_studio_marked(url, studio_markers))
        .filter(|url| seen.insert(url.clone()))
        .take(MAX_IMAGES)
        .collect()
}

/// Whether a URL carries one of the known studio markers (case-insensitive)
pub fn is_studio_marked(url: &str, studio_markers: &[&str]) -> bool {
    let lower = url.to_lowercase();
    studio_markers
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
}
