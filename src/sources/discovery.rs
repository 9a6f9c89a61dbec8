use std::collections::HashSet;
use url::Url;

use crate::catalog::Candidate;

/// Canonical form used for deduplication: no fragment, no trailing slash
pub fn canonical_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_fragment(None);
            let mut s = url.to_string();
            while s.ends_with('/') && url.path() != "/" {
                s.pop();
            }
            s
        }
        Err(_) => raw.trim().trim_end_matches('/').to_string(),
    }
}

/// Last non-empty path segment, lower-cased
pub fn url_slug(raw: &str) -> String {
    let path = Url::parse(raw)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| raw.to_string());

    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_end_matches(".html")
        .to_lowercase()
}

/// Whether a URL's slug contains any blacklisted substring
pub fn is_blacklisted<S: AsRef<str>>(url: &str, blacklist: &[S]) -> bool {
    let slug = url_slug(url);
    blacklist
        .iter()
        .any(|entry| slug.contains(&entry.as_ref().to_lowercase()))
}

/// Ordered, deduplicated candidate collection with blacklist filtering
#[derive(Debug, Default)]
pub struct CandidateSet {
    seen: HashSet<String>,
    candidates: Vec<Candidate>,
    blacklist: Vec<String>,
}

impl CandidateSet {
    pub fn new(blacklist: &[&str]) -> Self {
        Self {
            seen: HashSet::new(),
            candidates: Vec::new(),
            blacklist: blacklist.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Add a candidate, returning false when it was a duplicate or blacklisted
    pub fn push(&mut self, mut candidate: Candidate) -> bool {
        candidate.url = canonical_url(&candidate.url);

        if is_blacklisted(&candidate.url, &self.blacklist) {
            return false;
        }

        let key = candidate
            .listing_id
            .clone()
            .unwrap_or_else(|| candidate.url.clone());
        if !self.seen.insert(key) {
            return false;
        }

        self.candidates.push(candidate);
        true
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.candidates
    }
}
