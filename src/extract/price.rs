use regex::Regex;
use std::sync::LazyLock;

/// Inclusive range outside which a parsed price is treated as noise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBounds {
    pub min: f64,
    pub max: f64,
}

impl PriceBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    pub fn check(&self, value: Option<f64>) -> Option<f64> {
        value.filter(|v| self.contains(*v))
    }
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self::new(500.0, 50_000.0)
    }
}

static PRICE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:EUR|€)\s*([\d.,]+)",
        r"([\d.,]+)\s*(?:EUR|€)",
        r#"price["']?\s*:\s*["']?([\d.,]+)"#,
        r#"content=["']([\d.,]+)["']\s*itemprop=["']price["']"#,
        r#"itemprop=["']price["']\s*content=["']([\d.,]+)["']"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Parse an Italian-formatted number such as `14.220`, `4.299,00` or `€ 5.690`.
///
/// A comma is the decimal separator and dots group thousands. A lone dot is
/// read as a thousands separator only when every group after it has three digits.
pub fn parse_locale_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ',');
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        let mut parts = cleaned.rsplitn(2, ',');
        let decimals = parts.next().unwrap_or_default();
        let integer = parts.next().unwrap_or_default().replace(['.', ','], "");
        format!("{}.{}", integer, decimals)
    } else if cleaned.contains('.') {
        let mut groups = cleaned.split('.');
        let head = groups.next().unwrap_or_default();
        let tail: Vec<&str> = groups.collect();
        if tail.iter().all(|g| g.len() == 3) {
            format!("{}{}", head, tail.concat())
        } else {
            cleaned.to_string()
        }
    } else {
        cleaned.to_string()
    };

    normalized.parse::<f64>().ok()
}

/// Scan raw markup for currency patterns, returning the first in-bounds value
pub fn price_from_markup(raw: &str, bounds: PriceBounds) -> Option<f64> {
    PRICE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures_iter(raw)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| parse_locale_number(m.as_str()))
            .find(|value| bounds.contains(*value))
    })
}
