use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use super::price::parse_locale_number;

/// Years accepted as-is; anything else falls back to the current year
pub const YEAR_RANGE: RangeInclusive<i32> = 1900..=2100;

/// Displacements outside this range are parse noise
pub const DISPLACEMENT_RANGE: RangeInclusive<u32> = 50..=2000;

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year pattern"));

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d[\d.,]*").expect("number pattern"));

static DISPLACEMENT_IN_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{2,4}(?:[.,]\d+)?)\s*(?:cm³|cm3|cc)").expect("displacement pattern")
});

/// First plausible four-digit year in a string
pub fn parse_year(text: &str) -> Option<i32> {
    YEAR.find(text).and_then(|m| m.as_str().parse().ok())
}

/// Resolve a parsed year, defaulting to `current_year` when missing or implausible
pub fn resolve_year(year: Option<i32>, current_year: i32) -> i32 {
    year.filter(|y| YEAR_RANGE.contains(y)).unwrap_or(current_year)
}

/// First number in a string, read with Italian separators (`1.301 cc`, `8.500 km`)
pub fn parse_integer(text: &str) -> Option<u32> {
    let token = NUMBER.find(text)?;
    let value = parse_locale_number(token.as_str())?;
    if value < 0.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value.trunc() as u32)
}

/// Displacement from a table cell or label, discarding implausible values
pub fn parse_displacement(text: &str) -> Option<u32> {
    parse_integer(text).filter(|cc| DISPLACEMENT_RANGE.contains(cc))
}

/// Scan raw markup for a `NNN cm³` style displacement
pub fn displacement_from_markup(raw: &str) -> Option<u32> {
    DISPLACEMENT_IN_MARKUP
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| parse_locale_number(m.as_str()))
        .map(|v| v.trunc() as u32)
        .find(|cc| DISPLACEMENT_RANGE.contains(cc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("2026 KTM 450 SX-F"), Some(2026));
        assert_eq!(parse_year("Honda CB 500 (2019)"), Some(2019));
        assert_eq!(parse_year("MT-125"), None);
    }

    #[test]
    fn test_resolve_year() {
        assert_eq!(resolve_year(Some(2024), 2026), 2024);
        assert_eq!(resolve_year(Some(1850), 2026), 2026);
        assert_eq!(resolve_year(None, 2026), 2026);
    }

    #[test]
    fn test_parse_displacement() {
        assert_eq!(parse_displacement("1.301 cc"), Some(1301));
        assert_eq!(parse_displacement("471,4 cm³"), Some(471));
        assert_eq!(parse_displacement("889"), Some(889));
        assert_eq!(parse_displacement("5 kW"), None);
        assert_eq!(parse_displacement("n.d."), None);
    }

    #[test]
    fn test_parse_integer_kilometers() {
        assert_eq!(parse_integer("8.723 km"), Some(8723));
        assert_eq!(parse_integer("0"), Some(0));
    }

    #[test]
    fn test_displacement_from_markup() {
        let raw = "<li>Motore monocilindrico</li><li>Cilindrata 449,9 cm³</li>";
        assert_eq!(displacement_from_markup(raw), Some(449));
        assert_eq!(displacement_from_markup("<p>Serbatoio 12 l</p>"), None);
        assert_eq!(displacement_from_markup("<p>15 cc di olio, 690 cc</p>"), Some(690));
    }
}
