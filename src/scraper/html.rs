//! Small markup helpers shared by the source adapters.

use scraper::{ElementRef, Html, Selector};

use crate::utils::normalize_whitespace;

/// Parse a compile-time selector literal.
///
/// Only used for static selectors, so a parse failure is a programming error.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {:?}: {:?}", css, e))
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(element: &ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Text of the first matching element that has any.
pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|el| element_text(&el))
        .find(|text| !text.is_empty())
}

/// Whole-document text, used by regex fallbacks.
pub fn body_text(document: &Html) -> String {
    normalize_whitespace(&document.root_element().text().collect::<Vec<_>>().join(" "))
}

/// Content of the `<title>` element.
pub fn title_text(document: &Html) -> Option<String> {
    static TITLE: std::sync::LazyLock<Selector> = std::sync::LazyLock::new(|| selector("title"));
    first_text(document, &TITLE)
}

/// Nearest ancestor with the given tag name.
pub fn closest<'a>(element: &ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name().eq_ignore_ascii_case(tag))
}

/// Whether any ancestor carries one of the given classes.
pub fn has_ancestor_with_class(element: &ElementRef<'_>, classes: &[&str]) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().classes().any(|c| classes.contains(&c)))
}

/// Next sibling that is an element.
pub fn next_element_sibling<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

/// Parent element.
pub fn parent_element<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.parent().and_then(ElementRef::wrap)
}

/// First URL of a `srcset` attribute.
pub fn srcset_first(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .next()
        .and_then(|entry| entry.split_whitespace().next())
        .filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_and_ancestor_classes() {
        let doc = Html::parse_document(
            r#"<div class="glide__slide"><a href="/big.jpg"><img id="x" src="/small.jpg"></a></div>"#,
        );
        let img = doc.select(&selector("img#x")).next().unwrap();

        let link = closest(&img, "a").unwrap();
        assert_eq!(link.value().attr("href"), Some("/big.jpg"));
        assert!(has_ancestor_with_class(&img, &["models__slide", "glide__slide"]));
        assert!(!has_ancestor_with_class(&img, &["js-model-slide"]));
    }

    #[test]
    fn test_next_element_sibling_skips_text() {
        let doc = Html::parse_document(
            "<table><tr><td class=\"l\">Cilindrata</td>\n <td>471 cc</td></tr></table>",
        );
        let label = doc.select(&selector("td.l")).next().unwrap();
        let value = next_element_sibling(&label).unwrap();
        assert_eq!(element_text(&value), "471 cc");
    }

    #[test]
    fn test_srcset_first() {
        assert_eq!(srcset_first("/a.jpg 1x, /b.jpg 2x"), Some("/a.jpg"));
        assert_eq!(srcset_first("  "), None);
    }

    #[test]
    fn test_first_text_skips_empty_matches() {
        let doc = Html::parse_document("<h1> </h1><h1>  890  Duke R </h1>");
        assert_eq!(first_text(&doc, &selector("h1")).as_deref(), Some("890 Duke R"));
    }
}
