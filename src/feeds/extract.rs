//! Plain-text and image extraction from feed entry HTML.

use scraper::{Html, Selector};

use super::fetch::RawEntry;

/// Strip markup from an HTML fragment and collapse whitespace.
///
/// Entities are decoded by the parser, so `&nbsp;` and friends come out as
/// the characters they name before the whitespace collapse runs.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    let joined: String = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pick an image URL for an entry.
///
/// Priority: explicit enclosures, then media attachments, then the first
/// `<img>` inside the first non-empty HTML field (content, summary,
/// description). An entry whose chosen HTML field has no image yields none,
/// the later fields are not consulted.
pub fn extract_image_url(entry: &RawEntry) -> Option<String> {
    if let Some(url) = entry.enclosures.iter().find(|u| !u.is_empty()) {
        return Some(url.clone());
    }
    if let Some(url) = entry.media.iter().find(|u| !u.is_empty()) {
        return Some(url.clone());
    }

    let html = entry
        .content
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| entry.summary.as_deref().filter(|s| !s.trim().is_empty()))
        .or_else(|| {
            entry
                .description
                .as_deref()
                .filter(|s| !s.trim().is_empty())
        })?;
    first_img_src(html)
}

fn first_img_src(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("img[src]").ok()?;
    fragment
        .select(&selector)
        .find_map(|el| el.value().attr("src").map(str::to_string))
        .filter(|src| !src.is_empty())
}
