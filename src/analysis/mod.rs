//! NLP enrichment passes over stored feed items.

pub mod sentiment;
pub mod topics;

use crate::storage::feed_items::StoredFeedItem;

/// Join an item's text fields in a fixed order, capped in characters.
pub(crate) fn prepare_text(item: &StoredFeedItem, max_chars: usize) -> String {
    let parts: Vec<&str> = [
        item.title.as_str(),
        item.description.as_str(),
        item.content.as_str(),
        item.summary.as_str(),
    ]
    .into_iter()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .collect();
    truncate_chars(&parts.join(". "), max_chars)
}

/// Cut a string to at most `max_chars` characters, never through a char.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
