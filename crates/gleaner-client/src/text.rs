//! Text helpers shared by the HTML parsers.

use scraper::{ElementRef, Html};

/// Concatenated text of the whole document, without separators.
pub fn page_text(document: &Html) -> String {
    document.root_element().text().collect()
}

/// Element text joined with single spaces, whitespace collapsed.
pub fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The first `n` characters of `text`.
pub fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Up to `n` characters following the first occurrence of `label`.
pub fn after_label<'a>(text: &'a str, label: &str, n: usize) -> Option<&'a str> {
    let start = text.find(label)? + label.len();
    Some(take_chars(&text[start..], n))
}

/// Cuts `text` at the earliest occurrence of any marker.
pub fn cut_at_earliest<'a>(text: &'a str, markers: &[&str]) -> &'a str {
    let end = markers
        .iter()
        .filter_map(|m| text.find(m))
        .min()
        .unwrap_or(text.len());
    &text[..end]
}
