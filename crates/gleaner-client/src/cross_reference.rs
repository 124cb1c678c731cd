//! Bushing cross-reference pages, addressed by `?INDEX=n`.
//!
//! Each page maps one original bushing (manufacturer, catalog number) to a
//! replacement style number. The page is free-form HTML, so fields are found
//! by label in the flattened page text.

use gleaner_core::config::HttpConfig;
use gleaner_core::error::{AppError, FetchError, FetchErrorKind};
use gleaner_core::models::{Parsed, RawPayload, Record, WorkKey};
use gleaner_core::traits::{Fetcher, Parser};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::http::HttpClient;
use crate::text::{after_label, collapse_whitespace, cut_at_earliest, page_text, take_chars};

pub const DEFAULT_URL: &str = "https://bushing.hitachienergy.com/Scripts/BushingCrossReferenceBU.asp";
pub const REFERER: &str = "https://bushing.hitachienergy.com/";
pub const SNAPSHOT_PREFIX: &str = "Hitachi_website_bushing";

pub const COL_INDEX: &str = "Website Index";
pub const COL_ORIGINAL_MANUFACTURER: &str = "Original Bushing Information - Original Bushing Manufacturer";
pub const COL_ORIGINAL_CATALOG: &str = "Original Bushing Information - Catalog Number";
pub const COL_REPLACEMENT_MANUFACTURER: &str = "Replacement Information - Replacement Bushing Manufacturer";
pub const COL_STYLE_NUMBER: &str = "Replacement Information - ABB Style Number";

pub const COLUMNS: &[&str] = &[
    COL_INDEX,
    COL_ORIGINAL_MANUFACTURER,
    COL_ORIGINAL_CATALOG,
    COL_REPLACEMENT_MANUFACTURER,
    COL_STYLE_NUMBER,
];

const FIELD_WINDOW: usize = 300;
const REPLACEMENT_WINDOW: usize = 500;

const NEXT_FIELD_MARKERS: &[&str] = &[
    "Mounting Position:",
    "Catalog Number:",
    "Voltage Class",
    "BIL (kV):",
    "Application",
    "Current Rating",
    "ABB Style Number:",
];

const ORIGINAL_SECTION: &str = "Original Bushing Information";
const REPLACEMENT_SECTION: &str = "Replacement Information";

/// Fetches cross-reference pages by index.
pub struct CrossReferenceClient {
    http: HttpClient,
    base_url: Url,
}

impl CrossReferenceClient {
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if `base_url` does not parse.
    pub fn new(base_url: &str, config: HttpConfig) -> Result<Self, AppError> {
        let base_url =
            Url::parse(base_url).map_err(|_| AppError::InvalidUrl(base_url.to_string()))?;
        let http = HttpClient::new(config, Some(REFERER))?;
        Ok(Self { http, base_url })
    }

    pub fn page_url(&self, index: u64) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("INDEX", &index.to_string());
        url
    }
}

impl Fetcher for CrossReferenceClient {
    async fn fetch(&self, key: &WorkKey) -> Result<RawPayload, FetchError> {
        let WorkKey::Index(index) = key else {
            return Err(FetchError::new(
                FetchErrorKind::Malformed,
                format!("Cross-reference pages are addressed by index, got '{}'", key),
            ));
        };
        let url = self.page_url(*index);
        tracing::debug!(url = %url, "Fetching cross-reference page");
        self.http.get_text(&url).await.map(RawPayload)
    }
}

/// Extracts the five cross-reference columns from a page.
pub struct CrossReferenceParser {
    vendor: String,
}

impl CrossReferenceParser {
    /// `vendor` fills the replacement manufacturer column.
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
        }
    }
}

impl Default for CrossReferenceParser {
    fn default() -> Self {
        Self::new("ABB")
    }
}

impl Parser for CrossReferenceParser {
    fn parse(&self, key: &WorkKey, raw: &RawPayload) -> Result<Parsed, AppError> {
        let document = Html::parse_document(raw.as_str());
        let text = page_text(&document);

        let manufacturer = extract_field_value(&text, "Original Bushing Manufacturer:");
        let catalog = extract_catalog_number(&text);
        let style = extract_style_number(&document, &text);

        if manufacturer.is_empty() && catalog.is_empty() && style.is_empty() {
            return Ok(Parsed::NoData("All fields empty after parsing".to_string()));
        }
        let fields = [
            ("manufacturer", &manufacturer),
            ("catalog number", &catalog),
            ("style number", &style),
        ];
        for (field, value) in fields {
            if value.is_empty() {
                tracing::warn!(key = %key, "Missing {}", field);
            }
        }

        Ok(Parsed::Record(
            Record::new()
                .with(COL_INDEX, key.to_string())
                .with(COL_ORIGINAL_MANUFACTURER, manufacturer)
                .with(COL_ORIGINAL_CATALOG, catalog)
                .with(COL_REPLACEMENT_MANUFACTURER, self.vendor.clone())
                .with(COL_STYLE_NUMBER, style),
        ))
    }
}

/// Value following `label`, up to the next known field label.
pub fn extract_field_value(text: &str, label: &str) -> String {
    match after_label(text, label, FIELD_WINDOW) {
        Some(window) => collapse_whitespace(cut_at_earliest(window, NEXT_FIELD_MARKERS)),
        None => String::new(),
    }
}

/// First meaningful line after `label` that contains none of `exclude`.
fn first_line_after(section: &str, label: &str, exclude: &[&str]) -> Option<String> {
    let start = section.find(label)? + label.len();
    section[start..]
        .trim()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !exclude.iter().any(|x| line.contains(x)))
        .map(str::to_string)
}

fn extract_catalog_number(text: &str) -> String {
    if let (Some(start), Some(end)) = (text.find(ORIGINAL_SECTION), text.find(REPLACEMENT_SECTION)) {
        if start < end {
            let section = &text[start..end];
            if let Some(line) = first_line_after(
                section,
                "Catalog Number:",
                &["Catalog Number", "Original", "Dimensional"],
            ) {
                return line;
            }
        }
    }
    extract_field_value(text, "Catalog Number:")
}

fn extract_style_number(document: &Html, text: &str) -> String {
    // Style numbers are usually links inside the replacement block.
    if let Ok(links) = Selector::parse("a") {
        for link in document.select(&links) {
            let link_text = link.text().collect::<String>();
            let link_text = link_text.trim();
            if link_text.chars().count() > 5
                && link_text.chars().any(|c| c.is_ascii_digit())
                && parent_mentions(&link, &["ABB Style", "Replacement"])
            {
                return link_text.to_string();
            }
        }
    }

    if let Some(start) = text.find(REPLACEMENT_SECTION) {
        let section = take_chars(&text[start..], REPLACEMENT_WINDOW);
        if let Some(line) = first_line_after(
            section,
            "ABB Style Number:",
            &["ABB Style", "Replacement", "Dimensional"],
        ) {
            return line;
        }
    }

    extract_field_value(text, "ABB Style Number:")
}

fn parent_mentions(element: &ElementRef<'_>, needles: &[&str]) -> bool {
    element
        .parent()
        .and_then(ElementRef::wrap)
        .map(|parent| {
            let html = parent.html();
            needles.iter().any(|n| html.contains(n))
        })
        .unwrap_or(false)
}

/// Unique values the style catalog should harvest, sorted.
///
/// Rows whose replacement manufacturer is `vendor` contribute their style
/// number; rows whose original manufacturer is `vendor` contribute their
/// original catalog number.
pub fn style_numbers(records: &[Record], vendor: &str) -> Vec<String> {
    let mut styles = std::collections::BTreeSet::new();
    for record in records {
        let pairs = [
            (COL_REPLACEMENT_MANUFACTURER, COL_STYLE_NUMBER),
            (COL_ORIGINAL_MANUFACTURER, COL_ORIGINAL_CATALOG),
        ];
        for (manufacturer_col, value_col) in pairs {
            if record.get(manufacturer_col) == Some(vendor) {
                if let Some(value) = record.get(value_col).map(str::trim) {
                    if !value.is_empty() {
                        styles.insert(value.to_string());
                    }
                }
            }
        }
    }
    styles.into_iter().collect()
}
