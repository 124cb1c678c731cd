//! Style catalog specification sheets, addressed by style number.
//!
//! The sheet is a set of label/value tables; each column is found by its
//! label cell and read from the cell that follows.

use gleaner_core::config::HttpConfig;
use gleaner_core::error::{AppError, FetchError, FetchErrorKind};
use gleaner_core::models::{Parsed, RawPayload, Record, WorkKey};
use gleaner_core::traits::{Fetcher, Parser};
use scraper::{Html, Selector};
use url::Url;

use crate::http::HttpClient;
use crate::text::{after_label, element_text, page_text};

pub const DEFAULT_URL: &str = "https://bushing.hitachienergy.com/Scripts/BushingLookupBU.asp";
pub const REFERER: &str = "https://bushing.hitachienergy.com/";
pub const SNAPSHOT_PREFIX: &str = "Hitachi_website_bushing";
pub const NOT_FOUND_MARKER: &str = "No bushing found by that style number";

pub const COL_STYLE_NUMBER: &str = "Style Number";
const COL_FLANGE_COMMENTS: &str = "Flange Mounting Comments";
const COL_SPECIAL_FEATURES: &str = "Special Features";

pub const COLUMNS: &[&str] = &[
    "Style Number",
    "Alternate Style Number (usually other color)",
    "Catalog Number",
    "Delivery Ex-Works",
    "Delivery Last Update",
    "List Price US$",
    "Insulator Type",
    "Color",
    "Outline Drawing",
    "Download Drawing",
    "Apparatus",
    "Standard",
    "Bushing Type",
    "Oil Indication",
    "Application",
    "Mounting Position",
    "Connection Type",
    "Current Version",
    "Voltage Class",
    "kV BIL",
    "Max kV L-G",
    "Cantilever Design Test Rating Upper Value",
    "Cantilever Design Test Rating Lower Value",
    "Approximate Capacitance C1",
    "Approximate Capacitance C2",
    "Current Rating Draw Lead",
    "Bottom Connected",
    "Oil Circuit Breaker",
    "Lower End Length (L)",
    "C.T. Pocket Transformer",
    "C.T. Pocket Oil Circuit Breaker",
    "Exposable Length Transformer (EL)",
    "Exposable Length Oil Circuit Breaker (EL)",
    "Max. Dia. From 1\" below Flange to Lower End of Bushing (D)",
    "Upper End Length (B)",
    "Minimum Creep",
    "Arcing Distance",
    "Lowest High Voltage (LHV)",
    "Cable Height/Pin Height for AB Bushings (CH)",
    "Maximum Altitude",
    "Approximate Weight",
    "Top End Terminal - Thread Dia and Class or number of Pads and Holes Per Pad",
    "Top End Terminal - Length and Type or Dia, and Type of Holes",
    "Top End Terminal - Thread Plating",
    "Top End Terminal - Top Terminal Comments",
    "Bottom End Terminal - Terminal Type",
    "Bottom End Terminal - Min Outside Diameter",
    "Bottom End Terminal - Bottom Terminal Comments",
    "Max Inside Diameter (P)",
    "Min Outside Diameter (Q)",
    "Number of Holes",
    "Hole/Slot Size",
    "Bolt Circle Diameter",
    "Epoxy Coated Shield and Terminal Kit",
    "Flange Mounting Comments",
    "Special Features",
];

/// Table labels per column, tried in order. Columns not listed here use
/// their own name as the label.
const LABELS: &[(&str, &[&str])] = &[
    ("Alternate Style Number (usually other color)", &["Alternate Style Number"]),
    ("Catalog Number", &["Catalog Number:"]),
    ("Delivery Ex-Works", &["Delivery Ex-Works:"]),
    ("Delivery Last Update", &["Delivery Last Update:"]),
    ("List Price US$", &["List Price US$:"]),
    ("Insulator Type", &["Insulator Type:"]),
    ("Color", &["Color:"]),
    ("Outline Drawing", &["Outline Drawing:"]),
    ("Download Drawing", &["Download Drawing:"]),
    ("Apparatus", &["Apparatus:"]),
    ("Standard", &["Standard:"]),
    ("Bushing Type", &["Bushing Type:"]),
    ("Oil Indication", &["Oil Indication:"]),
    ("Application", &["Application:"]),
    ("Mounting Position", &["Mounting Position:"]),
    ("Connection Type", &["Connection Type:"]),
    ("Current Version", &["Current Version:"]),
    (
        "Cantilever Design Test Rating Lower Value",
        &["Lower Value", "Cantilever Design Test Rating Lower Value"],
    ),
    ("Approximate Capacitance C1", &["Approximate Capacitance C1", "C1"]),
    ("Approximate Capacitance C2", &["C2", "Approximate Capacitance C2"]),
    (
        "Top End Terminal - Thread Dia and Class or number of Pads and Holes Per Pad",
        &["Thread Dia and Class or number of Pads and Holes Per Pad"],
    ),
    (
        "Top End Terminal - Length and Type or Dia, and Type of Holes",
        &["Length and Type or Dia, and Type of Holes"],
    ),
    ("Top End Terminal - Thread Plating", &["Thread Plating"]),
    ("Top End Terminal - Top Terminal Comments", &["Top Terminal Comments"]),
    ("Bottom End Terminal - Terminal Type", &["Terminal Type"]),
    ("Bottom End Terminal - Min Outside Diameter", &["Min Outside Diameter"]),
    ("Bottom End Terminal - Bottom Terminal Comments", &["Bottom Terminal Comments"]),
];

const TEXT_WINDOW: usize = 200;

/// Fetches specification sheets by style number.
pub struct StyleCatalogClient {
    http: HttpClient,
    base_url: Url,
}

impl StyleCatalogClient {
    pub fn new(base_url: &str, config: HttpConfig) -> Result<Self, AppError> {
        let base_url =
            Url::parse(base_url).map_err(|_| AppError::InvalidUrl(base_url.to_string()))?;
        let http = HttpClient::new(config, Some(REFERER))?;
        Ok(Self { http, base_url })
    }

    pub fn sheet_url(&self, style: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("StyleNumber", style)
            .append_pair("Language", "English")
            .append_pair("Units", "English");
        url
    }
}

impl Fetcher for StyleCatalogClient {
    async fn fetch(&self, key: &WorkKey) -> Result<RawPayload, FetchError> {
        let WorkKey::Code(style) = key else {
            return Err(FetchError::new(
                FetchErrorKind::Malformed,
                format!("Catalog sheets are addressed by style number, got '{}'", key),
            ));
        };
        let url = self.sheet_url(style);
        tracing::debug!(url = %url, "Fetching catalog sheet");
        self.http.get_text(&url).await.map(RawPayload)
    }
}

/// Extracts the full catalog column set from a specification sheet.
#[derive(Default)]
pub struct CatalogParser;

impl Parser for CatalogParser {
    fn parse(&self, key: &WorkKey, raw: &RawPayload) -> Result<Parsed, AppError> {
        if raw.as_str().contains(NOT_FOUND_MARKER) {
            return Ok(Parsed::NoData(NOT_FOUND_MARKER.to_string()));
        }

        let document = Html::parse_document(raw.as_str());
        let table = LabelTable::from_document(&document)?;
        let text = page_text(&document);

        let mut record = Record::new();
        for column in COLUMNS {
            let value = match *column {
                COL_STYLE_NUMBER => key.to_string(),
                COL_FLANGE_COMMENTS => flange_comments(&text),
                COL_SPECIAL_FEATURES => special_features(&text),
                _ => labels_for(*column)
                    .iter()
                    .map(|label| table.value(label))
                    .find(|v| !v.is_empty())
                    .unwrap_or_default(),
            };
            record.set(*column, value);
        }
        Ok(Parsed::Record(record))
    }
}

fn labels_for(column: &'static str) -> Vec<&'static str> {
    LABELS
        .iter()
        .find(|(c, _)| *c == column)
        .map(|(_, labels)| labels.to_vec())
        .unwrap_or_else(|| vec![column])
}

/// Normalized text of every table row's cells.
struct LabelTable {
    rows: Vec<Vec<String>>,
}

impl LabelTable {
    fn from_document(document: &Html) -> Result<Self, AppError> {
        let row_sel = selector("tr")?;
        let cell_sel = selector("td, th")?;
        let rows = document
            .select(&row_sel)
            .map(|row| row.select(&cell_sel).map(|c| element_text(&c)).collect())
            .collect();
        Ok(Self { rows })
    }

    /// Value for `label`: the cell after a matching label cell, or the text
    /// after the colon of a `label: value` cell.
    fn value(&self, label: &str) -> String {
        let label_len = label.chars().count() as f64;
        for cells in &self.rows {
            for (i, cell) in cells.iter().enumerate() {
                let close_match =
                    cell.contains(label) && label_len > cell.chars().count() as f64 * 0.7;
                if cell == label || close_match {
                    if let Some(next) = cells.get(i + 1) {
                        return next.clone();
                    }
                }

                if cell.contains(label) {
                    if let Some((head, tail)) = cell.split_once(':') {
                        if head.contains(label) {
                            return tail.trim().to_string();
                        }
                    }
                }
            }
        }
        String::new()
    }
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::Generic(format!("Invalid selector '{}': {}", css, e)))
}

fn flange_comments(text: &str) -> String {
    let Some(window) = after_label(text, "Flange Mounting Comments:", TEXT_WINDOW) else {
        return String::new();
    };
    let comment = window.trim();
    for delimiter in ["Special Features:", "Top End Terminal", "\n\n"] {
        if let Some(pos) = comment.find(delimiter) {
            return comment[..pos].trim().to_string();
        }
    }
    comment.to_string()
}

fn special_features(text: &str) -> String {
    after_label(text, "Special Features:", TEXT_WINDOW)
        .and_then(|window| window.trim().lines().next())
        .map(|line| line.trim().to_string())
        .unwrap_or_default()
}
