//! Algolia multi-query search client and listing record conversion.
//!
//! Algolia API reference: <https://www.algolia.com/doc/rest-api/search/#search-multiple-indices>
//!
//! The endpoint answers with:
//! ```json
//! {"results": [{"hits": [...], "nbHits": 2680, "nbPages": 27, "page": 0}]}
//! ```

use gleaner_core::config::HttpConfig;
use gleaner_core::error::{AppError, FetchError, FetchErrorKind};
use gleaner_core::facet::{SearchHit, SearchPage, SearchQuery};
use gleaner_core::models::Record;
use gleaner_core::traits::SearchIndex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use crate::http::HttpClient;

pub const DEFAULT_APPLICATION_ID: &str = "5JH7C4O2N4";
pub const DEFAULT_INDEX: &str = "Products_featured";
pub const SNAPSHOT_PREFIX: &str = "Hubbell_website_product";

pub const COL_LINK: &str = "Website Link";
pub const COL_MANUFACTURER: &str = "Original Bushing Information - Original Bushing Manufacturer";
pub const COL_CATALOG: &str = "Original Bushing Information - Catalog Number";

pub const LISTING_COLUMNS: &[&str] = &[COL_LINK, COL_MANUFACTURER, COL_CATALOG];

const PRODUCT_BASE: &str = "https://www.hubbell.com/hubbell/en";

#[derive(Deserialize, Debug)]
struct MultiQueryResponse {
    results: Vec<QueryResult>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    #[serde(default)]
    hits: Vec<Map<String, Value>>,
    #[serde(default)]
    nb_hits: usize,
    #[serde(default)]
    nb_pages: usize,
}

/// Search client for one Algolia index.
///
/// # Examples
///
/// ```no_run
/// use gleaner_client::AlgoliaClient;
/// use gleaner_core::config::HttpConfig;
/// use gleaner_core::facet::{FilterExpression, SearchQuery};
/// use gleaner_core::traits::SearchIndex;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = AlgoliaClient::new("5JH7C4O2N4", "search-key", "Products_featured", HttpConfig::default())?;
/// let query = SearchQuery {
///     filter: FilterExpression::raw("Categories.lvl3:'Bushings'"),
///     page: 0,
///     hits_per_page: 100,
/// };
/// let page = client.search(&query).await?;
/// println!("{} products", page.nb_hits);
/// # Ok(())
/// # }
/// ```
pub struct AlgoliaClient {
    http: HttpClient,
    url: Url,
    headers: HeaderMap,
    index: String,
}

impl AlgoliaClient {
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` when the credentials cannot be sent as
    /// headers, and `AppError::InvalidUrl` for an unusable application id.
    pub fn new(
        application_id: &str,
        api_key: &str,
        index: &str,
        config: HttpConfig,
    ) -> Result<Self, AppError> {
        let url = Self::endpoint(application_id)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| AppError::ConfigError("Search API key is not a valid header".into()))?;
        let app = HeaderValue::from_str(application_id)
            .map_err(|_| AppError::ConfigError("Application id is not a valid header".into()))?;
        headers.insert("x-algolia-api-key", key);
        headers.insert("x-algolia-application-id", app);

        Ok(Self {
            http: HttpClient::new(config, None)?,
            url,
            headers,
            index: index.to_string(),
        })
    }

    fn endpoint(application_id: &str) -> Result<Url, AppError> {
        let raw = format!(
            "https://{}-dsn.algolia.net/1/indexes/*/queries",
            application_id.to_lowercase()
        );
        Url::parse(&raw).map_err(|_| AppError::InvalidUrl(raw))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn request_body(&self, query: &SearchQuery) -> Value {
        json!({
            "requests": [{
                "indexName": self.index,
                "hitsPerPage": query.hits_per_page,
                "facets": ["*"],
                "sortFacetValuesBy": "alpha",
                "filters": format!("({})", query.filter),
                "clickAnalytics": true,
                "page": query.page,
                "params": ""
            }]
        })
    }
}

impl SearchIndex for AlgoliaClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, FetchError> {
        let body = self.request_body(query);
        let value = self.http.post_json(&self.url, &self.headers, &body).await?;
        parse_response(value)
    }
}

fn parse_response(value: Value) -> Result<SearchPage, FetchError> {
    let response: MultiQueryResponse = serde_json::from_value(value).map_err(|e| {
        FetchError::new(FetchErrorKind::Malformed, format!("Unexpected search response: {}", e))
    })?;
    let result = response.results.into_iter().next().ok_or_else(|| {
        FetchError::new(FetchErrorKind::Malformed, "Search response has no results")
    })?;

    Ok(SearchPage {
        hits: result.hits.into_iter().map(SearchHit).collect(),
        nb_hits: result.nb_hits,
        nb_pages: result.nb_pages,
    })
}

/// Converts a product hit into a listing row.
///
/// # Examples
///
/// ```
/// use gleaner_client::algolia::{into_record, COL_LINK};
/// use gleaner_core::facet::SearchHit;
///
/// let hit: SearchHit = serde_json::from_str::<serde_json::Map<_, _>>(
///     r#"{"objectID": "PCORE123", "title": "POC® Bushing 69 kV", "Brand": "PCORE Electric"}"#,
/// ).unwrap().into();
///
/// let record = into_record(&hit);
/// assert_eq!(
///     record.get(COL_LINK),
///     Some("https://www.hubbell.com/hubbell/en/products/poc-bushing-69-kv/p/PCORE123")
/// );
/// ```
pub fn into_record(hit: &SearchHit) -> Record {
    let object_id = hit.attribute("objectID").unwrap_or_default();
    let link = match hit.attribute("title") {
        Some(title) if !object_id.is_empty() => {
            format!("{}/products/{}/p/{}", PRODUCT_BASE, title_slug(&title), object_id)
        }
        _ => format!("{}/p/{}", PRODUCT_BASE, object_id),
    };

    Record::new()
        .with(COL_LINK, link)
        .with(COL_MANUFACTURER, hit.attribute("Brand").unwrap_or_default())
        .with(COL_CATALOG, hit.attribute("Catalog Number").unwrap_or_default())
}

fn title_slug(title: &str) -> String {
    let lowered = title.to_lowercase().replace(' ', "-").replace(['®', '™'], "");
    let mut slug = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.trim_matches('-').to_string()
}
