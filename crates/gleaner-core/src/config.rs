//! Configuration types for Gleaner components.
//!
//! Runtime knobs (`HttpConfig`, `HarvestConfig`, `PlannerConfig`) carry
//! hardcoded defaults; the catalog list lives in `catalogs.toml`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Browser-like user agent; the catalog sites reject obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// HTTP client configuration for catalog requests.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Per-key harvest loop configuration.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Minimum pause between two consecutive fetches.
    pub delay: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }
}

impl HarvestConfig {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Facet planner configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub hits_per_page: usize,
    /// Pagination ceiling imposed by the search index.
    pub max_pages: usize,
    /// Hits sampled per oversized partition to discover facet values.
    /// Whole pages are fetched; hits past the budget are dropped.
    pub sample_budget: usize,
    pub page_delay: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            hits_per_page: 100,
            max_pages: 10,
            sample_budget: 500,
            page_delay: Duration::from_millis(300),
        }
    }
}

impl PlannerConfig {
    /// Maximum number of hits a single query can return.
    pub fn cap(&self) -> usize {
        self.hits_per_page * self.max_pages
    }

    /// Number of whole pages the sample budget allows, bounded by `max_pages`.
    pub fn sample_pages(&self) -> usize {
        if self.hits_per_page == 0 {
            return 0;
        }
        (self.sample_budget / self.hits_per_page).clamp(1, self.max_pages.max(1))
    }
}

// =============================================================================
// Catalog Configuration (catalogs.toml)
// =============================================================================

/// Which fetch/parse path a catalog uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    /// Indexed cross-reference pages, keyed by integer.
    CrossReference,
    /// Style-number lookups, keyed by code.
    StyleCatalog,
    /// Paginated search index with a result cap.
    Search,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrossReference => write!(f, "cross_reference"),
            Self::StyleCatalog => write!(f, "style_catalog"),
            Self::Search => write!(f, "search"),
        }
    }
}

impl FromStr for CatalogKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "cross_reference" => Ok(Self::CrossReference),
            "style_catalog" => Ok(Self::StyleCatalog),
            "search" => Ok(Self::Search),
            _ => Err(AppError::ConfigError(format!(
                "Unknown catalog kind: '{}'. Valid options: cross_reference, style_catalog, search",
                s
            ))),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_vendor() -> String {
    "ABB".to_string()
}

/// Root configuration structure for catalogs.toml.
///
/// # Example
///
/// ```toml
/// [[catalogs]]
/// name = "hitachi-cross-reference"
/// kind = "cross_reference"
/// url = "https://bushing.hitachienergy.com/Scripts/BushingCrossReferenceBU.asp"
/// data_dir = "data/hitachi/cross_reference"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogsConfig {
    pub catalogs: Vec<CatalogEntry>,
}

impl CatalogsConfig {
    pub fn enabled_catalogs(&self) -> Vec<&CatalogEntry> {
        self.catalogs.iter().filter(|c| c.enabled).collect()
    }

    /// Find a catalog by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<&CatalogEntry> {
        self.catalogs
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// A single catalog entry in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Used for `gleaner harvest <name>` lookup and logging.
    pub name: String,

    pub kind: CatalogKind,

    /// Page URL (HTML catalogs) or informational URL (search catalogs).
    pub url: String,

    /// Directory holding the result table, ledger and `raw/` snapshots.
    pub data_dir: PathBuf,

    /// Overrides the default politeness delay between fetches.
    pub delay_secs: Option<f64>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub description: Option<String>,

    /// Line-delimited key file consumed by `harvest --all`.
    ///
    /// Defaults to `<data_dir>/keys.txt`.
    pub key_file: Option<PathBuf>,

    /// Catalog whose results seed this catalog's key file (`init-keys`).
    pub source: Option<String>,

    /// Replacement vendor whose style numbers are harvested.
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Search-index settings, required when `kind = "search"`.
    pub search: Option<SearchCatalogConfig>,
}

impl CatalogEntry {
    pub fn key_file(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("keys.txt"))
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay_secs
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Returns the search table or a configuration error naming the catalog.
    pub fn search_config(&self) -> Result<&SearchCatalogConfig, AppError> {
        self.search.as_ref().ok_or_else(|| {
            AppError::ConfigError(format!(
                "Catalog '{}' has kind '{}' but no [catalogs.search] table",
                self.name, self.kind
            ))
        })
    }
}

/// Search-index settings of a `search` catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCatalogConfig {
    pub application_id: String,
    /// Falls back to `GLEANER_SEARCH_API_KEY` when absent.
    pub api_key: Option<String>,
    pub index: String,
    pub category_filter: String,
    /// Filter attribute used to partition the catalog (e.g. `Brands`).
    pub partition_attribute: String,
    /// Hit field carrying the partition value (e.g. `Brand`).
    pub partition_field: String,
    pub partition_values: Vec<String>,
    #[serde(default)]
    pub facets: Vec<SecondaryFacet>,
    /// Hit field used for dedup and as the work key.
    pub natural_key: String,
    pub expected_total: Option<usize>,
    #[serde(default)]
    pub sweep: bool,
    pub sample_budget: Option<usize>,
}

/// A secondary facet used to narrow oversized partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryFacet {
    pub attribute: String,
    /// Known rare values the sample may miss.
    #[serde(default)]
    pub gap_fill: Vec<String>,
}

pub const CONFIG_FILE_NAME: &str = "catalogs.toml";

/// Returns `~/.config/gleaner/` (XDG).
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gleaner"))
}

pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Gleaner Catalog Configuration
#
# Usage:
#   gleaner harvest hitachi-cross-reference --start 1 --end 500
#   gleaner init-keys hitachi-catalog
#   gleaner harvest hitachi-catalog --all
#   gleaner facets hubbell-bushings
#   gleaner status hitachi-catalog
#
# Set GLEANER_SEARCH_API_KEY (or api_key below) for search catalogs.

# Bushing cross-reference pages, one per index
[[catalogs]]
name = "hitachi-cross-reference"
kind = "cross_reference"
url = "https://bushing.hitachienergy.com/Scripts/BushingCrossReferenceBU.asp"
data_dir = "data/hitachi/cross_reference"
description = "Hitachi Energy bushing cross-reference"

# Full specification sheets, one per style number
[[catalogs]]
name = "hitachi-catalog"
kind = "style_catalog"
url = "https://bushing.hitachienergy.com/Scripts/BushingLookupBU.asp"
data_dir = "data/hitachi/catalog"
source = "hitachi-cross-reference"
vendor = "ABB"
description = "Hitachi Energy bushing catalog"

# Condenser bushings listed in the Hubbell search index
[[catalogs]]
name = "hubbell-bushings"
kind = "search"
url = "https://www.hubbell.com"
data_dir = "data/hubbell"
description = "Hubbell condenser bushings"

[catalogs.search]
application_id = "5JH7C4O2N4"
index = "Products_featured"
category_filter = "Categories.lvl3:'Power & Utilities > Bushings > Power Apparatus Bushings > Condenser Bushings'"
partition_attribute = "Brands"
partition_field = "Brand"
partition_values = ["PCORE Electric", "Electro Composites"]
natural_key = "Catalog Number"
expected_total = 2680
sweep = true

[[catalogs.search.facets]]
attribute = "kV Class"
gap_fill = ["0.693 kV", "13.8 kV", "14.4 kV", "22 kV", "23 kV", "24.5 kV", "245 kV", "30 kV", "300 kV", "4 kV", "44 kV", "92 kV"]

[[catalogs.search.facets]]
attribute = "BIL"

[[catalogs.search.facets]]
attribute = "Current Rating"
"#;

/// Load catalog configuration from a TOML file.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No configuration directory available on this platform
/// * `Err(e)` - Configuration file missing at a custom path, or invalid
///
/// If no file exists at the default path, the template is written there
/// first and then loaded.
pub fn load_catalogs_config(path: Option<PathBuf>) -> Result<Option<CatalogsConfig>, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            if let Err(e) = create_default_config(&config_path) {
                tracing::warn!("Could not create default config template: {}", e);
                return Ok(None);
            }
        } else {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let config: CatalogsConfig = toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    Ok(Some(config))
}

fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default config template at: {}", path.display());

    Ok(())
}
