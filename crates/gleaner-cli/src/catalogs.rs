//! Wiring between `catalogs.toml` entries and the stores, key files and
//! planner settings of each catalog kind.

use std::path::Path;
use std::time::Duration;

use gleaner_client::{algolia, catalog, cross_reference};
use gleaner_core::{
    AppError, CatalogEntry, CatalogKind, CatalogsConfig, FacetSpec, HarvestConfig, KeyKind,
    PlannerConfig, SearchCatalogConfig,
};
use gleaner_store::{CatalogStores, StoreLayout};

/// Store columns, key column and snapshot naming of a catalog kind.
pub fn store_layout(kind: CatalogKind) -> StoreLayout {
    match kind {
        CatalogKind::CrossReference => StoreLayout {
            columns: cross_reference::COLUMNS,
            key_column: cross_reference::COL_INDEX,
            key_kind: KeyKind::Index,
            snapshot_prefix: cross_reference::SNAPSHOT_PREFIX,
            snapshot_extension: "html",
        },
        CatalogKind::StyleCatalog => StoreLayout {
            columns: catalog::COLUMNS,
            key_column: catalog::COL_STYLE_NUMBER,
            key_kind: KeyKind::Code,
            snapshot_prefix: catalog::SNAPSHOT_PREFIX,
            snapshot_extension: "html",
        },
        CatalogKind::Search => StoreLayout {
            columns: algolia::LISTING_COLUMNS,
            key_column: algolia::COL_CATALOG,
            key_kind: KeyKind::Code,
            snapshot_prefix: algolia::SNAPSHOT_PREFIX,
            snapshot_extension: "json",
        },
    }
}

pub fn open_stores(entry: &CatalogEntry) -> Result<CatalogStores, AppError> {
    CatalogStores::open(&entry.data_dir, &store_layout(entry.kind))
}

/// Looks up a catalog by name, listing the configured names on a miss.
pub fn find_catalog<'a>(
    config: &'a CatalogsConfig,
    name: &str,
) -> Result<&'a CatalogEntry, AppError> {
    config.find_by_name(name).ok_or_else(|| {
        let known: Vec<&str> = config.catalogs.iter().map(|c| c.name.as_str()).collect();
        AppError::ConfigError(format!(
            "Catalog '{}' not found in configuration (known: {})",
            name,
            known.join(", ")
        ))
    })
}

/// Error for a search catalog passed to `harvest`, pointing at `facets`.
pub fn search_catalog_error(entry: &CatalogEntry) -> AppError {
    AppError::ConfigError(format!(
        "Catalog '{}' is a search catalog. Use: gleaner facets {}",
        entry.name, entry.name
    ))
}

/// Harvest loop settings: `--delay` wins over the catalog's `delay_secs`.
pub fn harvest_config(entry: &CatalogEntry, delay: Option<f64>) -> Result<HarvestConfig, AppError> {
    let config = HarvestConfig::default();
    let delay = match delay {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|_| AppError::ConfigError(format!("Invalid delay: {} seconds", secs)))?,
        None => match entry.delay() {
            Some(delay) => delay,
            None => return Ok(config),
        },
    };
    Ok(config.with_delay(delay))
}

pub fn facet_spec(search: &SearchCatalogConfig) -> FacetSpec {
    FacetSpec {
        category: search.category_filter.clone(),
        partition_attribute: search.partition_attribute.clone(),
        partition_field: search.partition_field.clone(),
        partition_values: search.partition_values.clone(),
        facets: search.facets.clone(),
        sweep: search.sweep,
    }
}

/// Planner settings; a `--sample-budget` flag wins over the catalog value.
pub fn planner_config(search: &SearchCatalogConfig, sample_budget: Option<usize>) -> PlannerConfig {
    let mut config = PlannerConfig::default();
    if let Some(budget) = sample_budget.or(search.sample_budget) {
        config.sample_budget = budget;
    }
    config
}

/// The search API key: flag or `GLEANER_SEARCH_API_KEY` first, then the
/// catalog's `api_key`.
pub fn search_api_key(
    search: &SearchCatalogConfig,
    from_env: Option<&str>,
) -> Result<String, AppError> {
    from_env
        .or(search.api_key.as_deref())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::ConfigError(
                "No search API key: set GLEANER_SEARCH_API_KEY or api_key in [catalogs.search]"
                    .to_string(),
            )
        })
}

/// Writes one key per line, refusing to replace an existing file unless
/// `force` is set. Returns the number of keys written.
pub fn write_key_file(path: &Path, keys: &[String], force: bool) -> Result<usize, AppError> {
    if path.exists() && !force {
        return Err(AppError::Generic(format!(
            "Key file '{}' already exists; pass --force to rewrite it",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut content = keys.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), keys = keys.len(), "Wrote key file");
    Ok(keys.len())
}

/// Derives the style catalog's keys from its source cross-reference results.
pub fn derive_style_keys(
    config: &CatalogsConfig,
    entry: &CatalogEntry,
) -> Result<Vec<String>, AppError> {
    let source_name = entry.source.as_deref().ok_or_else(|| {
        AppError::ConfigError(format!("Catalog '{}' has no source catalog", entry.name))
    })?;
    let source = find_catalog(config, source_name)?;
    if source.kind != CatalogKind::CrossReference {
        return Err(AppError::ConfigError(format!(
            "Source catalog '{}' has kind '{}', expected 'cross_reference'",
            source.name, source.kind
        )));
    }

    let rows = open_stores(source)?.results.rows()?;
    let keys = cross_reference::style_numbers(&rows, &entry.vendor);
    tracing::info!(
        source = %source.name,
        rows = rows.len(),
        vendor = %entry.vendor,
        styles = keys.len(),
        "Derived style numbers"
    );
    Ok(keys)
}
