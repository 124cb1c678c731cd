use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use gleaner::catalogs::{
    derive_style_keys, facet_spec, find_catalog, harvest_config, open_stores, planner_config,
    search_api_key, search_catalog_error, store_layout, write_key_file,
};
use gleaner::{Command, Config, KeyArgs, RunArgs};
use gleaner_client::{
    algolia, AlgoliaClient, CatalogParser, CrossReferenceClient, CrossReferenceParser,
    StyleCatalogClient,
};
use gleaner_core::{
    load_catalogs_config, AppError, CatalogEntry, CatalogKind, CatalogsConfig, FacetPlan,
    FacetPlanner, FetchParsePipeline, HarvestConfig, HarvestOrchestrator, HarvestReport,
    HttpConfig, ListingPipeline, MergeReport, Mode, QueryGroup, ResultAggregator,
};
use gleaner_store::StoreAudit;

#[tokio::main]
async fn main() {
    if let Err(err) = try_main().await {
        match err.downcast_ref::<AppError>() {
            Some(app_err) => eprintln!("Error: {}", app_err.user_message()),
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}

async fn try_main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::parse();

    // Setup logging (stderr to keep stdout clean for summaries)
    let level = if config.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let catalogs = load_catalogs_config(config.config.clone())
        .context("Failed to load catalog configuration")?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No configuration directory available. Use --config <PATH> to point at catalogs.toml"
            )
        })?;

    match config.command {
        Command::Harvest {
            catalog,
            keys,
            delay,
            run,
        } => {
            let entry = find_catalog(&catalogs, &catalog)?;
            harvest(entry, &keys, delay, &run).await?;
        }
        Command::InitKeys { catalog, force } => {
            let entry = find_catalog(&catalogs, &catalog)?;
            init_keys(&catalogs, entry, force)?;
        }
        Command::Facets {
            catalog,
            sample_budget,
            dry_run,
            run,
        } => {
            let entry = find_catalog(&catalogs, &catalog)?;
            facets(
                entry,
                config.search_api_key.as_deref(),
                sample_budget,
                dry_run,
                &run,
            )
            .await?;
        }
        Command::Status { catalog } => {
            let entry = find_catalog(&catalogs, &catalog)?;
            show_status(entry)?;
        }
    }

    Ok(())
}

/// Cancellation token fired by Ctrl-C. The orchestrator stops between keys.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current key...");
            ctrl_c_token.cancel();
        }
    });
    token
}

fn check_mode(entry: &CatalogEntry, run: &RunArgs) -> anyhow::Result<()> {
    if run.mode == Mode::Scratch && !run.yes {
        anyhow::bail!(
            "Scratch mode deletes every result, snapshot and ledger entry under '{}'. Re-run with --yes to confirm.",
            entry.data_dir.display()
        );
    }
    if !entry.enabled {
        info!("Note: Catalog '{}' is marked as disabled in configuration", entry.name);
    }
    Ok(())
}

/// Harvest a page catalog key by key
async fn harvest(
    entry: &CatalogEntry,
    keys: &KeyArgs,
    delay: Option<f64>,
    run: &RunArgs,
) -> anyhow::Result<()> {
    if entry.kind == CatalogKind::Search {
        return Err(search_catalog_error(entry).into());
    }
    check_mode(entry, run)?;
    let source = keys.source(entry.key_file()).ok_or_else(|| {
        anyhow::anyhow!("No keys given. Use --start/--end, --keys, --file or --all")
    })?;

    let layout = store_layout(entry.kind);
    let stores = open_stores(entry).context("Failed to open catalog stores")?;
    let ledger_path = stores.ledger_path();
    let config = harvest_config(entry, delay)?;
    let mut orchestrator = HarvestOrchestrator::new(stores.into_handles(), config);
    let cancel_token = shutdown_token();

    info!("Harvesting catalog '{}' ({})", entry.name, entry.kind);
    let report = match entry.kind {
        CatalogKind::CrossReference => {
            let pipeline = FetchParsePipeline::new(
                CrossReferenceClient::new(&entry.url, HttpConfig::default())?,
                CrossReferenceParser::new(entry.vendor.clone()),
            );
            orchestrator
                .run_cancellable(&source, layout.key_kind, run.mode, &pipeline, cancel_token)
                .await?
        }
        CatalogKind::StyleCatalog => {
            let pipeline = FetchParsePipeline::new(
                StyleCatalogClient::new(&entry.url, HttpConfig::default())?,
                CatalogParser,
            );
            orchestrator
                .run_cancellable(&source, layout.key_kind, run.mode, &pipeline, cancel_token)
                .await?
        }
        CatalogKind::Search => return Err(search_catalog_error(entry).into()),
    };

    print_harvest_summary(&entry.name, &report, &ledger_path);
    Ok(())
}

/// Write the style catalog's key file from its source catalog's results
fn init_keys(catalogs: &CatalogsConfig, entry: &CatalogEntry, force: bool) -> anyhow::Result<()> {
    if entry.kind != CatalogKind::StyleCatalog {
        anyhow::bail!(
            "init-keys needs a style_catalog catalog, '{}' has kind '{}'",
            entry.name,
            entry.kind
        );
    }

    let keys = derive_style_keys(catalogs, entry)?;
    if keys.is_empty() {
        warn!(
            "No {} style numbers found. Harvest the source catalog first.",
            entry.vendor
        );
    }

    let path = entry.key_file();
    let written = write_key_file(&path, &keys, force)?;
    println!("\n🔑 Wrote {} style numbers to {}", written, path.display());
    println!("   Next: gleaner harvest {} --all\n", entry.name);
    Ok(())
}

/// Plan, run and merge the faceted sub-queries, then commit the listing
async fn facets(
    entry: &CatalogEntry,
    api_key: Option<&str>,
    sample_budget: Option<usize>,
    dry_run: bool,
    run: &RunArgs,
) -> anyhow::Result<()> {
    if entry.kind != CatalogKind::Search {
        anyhow::bail!(
            "Catalog '{}' has kind '{}'. Use: gleaner harvest {}",
            entry.name,
            entry.kind,
            entry.name
        );
    }
    check_mode(entry, run)?;

    let search = entry.search_config()?;
    let client = AlgoliaClient::new(
        &search.application_id,
        &search_api_key(search, api_key)?,
        &search.index,
        HttpConfig::default(),
    )?;
    let planner = FacetPlanner::new(client, planner_config(search, sample_budget));

    info!("Planning facet queries for '{}'", entry.name);
    let plan = planner.plan(&facet_spec(search)).await;
    print_plan(&plan);

    info!("Running {} queries...", plan.queries.len());
    let results = planner.execute(&plan).await;
    let merge = ResultAggregator::new(search.natural_key.clone()).merge(&results);
    print_merge_report(&merge, search.expected_total);

    if dry_run {
        info!("Dry run: stores left untouched");
        return Ok(());
    }

    let listing = ListingPipeline::from_merge(&merge, algolia::into_record);
    if listing.is_empty() {
        warn!("No hits to commit");
        return Ok(());
    }

    let stores = open_stores(entry).context("Failed to open catalog stores")?;
    let ledger_path = stores.ledger_path();
    let config = HarvestConfig::default().with_delay(Duration::ZERO);
    let mut orchestrator = HarvestOrchestrator::new(stores.into_handles(), config);
    let report = orchestrator
        .run_cancellable(
            &listing.source(),
            store_layout(entry.kind).key_kind,
            run.mode,
            &listing,
            shutdown_token(),
        )
        .await?;

    print_harvest_summary(&entry.name, &report, &ledger_path);
    Ok(())
}

/// Show store counts and the exclusivity audit
fn show_status(entry: &CatalogEntry) -> anyhow::Result<()> {
    let stores = open_stores(entry).context("Failed to open catalog stores")?;
    let audit = stores.audit()?;
    print_status(entry, &audit, &stores.results_path());
    Ok(())
}

fn print_harvest_summary(name: &str, report: &HarvestReport, ledger_path: &Path) {
    let stats = &report.stats;

    println!("\n📊 Harvest Summary: {}\n", name);
    if let Some(reset) = &report.reset {
        println!(
            "  Cleared:               {} rows, {} ledger entries, {} snapshots",
            reset.result_rows, reset.ledger_entries, reset.snapshots
        );
    }
    println!("  Keys visited:          {}/{}", report.processed, report.total_keys);
    println!("  Succeeded:             {}", stats.succeeded);
    println!("  Failed:                {}", stats.failed);
    if stats.store_errors > 0 {
        println!("    of which store errors: {}", stats.store_errors);
    }
    println!("  Skipped:               {}", stats.skipped);
    println!("  Success rate:          {:.1}%", stats.success_rate() * 100.0);
    println!("  Failure ledger:        {}", ledger_path.display());
    if report.cancelled {
        println!("\n  Interrupted. Re-run in append mode to resume.");
    }
    println!();
}

fn print_plan(plan: &FacetPlan) {
    println!("\n🧭 Facet Plan\n");
    for survey in &plan.surveys {
        let total = survey
            .total
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string());
        let note = match (&survey.error, survey.needs_narrowing) {
            (Some(error), _) => format!("survey failed: {}", error),
            (None, true) => format!("narrowed, {} hits sampled", survey.sampled_hits),
            (None, false) => "read in full".to_string(),
        };
        println!("  {:<30} {:>6} hits  {}", survey.value, total, note);
        for (attribute, values) in &survey.discovered {
            println!("    {:<28} {} values", attribute, values.len());
        }
    }

    let mut groups: Vec<&QueryGroup> = plan.queries.iter().map(|q| &q.group).collect();
    groups.sort();
    groups.dedup();
    println!();
    for group in groups {
        println!("  {:<30} {} queries", group.to_string(), plan.count_by_group(group));
    }
    println!("  {:<30} {} queries", "total", plan.queries.len());
}

fn print_merge_report(report: &MergeReport, expected_total: Option<usize>) {
    println!("\n🔗 Merge Report\n");
    println!("  Raw hits:              {}", report.raw_count);
    println!("  Unique:                {}", report.unique_count);
    println!(
        "  Duplicates removed:    {} ({:.1}%)",
        report.duplicates_removed(),
        report.overlap_ratio() * 100.0
    );
    if report.keyless > 0 {
        println!("  Without natural key:   {}", report.keyless);
    }
    if report.truncated_queries > 0 {
        println!("  Truncated queries:     {}", report.truncated_queries);
    }
    if report.failed_queries > 0 {
        println!("  Failed queries:        {}", report.failed_queries);
    }

    println!("\n  Contributions:");
    for contribution in &report.contributions {
        println!(
            "    {:<28} {:>6} raw  {:>6} new",
            contribution.group.to_string(),
            contribution.raw,
            contribution.new_unique
        );
    }

    if let Some(expected) = expected_total {
        let coverage = report.coverage(expected);
        println!(
            "\n  Coverage:              {}/{} ({:.1}%)",
            coverage.unique,
            coverage.expected,
            coverage.ratio() * 100.0
        );
        if !coverage.is_complete() {
            println!("  Missing:               {}", coverage.missing());
        }
    }
    println!();
}

fn print_status(entry: &CatalogEntry, audit: &StoreAudit, results_path: &Path) {
    println!("\n📊 Catalog Status: {} ({})\n", entry.name, entry.kind);
    println!("  Result rows:           {}", audit.result_rows);
    println!("  Snapshot files:        {}", audit.snapshot_files);
    println!(
        "  Ledger entries:        {} ({} transient, {} permanent)",
        audit.ledger_entries,
        audit.transient_failures(),
        audit.permanent_failures()
    );
    for (kind, count) in &audit.ledger_by_kind {
        println!("    {:<20} {}", kind.tag(), count);
    }
    println!("  Results file:          {}", results_path.display());

    if audit.is_consistent() {
        println!("\n  ✓ No ledgered key has a snapshot");
    } else {
        println!(
            "\n  ✗ {} ledgered keys still have a snapshot:",
            audit.conflicts.len()
        );
        for key in audit.conflicts.iter().take(10) {
            println!("    - {}", key);
        }
    }
    if !audit.stem_collisions.is_empty() {
        println!(
            "  ! {} groups of keys share a snapshot file name:",
            audit.stem_collisions.len()
        );
        for keys in audit.stem_collisions.iter().take(10) {
            println!("    - {}", keys.join(", "));
        }
    }
    if !audit.unrecorded_snapshots.is_empty() {
        println!(
            "  ! {} snapshots have no result row (treated as harvested in append mode)",
            audit.unrecorded_snapshots.len()
        );
    }
    println!();
}
