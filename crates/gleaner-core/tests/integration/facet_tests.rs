//! Facet planning, execution and merge against a mock search index.
//!
//! Fixture: cap = 2 hits/page × 2 pages = 4. "PCORE Electric" has 7
//! products and must be narrowed; "Electro Composites" has 3 and is read
//! whole. One PCORE product sits outside the sampled pages with a BIL value
//! that was sampled, another has a rare kV class only gap-fill reaches, and
//! one is never reachable. A product of an undeclared brand is only found by
//! the sweep.

use std::collections::HashSet;
use std::time::Duration;

use gleaner_core::{
    FacetPlanner, FacetSpec, PlannerConfig, QueryGroup, ResultAggregator, SearchHit,
    SecondaryFacet,
};

use super::common::{product, MockSearchIndex};

const CATEGORY: &str = "Categories.lvl3:'Bushings'";
const PCORE: &str = "PCORE Electric";
const ELECTRO: &str = "Electro Composites";

fn catalog() -> Vec<SearchHit> {
    vec![
        product("O1", "Other Co", "", ""),
        product("A1", PCORE, "69 kV", "350"),
        product("A2", PCORE, "69 kV", "350"),
        product("A3", PCORE, "115 kV", "550"),
        product("A4", PCORE, "115 kV", "550"),
        product("A5", PCORE, "230 kV", "550"),
        product("A6", PCORE, "230 kV", "900"),
        product("A7", PCORE, "4 kV", ""),
        product("B1", ELECTRO, "69 kV", "350"),
        product("B2", ELECTRO, "69 kV", "350"),
        product("B3", ELECTRO, "69 kV", "350"),
    ]
}

fn config() -> PlannerConfig {
    PlannerConfig {
        hits_per_page: 2,
        max_pages: 2,
        sample_budget: 4,
        page_delay: Duration::ZERO,
    }
}

fn spec(facets: Vec<SecondaryFacet>, sweep: bool) -> FacetSpec {
    FacetSpec {
        category: CATEGORY.to_string(),
        partition_attribute: "Brands".to_string(),
        partition_field: "Brand".to_string(),
        partition_values: vec![PCORE.to_string(), ELECTRO.to_string()],
        facets,
        sweep,
    }
}

fn kv_facet() -> SecondaryFacet {
    SecondaryFacet {
        attribute: "kV Class".to_string(),
        gap_fill: vec!["4 kV".to_string(), "69 kV".to_string()],
    }
}

fn bil_facet() -> SecondaryFacet {
    SecondaryFacet {
        attribute: "BIL".to_string(),
        gap_fill: Vec::new(),
    }
}

#[tokio::test]
async fn test_sample_budget_below_page_size_caps_sampled_hits() {
    let small_budget = PlannerConfig {
        sample_budget: 1,
        ..config()
    };
    let planner = FacetPlanner::new(MockSearchIndex::new(catalog()), small_budget);
    let plan = planner.plan(&spec(vec![kv_facet()], false)).await;

    let pcore = &plan.surveys[0];
    assert!(pcore.needs_narrowing);
    assert_eq!(pcore.sampled_hits, 1);
    let kv: Vec<&str> = pcore
        .discovered_values("kV Class")
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(kv, vec!["69 kV"]);
}

#[tokio::test]
async fn test_plan_narrows_only_oversized_partitions() {
    let planner = FacetPlanner::new(MockSearchIndex::new(catalog()), config());
    let plan = planner.plan(&spec(vec![kv_facet(), bil_facet()], true)).await;

    let pcore = &plan.surveys[0];
    assert_eq!(pcore.total, Some(7));
    assert!(pcore.needs_narrowing);
    assert_eq!(pcore.sampled_hits, 4);
    let kv: Vec<&str> = pcore
        .discovered_values("kV Class")
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(kv, vec!["115 kV", "69 kV"]);

    let electro = &plan.surveys[1];
    assert_eq!(electro.total, Some(3));
    assert!(!electro.needs_narrowing);
    assert!(electro.error.is_none());

    assert_eq!(plan.count_by_group(&QueryGroup::Partition), 1);
    assert_eq!(plan.count_by_group(&QueryGroup::Attribute("kV Class".into())), 2);
    assert_eq!(plan.count_by_group(&QueryGroup::Attribute("BIL".into())), 2);
    assert_eq!(plan.count_by_group(&QueryGroup::GapFill), 1);
    assert_eq!(plan.count_by_group(&QueryGroup::Sweep), 1);

    assert_eq!(
        plan.queries[0].filter.to_string(),
        "Categories.lvl3:'Bushings' AND Brands:'Electro Composites'"
    );
    assert_eq!(
        plan.queries[1].filter.to_string(),
        "Categories.lvl3:'Bushings' AND Brands:'PCORE Electric' AND 'kV Class':'115 kV'"
    );
    let gap = plan
        .queries
        .iter()
        .find(|q| q.group == QueryGroup::GapFill)
        .unwrap();
    assert!(gap.filter.to_string().ends_with("'kV Class':'4 kV'"));
}

#[tokio::test]
async fn test_execute_and_merge_reports_coverage() {
    let index = MockSearchIndex::new(catalog());
    let planner = FacetPlanner::new(index.clone(), config());
    let plan = planner.plan(&spec(vec![kv_facet(), bil_facet()], true)).await;
    let results = planner.execute(&plan).await;
    let report = ResultAggregator::new("Catalog Number").merge(&results);

    // Surveys come on top of at least one page per planned query.
    assert!(index.request_count() > plan.queries.len());

    assert_eq!(report.raw_count, 14);
    assert_eq!(report.unique_count, 10);
    assert_eq!(report.keyless, 0);
    assert_eq!(report.duplicates_removed(), 4);

    let keys: HashSet<&str> = report.hits.iter().map(|h| h.natural_key.as_str()).collect();
    assert_eq!(keys.len(), report.unique_count);
    assert!(keys.contains("A5"), "BIL facet reaches unsampled products");
    assert!(keys.contains("A7"), "gap-fill reaches rare values");
    assert!(keys.contains("O1"), "sweep keeps undeclared brands");
    assert!(!keys.contains("A6"));

    let bil = report
        .contribution(&QueryGroup::Attribute("BIL".into()))
        .unwrap();
    assert_eq!(bil.raw, 5);
    assert_eq!(bil.new_unique, 1);

    let sweep = report.contribution(&QueryGroup::Sweep).unwrap();
    assert_eq!(sweep.raw, 1);

    let coverage = report.coverage(11);
    assert_eq!(coverage.missing(), 1);
    assert_eq!(report.truncated_queries, 0);
}

#[tokio::test]
async fn test_adding_a_facet_never_reduces_coverage() {
    let narrow = FacetPlanner::new(MockSearchIndex::new(catalog()), config());
    let plan = narrow.plan(&spec(vec![kv_facet()], true)).await;
    let kv_only = ResultAggregator::new("Catalog Number").merge(&narrow.execute(&plan).await);

    let wide = FacetPlanner::new(MockSearchIndex::new(catalog()), config());
    let plan = wide.plan(&spec(vec![kv_facet(), bil_facet()], true)).await;
    let both = ResultAggregator::new("Catalog Number").merge(&wide.execute(&plan).await);

    assert_eq!(kv_only.unique_count, 9);
    assert!(both.unique_count >= kv_only.unique_count);
}

#[tokio::test]
async fn test_failed_subquery_is_recorded_and_skipped() {
    let index = MockSearchIndex::new(catalog()).failing_on("'kV Class':'115 kV'");
    let planner = FacetPlanner::new(index, config());
    let plan = planner.plan(&spec(vec![kv_facet(), bil_facet()], true)).await;
    let results = planner.execute(&plan).await;

    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].hits.is_empty());
    assert_eq!(results.len(), plan.queries.len());

    let report = ResultAggregator::new("Catalog Number").merge(&results);
    assert_eq!(report.failed_queries, 1);
    assert_eq!(report.unique_count, 10, "BIL queries still cover A3 and A4");
}

#[tokio::test]
async fn test_failed_survey_falls_back_to_unnarrowed_query() {
    let index = MockSearchIndex::new(catalog()).failing_on("Brands:'PCORE Electric'");
    let planner = FacetPlanner::new(index, config());
    let plan = planner.plan(&spec(vec![kv_facet()], false)).await;

    let pcore = &plan.surveys[0];
    assert!(pcore.error.is_some());
    assert_eq!(pcore.total, None);
    assert_eq!(pcore.sampled_hits, 0);

    assert_eq!(plan.count_by_group(&QueryGroup::Partition), 2);
    assert_eq!(plan.count_by_group(&QueryGroup::GapFill), 2);
    assert_eq!(plan.count_by_group(&QueryGroup::Sweep), 0);

    let report = ResultAggregator::new("Catalog Number").merge(&planner.execute(&plan).await);
    assert_eq!(report.unique_count, 3);
}

#[tokio::test]
async fn test_oversized_subquery_marked_truncated() {
    let mut products = catalog();
    for i in 0..5 {
        products.push(product(&format!("C{}", i), PCORE, "69 kV", "350"));
    }
    let planner = FacetPlanner::new(MockSearchIndex::new(products), config());
    let plan = planner.plan(&spec(vec![kv_facet()], false)).await;
    let results = planner.execute(&plan).await;

    let kv69 = results
        .iter()
        .find(|r| r.query.filter.to_string().ends_with("'kV Class':'69 kV'"))
        .unwrap();
    assert_eq!(kv69.reported_total, 7);
    assert!(kv69.truncated);
    assert_eq!(kv69.hits.len(), 4);
}
