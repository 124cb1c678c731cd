//! Facet planning for search indexes that cap results per query.
//!
//! A query over the whole catalog returns at most
//! `hits_per_page × max_pages` hits. The planner splits the catalog into
//! partitions (e.g. brands), and any partition larger than the cap into one
//! query per value of each secondary attribute (e.g. kV class). Values are
//! discovered by sampling, so the discovered set may be incomplete; known
//! rare values can be added as gap-fill queries.
//!
//! Sub-queries overlap; merge their hits with
//! [`crate::aggregate::ResultAggregator`].

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use crate::config::{PlannerConfig, SecondaryFacet};
use crate::traits::SearchIndex;

/// Pages read by the category-only sweep.
pub const SWEEP_PAGES: usize = 5;

// =============================================================================
// Filter expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterClause {
    /// Pre-rendered filter text, used verbatim.
    Raw(String),
    Eq { attribute: String, value: String },
}

impl FilterClause {
    fn render(&self) -> String {
        match self {
            FilterClause::Raw(text) => text.clone(),
            FilterClause::Eq { attribute, value } => {
                format!("{}:{}", render_attribute(attribute), quote(value))
            }
        }
    }
}

fn is_simple_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn render_attribute(name: &str) -> String {
    if is_simple_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Conjunction of filter clauses.
///
/// # Examples
///
/// ```
/// use gleaner_core::facet::FilterExpression;
///
/// let filter = FilterExpression::raw("Categories.lvl0:'Bushings'")
///     .and_eq("Brands", "PCORE Electric")
///     .and_eq("kV Class", "69 kV");
/// assert_eq!(
///     filter.to_string(),
///     "Categories.lvl0:'Bushings' AND Brands:'PCORE Electric' AND 'kV Class':'69 kV'"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterExpression {
    clauses: Vec<FilterClause>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::new().and_raw(text)
    }

    pub fn and_raw(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.clauses.push(FilterClause::Raw(text));
        }
        self
    }

    pub fn and_eq(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push(FilterClause::Eq {
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.clauses.iter().map(FilterClause::render).collect();
        write!(f, "{}", rendered.join(" AND "))
    }
}

// =============================================================================
// Search types
// =============================================================================

/// One page request against a search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub filter: FilterExpression,
    /// Zero-based.
    pub page: usize,
    pub hits_per_page: usize,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    /// Total matches reported by the index, beyond the cap.
    pub nb_hits: usize,
    pub nb_pages: usize,
}

/// A single search hit: an opaque JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHit(pub Map<String, Value>);

impl SearchHit {
    /// Returns a scalar attribute as trimmed text, `None` when absent or blank.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0.get(name).and_then(scalar_text)
    }

    /// Returns every value of an attribute; arrays yield one value per item.
    pub fn attribute_values(&self, name: &str) -> Vec<String> {
        match self.0.get(name) {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
            Some(value) => scalar_text(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

impl From<Map<String, Value>> for SearchHit {
    fn from(map: Map<String, Value>) -> Self {
        SearchHit(map)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

// =============================================================================
// Planning
// =============================================================================

/// What to decompose: a category split into partitions, narrowed further by
/// secondary facets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetSpec {
    /// Raw filter selecting the whole category.
    pub category: String,
    /// Filter attribute of the partition (e.g. `Brands`).
    pub partition_attribute: String,
    /// Hit field carrying the partition value (e.g. `Brand`).
    pub partition_field: String,
    pub partition_values: Vec<String>,
    /// Applied independently, in this order.
    pub facets: Vec<SecondaryFacet>,
    /// Also read the category without partition filter, keeping only hits
    /// from undeclared partitions.
    pub sweep: bool,
}

impl FacetSpec {
    fn partition_filter(&self, value: &str) -> FilterExpression {
        FilterExpression::raw(self.category.clone()).and_eq(&self.partition_attribute, value)
    }
}

/// Which stage of the plan a query belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryGroup {
    /// A partition small enough to read in full.
    Partition,
    /// Narrowed by a discovered value of this attribute.
    Attribute(String),
    GapFill,
    Sweep,
}

impl fmt::Display for QueryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryGroup::Partition => write!(f, "partition"),
            QueryGroup::Attribute(name) => write!(f, "{}", name),
            QueryGroup::GapFill => write!(f, "gap-fill"),
            QueryGroup::Sweep => write!(f, "sweep"),
        }
    }
}

/// Keeps only hits whose `field` is present and not one of `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionExclusion {
    pub field: String,
    pub values: Vec<String>,
}

impl PartitionExclusion {
    fn keeps(&self, hit: &SearchHit) -> bool {
        match hit.attribute(&self.field) {
            Some(value) => !self.values.contains(&value),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    pub group: QueryGroup,
    pub label: String,
    pub filter: FilterExpression,
    /// Page limit for this query, at most the index ceiling.
    pub max_pages: usize,
    pub exclude: Option<PartitionExclusion>,
}

/// What the planner learned about one partition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionSurvey {
    pub value: String,
    /// Total reported by the index; `None` when the survey request failed.
    pub total: Option<usize>,
    pub needs_narrowing: bool,
    /// Hits read while sampling. Values absent from these hits are unknown.
    pub sampled_hits: usize,
    /// Distinct values per secondary attribute, in facet order.
    pub discovered: Vec<(String, BTreeSet<String>)>,
    pub error: Option<String>,
}

impl PartitionSurvey {
    pub fn discovered_values(&self, attribute: &str) -> Option<&BTreeSet<String>> {
        self.discovered
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, values)| values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FacetPlan {
    pub queries: Vec<PlannedQuery>,
    pub surveys: Vec<PartitionSurvey>,
}

impl FacetPlan {
    pub fn count_by_group(&self, group: &QueryGroup) -> usize {
        self.queries.iter().filter(|q| &q.group == group).count()
    }
}

/// Hits gathered for one planned query.
#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryHits {
    pub query: PlannedQuery,
    pub hits: Vec<SearchHit>,
    /// `nb_hits` of the first page, 0 when that page failed.
    pub reported_total: usize,
    /// The query matched more hits than its page limit could return.
    pub truncated: bool,
    /// Error of the page that ended the query early.
    pub error: Option<String>,
}

/// Builds and executes facet plans against a [`SearchIndex`].
pub struct FacetPlanner<I> {
    index: I,
    config: PlannerConfig,
}

impl<I: SearchIndex> FacetPlanner<I> {
    pub fn new(index: I, config: PlannerConfig) -> Self {
        Self { index, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Surveys every partition and emits the sub-queries needed to cover it.
    ///
    /// Survey and sampling failures are logged and recorded in the plan; a
    /// partition whose survey failed is still queried unnarrowed, plus its
    /// gap-fill values.
    pub async fn plan(&self, spec: &FacetSpec) -> FacetPlan {
        let cap = self.config.cap();
        let mut surveys = Vec::with_capacity(spec.partition_values.len());
        let mut partition_queries = Vec::new();
        let mut attribute_queries: Vec<Vec<PlannedQuery>> = vec![Vec::new(); spec.facets.len()];
        let mut gap_queries = Vec::new();

        for value in &spec.partition_values {
            let survey = self.survey(spec, value).await;
            let base = spec.partition_filter(value);

            if !survey.needs_narrowing {
                partition_queries.push(PlannedQuery {
                    group: QueryGroup::Partition,
                    label: value.clone(),
                    filter: base.clone(),
                    max_pages: self.config.max_pages,
                    exclude: None,
                });
                if survey.error.is_none() {
                    surveys.push(survey);
                    continue;
                }
            }

            for (i, facet) in spec.facets.iter().enumerate() {
                let discovered = survey.discovered_values(&facet.attribute);

                if let Some(values) = discovered {
                    for facet_value in values {
                        attribute_queries[i].push(PlannedQuery {
                            group: QueryGroup::Attribute(facet.attribute.clone()),
                            label: format!("{} / {}={}", value, facet.attribute, facet_value),
                            filter: base.clone().and_eq(&facet.attribute, facet_value),
                            max_pages: self.config.max_pages,
                            exclude: None,
                        });
                    }
                }

                for gap_value in &facet.gap_fill {
                    if discovered.is_some_and(|values| values.contains(gap_value)) {
                        continue;
                    }
                    gap_queries.push(PlannedQuery {
                        group: QueryGroup::GapFill,
                        label: format!("{} / {}={}", value, facet.attribute, gap_value),
                        filter: base.clone().and_eq(&facet.attribute, gap_value),
                        max_pages: self.config.max_pages,
                        exclude: None,
                    });
                }
            }

            surveys.push(survey);
        }

        let mut queries = partition_queries;
        queries.extend(attribute_queries.into_iter().flatten());
        queries.extend(gap_queries);

        if spec.sweep {
            queries.push(PlannedQuery {
                group: QueryGroup::Sweep,
                label: "category sweep".to_string(),
                filter: FilterExpression::raw(spec.category.clone()),
                max_pages: SWEEP_PAGES.min(self.config.max_pages),
                exclude: Some(PartitionExclusion {
                    field: spec.partition_field.clone(),
                    values: spec.partition_values.clone(),
                }),
            });
        }

        tracing::info!(
            queries = queries.len(),
            partitions = surveys.len(),
            cap,
            "Facet plan ready"
        );

        FacetPlan { queries, surveys }
    }

    async fn survey(&self, spec: &FacetSpec, value: &str) -> PartitionSurvey {
        let cap = self.config.cap();
        let base = spec.partition_filter(value);
        let mut survey = PartitionSurvey {
            value: value.to_string(),
            ..PartitionSurvey::default()
        };

        let first = match self.page(&base, 0).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(partition = value, error = %e, "Partition survey failed");
                survey.error = Some(e);
                return survey;
            }
        };

        survey.total = Some(first.nb_hits);
        if first.nb_hits <= cap {
            tracing::info!(partition = value, total = first.nb_hits, "Partition fits under cap");
            return survey;
        }
        survey.needs_narrowing = true;

        let mut discovered: Vec<(String, BTreeSet<String>)> = spec
            .facets
            .iter()
            .map(|f| (f.attribute.clone(), BTreeSet::new()))
            .collect();

        let pages = self.config.sample_pages().min(first.nb_pages.max(1));
        let mut sampled = Vec::new();
        sampled.extend(first.hits);

        for page in 1..pages {
            tokio::time::sleep(self.config.page_delay).await;
            match self.page(&base, page).await {
                Ok(next) if next.hits.is_empty() => break,
                Ok(next) => sampled.extend(next.hits),
                Err(e) => {
                    tracing::warn!(partition = value, page, error = %e, "Sampling page failed");
                    survey.error = Some(e);
                    break;
                }
            }
        }

        sampled.truncate(self.config.sample_budget);
        for hit in &sampled {
            for (attribute, values) in discovered.iter_mut() {
                values.extend(hit.attribute_values(attribute));
            }
        }

        for (attribute, values) in &discovered {
            tracing::info!(
                partition = value,
                attribute = attribute.as_str(),
                values = values.len(),
                "Discovered facet values"
            );
        }

        survey.sampled_hits = sampled.len();
        survey.discovered = discovered;
        survey
    }

    /// Runs every planned query page by page.
    ///
    /// A failing page ends its query; hits gathered so far are kept and the
    /// next query proceeds.
    pub async fn execute(&self, plan: &FacetPlan) -> Vec<SubqueryHits> {
        let mut results = Vec::with_capacity(plan.queries.len());
        let mut first_request = true;

        for (i, query) in plan.queries.iter().enumerate() {
            let mut hits = Vec::new();
            let mut reported_total = 0;
            let mut error = None;
            let page_limit = query.max_pages.min(self.config.max_pages);

            for page in 0..page_limit {
                if !first_request {
                    tokio::time::sleep(self.config.page_delay).await;
                }
                first_request = false;

                let result = match self.page(&query.filter, page).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(query = query.label.as_str(), page, error = %e, "Sub-query page failed");
                        error = Some(e);
                        break;
                    }
                };

                if page == 0 {
                    reported_total = result.nb_hits;
                }
                let last = result.hits.is_empty() || page + 1 >= result.nb_pages;

                match &query.exclude {
                    Some(exclusion) => {
                        hits.extend(result.hits.into_iter().filter(|h| exclusion.keeps(h)))
                    }
                    None => hits.extend(result.hits),
                }

                if last {
                    break;
                }
            }

            let truncated = query.exclude.is_none()
                && reported_total > page_limit * self.config.hits_per_page;
            if truncated {
                tracing::warn!(
                    query = query.label.as_str(),
                    total = reported_total,
                    "Sub-query still exceeds the result cap"
                );
            }

            tracing::info!(
                "[{}/{}] {} ({}): {} hits",
                i + 1,
                plan.queries.len(),
                query.label,
                query.group,
                hits.len()
            );

            results.push(SubqueryHits {
                query: query.clone(),
                hits,
                reported_total,
                truncated,
                error,
            });
        }

        results
    }

    async fn page(&self, filter: &FilterExpression, page: usize) -> Result<SearchPage, String> {
        let query = SearchQuery {
            filter: filter.clone(),
            page,
            hits_per_page: self.config.hits_per_page,
        };
        self.index.search(&query).await.map_err(|e| e.to_string())
    }
}
