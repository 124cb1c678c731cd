//! Gleaner Core - harvest control logic, facet planning and result aggregation.
//!
//! This crate decides what to fetch and keeps the result store, snapshot
//! archive and failure ledger consistent across repeated, possibly
//! interrupted runs. Network access and persistence live behind the traits in
//! [`traits`].

pub mod aggregate;
pub mod config;
pub mod error;
pub mod facet;
pub mod harvest;
pub mod listing;
pub mod mode;
pub mod models;
pub mod source;
pub mod stats;
pub mod traits;

pub use aggregate::{Coverage, GroupContribution, MergeReport, MergedHit, ResultAggregator};
pub use config::{
    default_config_path, load_catalogs_config, CatalogEntry, CatalogKind, CatalogsConfig,
    HarvestConfig, HttpConfig, PlannerConfig, SearchCatalogConfig, SecondaryFacet,
};
pub use error::{AppError, FetchError, FetchErrorKind};
pub use facet::{
    FacetPlan, FacetPlanner, FacetSpec, FilterExpression, PartitionSurvey, PlannedQuery,
    QueryGroup, SearchHit, SearchPage, SearchQuery, SubqueryHits,
};
pub use harvest::{FetchParsePipeline, HarvestOrchestrator, StoreHandles};
pub use listing::ListingPipeline;
pub use mode::{resolve, Action, Mode, Resolution, StoreState};
pub use models::{
    FailureEntry, FailureKind, FailureReason, KeyKind, ParseOutcome, Parsed, RawPayload, Record,
    WorkKey,
};
pub use source::WorkKeySource;
pub use stats::{HarvestOutcome, HarvestReport, HarvestStats, ResetSummary};
