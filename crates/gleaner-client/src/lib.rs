//! Gleaner Client - network collaborators for the harvest core.
//!
//! This crate provides the fetchers, parsers and search client behind the
//! core traits:
//!
//! - [`cross_reference`] - indexed cross-reference pages
//! - [`catalog`] - style-number specification sheets
//! - [`algolia`] - Algolia search index for capped product listings
//! - [`http`] - shared request/retry plumbing
//!
//! # Overview
//!
//! Fetchers map every transport failure onto a tagged `FetchError` so the
//! harvester can ledger it; parsers turn a page into a `Record` or report that
//! it carries no data.

pub mod algolia;
pub mod catalog;
pub mod cross_reference;
pub mod http;
mod text;

// Re-export main client types
pub use algolia::AlgoliaClient;
pub use catalog::{CatalogParser, StyleCatalogClient};
pub use cross_reference::{CrossReferenceClient, CrossReferenceParser};
pub use http::HttpClient;
