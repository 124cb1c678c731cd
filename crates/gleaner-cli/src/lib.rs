//! Gleaner CLI - command-line interface for the Gleaner catalog harvester
//!
//! This crate provides the `gleaner` binary that ties the core, store and
//! client crates together.

pub mod catalogs;
pub mod config;

pub use config::{Command, Config, KeyArgs, RunArgs};
