//! Censo Layers - Argentine census variables as geometry layers
//!
//! This crate turns a selection of census variables into one analytical SQL
//! query over the published census Parquet files and materializes the result
//! as a vector layer:
//! - Per-year dataset registry and geographic levels
//! - Category resolution with caching and retry
//! - Category pivot and two-stage aggregation planning
//! - Execution through an injected engine handle (DuckDB behind `duckdb`)
//! - Geometry parsing and layer materialization

pub mod cache;
pub mod category_resolver;
pub mod census_catalog;
pub mod config;
pub mod engine;
pub mod loader;
pub mod progress;
pub mod query_generator;
