//! Census SQL generation
//!
//! Turns a load request (year, variables, level, filters, resolved categories)
//! into one parameterized analytical query. Nothing here touches the engine;
//! every builder is a pure function of its inputs.

pub mod budget;
pub mod common;
pub mod geo_filter;
pub mod pivot;
pub mod planner;
pub mod sanitize;
pub mod spatial_filter;
pub mod validation;

mod errors;

pub use budget::{BudgetStatus, ColumnBudget};
pub use errors::QueryGeneratorError;
pub use geo_filter::{build_geo_filter, GeoFilter};
pub use pivot::{build_pivot, planned_column_count, CategorySelection, PivotColumn, PivotPlan};
pub use planner::{build_census_query, CensusQuery, PlanInput};
pub use sanitize::sanitize_label;
pub use spatial_filter::{build_spatial_filter, BoundingBox};
pub use validation::{find_unresolved_placeholders, Placeholder};
