//! Census catalog - static description of the published census datasets
//!
//! Each supported census year publishes three remote Parquet tables (facts,
//! metadata, geometry) that share a hierarchy of geographic key columns.

pub mod categories;
pub mod geo_level;
pub mod year_schema;

pub use categories::{Category, CategoryMap, VariableCategorySet};
pub use geo_level::{GeoLevel, LevelLayout, UnknownGeoLevelError, BASE_UNIT_COLUMNS};
pub use year_schema::{CensusYear, CensusYearSchema, DataUrls, UnknownYearError};
