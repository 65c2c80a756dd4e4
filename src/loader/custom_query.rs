//! User-written SQL against the census tables.
//!
//! The year's three tables are exposed as views named `radios`, `census` and
//! `metadata`. A result with a `wkt` column becomes a layer, anything else is
//! returned as a plain table.

use crate::census_catalog::CensusYear;
use crate::engine::QueryResult;
use crate::progress::ProgressReporter;
use crate::query_generator::common::string_literal;
use crate::query_generator::find_unresolved_placeholders;
use crate::query_generator::planner::WKT_OUTPUT;

use super::layer::CensusLayer;
use super::materialize::materialize_query_rows;
use super::{CensusSession, LoaderError};

const CUSTOM_LAYER_NAME: &str = "Custom SQL result";

#[derive(Debug, Clone, PartialEq)]
pub enum CustomQueryOutcome {
    Layer(CensusLayer),
    Table(QueryResult),
    /// The query ran and returned no rows.
    NoRows,
}

impl CensusSession {
    pub async fn run_custom_query(
        &self,
        year: Option<CensusYear>,
        sql: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<CustomQueryOutcome, LoaderError> {
        let placeholders = find_unresolved_placeholders(sql);
        if !placeholders.is_empty() {
            return Err(LoaderError::UnresolvedPlaceholders(placeholders));
        }

        let schema = self.schema(year);
        progress.report(10, "Connecting to data source...");
        self.prepare().await?;

        progress.report(
            20,
            &format!("Creating table views for census {}...", schema.year),
        );
        let urls = &schema.urls;
        let views = format!(
            "DROP VIEW IF EXISTS radios;\nDROP VIEW IF EXISTS census;\nDROP VIEW IF EXISTS metadata;\n\
             CREATE VIEW radios AS SELECT * FROM {};\n\
             CREATE VIEW census AS SELECT * FROM {};\n\
             CREATE VIEW metadata AS SELECT * FROM {};",
            string_literal(&urls.geometry_table),
            string_literal(&urls.fact_table),
            string_literal(&urls.metadata_table),
        );
        self.executor
            .execute_batch(&views)
            .await
            .map_err(|e| LoaderError::operation("creating census views", e))?;

        progress.report(30, "Executing query...");
        let result = self
            .executor
            .execute(sql, &[])
            .await
            .map_err(|e| LoaderError::operation("running custom query", e))?;

        if result.is_empty() {
            progress.report(100, "The query returned no rows");
            return Ok(CustomQueryOutcome::NoRows);
        }

        progress.report(50, "Processing results...");
        if result.column_index(WKT_OUTPUT).is_none() {
            progress.report(100, "Done");
            return Ok(CustomQueryOutcome::Table(result));
        }

        let mut layer = CensusLayer::new(CUSTOM_LAYER_NAME).with_query(sql);
        materialize_query_rows(&result, &mut layer, progress);
        Ok(CustomQueryOutcome::Layer(layer))
    }
}
