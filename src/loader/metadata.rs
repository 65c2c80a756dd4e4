//! Metadata browsing: entity types, variables, unit codes, column counts.
//!
//! Every lookup goes through the session cache first.

use crate::cache::{get_typed, put_typed, CacheKey};
use crate::census_catalog::{CensusYear, GeoLevel};
use crate::engine::{QueryResult, SqlValue};
use crate::progress::ProgressReporter;
use crate::query_generator::common::{placeholders, string_literal};
use crate::query_generator::{planned_column_count, CategorySelection};

use super::{CensusSession, LoaderError};

/// `(code, label)` pairs.
pub type CodeList = Vec<(String, String)>;

impl CensusSession {
    /// Entity types of the year that appear in its metadata table.
    pub async fn get_entity_types(
        &self,
        year: Option<CensusYear>,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<String>, LoaderError> {
        let schema = self.schema(year);
        let key = CacheKey::EntityTypes(schema.year);
        if let Some(cached) = get_typed::<Vec<String>>(self.cache.as_ref(), &key) {
            progress.report(100, "Entity types loaded from cache");
            return Ok(cached);
        }

        progress.report(10, "Connecting to data source...");
        self.prepare().await?;
        progress.report(50, "Loading entity types...");

        let sql = format!(
            "SELECT DISTINCT entidad\nFROM {}\nWHERE entidad IN ({})\nORDER BY entidad",
            string_literal(&schema.urls.metadata_table),
            placeholders(schema.entity_types.len())
        );
        let params: Vec<SqlValue> = schema
            .entity_types
            .iter()
            .map(|e| SqlValue::from(e.as_str()))
            .collect();
        let result = self
            .executor
            .execute(&sql, &params)
            .await
            .map_err(|e| LoaderError::operation("loading entity types", e))?;

        let entity_types: Vec<String> = result
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(|v| v.to_code_string()))
            .collect();
        put_typed(self.cache.as_ref(), &key, &entity_types);
        progress.report(100, "Entity types loaded");
        Ok(entity_types)
    }

    /// Variables of the year, optionally restricted to one entity type.
    pub async fn get_variables(
        &self,
        year: Option<CensusYear>,
        entity_type: Option<&str>,
        progress: &dyn ProgressReporter,
    ) -> Result<CodeList, LoaderError> {
        let schema = self.schema(year);
        let key = CacheKey::Variables(schema.year, entity_type);
        if let Some(cached) = get_typed::<CodeList>(self.cache.as_ref(), &key) {
            progress.report(100, "Variables loaded from cache");
            return Ok(cached);
        }

        progress.report(10, "Connecting to data source...");
        self.prepare().await?;
        progress.report(30, "Loading variable metadata...");

        let table = string_literal(&schema.urls.metadata_table);
        let (sql, params) = match entity_type {
            Some(entity) => (
                format!(
                    "SELECT DISTINCT codigo_variable, etiqueta_variable\nFROM {}\nWHERE entidad = ?\nORDER BY codigo_variable",
                    table
                ),
                vec![SqlValue::from(entity)],
            ),
            None => (
                format!(
                    "SELECT DISTINCT codigo_variable, etiqueta_variable\nFROM {}\nORDER BY codigo_variable",
                    table
                ),
                Vec::new(),
            ),
        };
        let result = self
            .executor
            .execute(&sql, &params)
            .await
            .map_err(|e| LoaderError::operation("loading variables", e))?;

        let variables = code_pairs(&result);
        put_typed(self.cache.as_ref(), &key, &variables);
        progress.report(100, "Variables loaded");
        Ok(variables)
    }

    /// Units available at `level`, with codes in geographic filter format.
    pub async fn get_geographic_codes(
        &self,
        year: Option<CensusYear>,
        level: GeoLevel,
        progress: &dyn ProgressReporter,
    ) -> Result<CodeList, LoaderError> {
        let schema = self.schema(year);
        let key = CacheKey::GeoCodes(schema.year, level);
        if let Some(cached) = get_typed::<CodeList>(self.cache.as_ref(), &key) {
            progress.report(100, &format!("{} codes loaded from cache", level));
            return Ok(cached);
        }

        progress.report(10, "Connecting to data source...");
        self.prepare().await?;
        progress.report(50, &format!("Loading {} codes...", level));

        let sql = geographic_codes_sql(level, &string_literal(&schema.urls.fact_table));
        let result = self
            .executor
            .execute(&sql, &[])
            .await
            .map_err(|e| LoaderError::operation("loading geographic codes", e))?;

        let codes = code_pairs(&result);
        put_typed(self.cache.as_ref(), &key, &codes);
        progress.report(100, "Geographic codes loaded");
        Ok(codes)
    }

    /// Number of pivot columns a load of `variable_codes` would produce.
    ///
    /// Uses the bulk metadata map, so unknown variables count as one total
    /// column each.
    pub async fn calculate_column_count(
        &self,
        year: Option<CensusYear>,
        variable_codes: &[String],
        selected: Option<&CategorySelection>,
        progress: &dyn ProgressReporter,
    ) -> Result<usize, LoaderError> {
        let schema = self.schema(year);
        self.prepare().await?;
        let map = self.resolver.preload_all_metadata(&schema, progress).await?;
        Ok(planned_column_count(variable_codes, &map, selected))
    }
}

fn code_pairs(result: &QueryResult) -> CodeList {
    result
        .rows
        .iter()
        .filter_map(|row| {
            let code = row.first()?.to_code_string()?;
            let label = row
                .get(1)
                .and_then(|v| v.to_code_string())
                .unwrap_or_default();
            Some((code, label))
        })
        .collect()
}

fn geographic_codes_sql(level: GeoLevel, fact_table: &str) -> String {
    let (code, label, order) = match level {
        GeoLevel::Prov => (
            "c.valor_provincia",
            "c.etiqueta_provincia",
            "c.valor_provincia",
        ),
        GeoLevel::Depto => (
            "c.valor_provincia || '-' || c.valor_departamento",
            "c.etiqueta_provincia || ' - ' || c.etiqueta_departamento",
            "c.valor_provincia, c.valor_departamento",
        ),
        GeoLevel::Fracc => (
            "c.valor_provincia || '-' || c.valor_departamento || '-' || c.valor_fraccion",
            "c.etiqueta_provincia || ' - ' || c.etiqueta_departamento || ' - Fracc ' || c.valor_fraccion",
            "c.valor_provincia, c.valor_departamento, c.valor_fraccion",
        ),
        GeoLevel::Radio => (
            "c.id_geo",
            "c.etiqueta_provincia || ' - ' || c.etiqueta_departamento || ' - Radio ' || c.valor_radio",
            "c.valor_provincia, c.valor_departamento, c.valor_fraccion, c.valor_radio",
        ),
    };
    format!(
        "SELECT DISTINCT\n    {} AS code,\n    {} AS label\nFROM {} c\nORDER BY {}",
        code, label, fact_table, order
    )
}
