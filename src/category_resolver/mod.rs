//! Category resolution
//!
//! Finds the category breakdown of a variable, trying in order:
//!
//! 1. the bulk metadata map of the year (held in memory once preloaded, or
//!    read back from the cache),
//! 2. the per-variable cache entry,
//! 3. a live query against the metadata table, retried with backoff.
//!
//! [`CategoryResolver::resolve_all`] degrades a variable that cannot be
//! resolved to a total-only set instead of failing the load.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cache::{get_typed, put_typed, CacheKey, CacheStore};
use crate::census_catalog::{CategoryMap, CensusYear, CensusYearSchema, VariableCategorySet};
use crate::engine::{EngineError, QueryExecutor, SqlValue};
use crate::progress::{scaled, ProgressReporter};
use crate::query_generator::common::string_literal;

mod errors;
pub mod retry;

pub use errors::ResolveError;
pub use retry::{retry_with_backoff, Clock, RetriesExhausted, RetryPolicy, TokioClock};

pub struct CategoryResolver {
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<dyn CacheStore>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    preloaded: Mutex<HashMap<CensusYear, Arc<CategoryMap>>>,
}

/// Outcome of resolving several variables at once.
#[derive(Debug, Default)]
pub struct Resolution {
    pub categories: CategoryMap,
    /// Variables that fell back to total-only, with the reason.
    pub degraded: Vec<(String, ResolveError)>,
}

impl CategoryResolver {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<dyn CacheStore>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor,
            cache,
            retry,
            clock,
            preloaded: Mutex::new(HashMap::new()),
        }
    }

    fn remembered(&self, year: CensusYear) -> Option<Arc<CategoryMap>> {
        self.preloaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&year)
            .cloned()
    }

    fn remember(&self, year: CensusYear, map: CategoryMap) -> Arc<CategoryMap> {
        let map = Arc::new(map);
        self.preloaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(year, Arc::clone(&map));
        map
    }

    /// Bulk map of the year if it is already available without a query.
    pub fn bulk_map(&self, year: CensusYear) -> Option<Arc<CategoryMap>> {
        if let Some(map) = self.remembered(year) {
            return Some(map);
        }
        let cached: CategoryMap = get_typed(self.cache.as_ref(), &CacheKey::AllMetadata(year))?;
        Some(self.remember(year, cached))
    }

    /// Load the category sets of every variable of the year in one query.
    pub async fn preload_all_metadata(
        &self,
        schema: &CensusYearSchema,
        progress: &dyn ProgressReporter,
    ) -> Result<Arc<CategoryMap>, ResolveError> {
        let year = schema.year;
        if let Some(map) = self.bulk_map(year) {
            progress.report(100, &format!("Census {} metadata loaded from cache", year));
            return Ok(map);
        }

        progress.report(5, &format!("Loading census {} metadata...", year));
        let sql = format!(
            "SELECT codigo_variable, valor_categoria, etiqueta_categoria\nFROM {}\nORDER BY codigo_variable, valor_categoria",
            string_literal(&schema.urls.metadata_table)
        );
        let result = self
            .executor
            .execute(&sql, &[])
            .await
            .map_err(|e| with_operation(e, "preloading census metadata"))?;

        let mut map = CategoryMap::new();
        for row in &result.rows {
            let Some(code) = row.first().and_then(|v| v.to_code_string()) else {
                continue;
            };
            let set = map
                .entry(code.clone())
                .or_insert_with(|| VariableCategorySet::new(code));
            match row.get(1).and_then(|v| v.to_code_string()) {
                Some(value) => {
                    let label = row
                        .get(2)
                        .and_then(|v| v.to_code_string())
                        .unwrap_or_default();
                    set.push_category(value, label);
                }
                None => set.mark_nulls(),
            }
        }

        put_typed(self.cache.as_ref(), &CacheKey::AllMetadata(year), &map);
        log::info!("Preloaded census {} metadata: {} variables", year, map.len());
        progress.report(
            100,
            &format!("Census {} metadata loaded: {} variables", year, map.len()),
        );
        Ok(self.remember(year, map))
    }

    /// Categories of one variable.
    pub async fn get_categories(
        &self,
        schema: &CensusYearSchema,
        variable_code: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<VariableCategorySet, ResolveError> {
        let year = schema.year;
        if let Some(set) = self
            .bulk_map(year)
            .and_then(|map| map.get(variable_code).cloned())
        {
            return Ok(set);
        }

        let key = CacheKey::Categories(year, variable_code);
        if let Some(set) = get_typed::<VariableCategorySet>(self.cache.as_ref(), &key) {
            return Ok(set);
        }

        log::debug!("Fetching categories for {} with a live query", variable_code);
        progress.report(5, &format!("Fetching categories for {}...", variable_code));

        let max_attempts = self.retry.max_attempts;
        let set = retry_with_backoff(
            &self.retry,
            self.clock.as_ref(),
            || self.fetch_categories(schema, variable_code),
            |attempt, delay, error| {
                log::warn!(
                    "Category lookup for {} failed (attempt {}/{}): {}",
                    variable_code,
                    attempt + 1,
                    max_attempts,
                    error
                );
                progress.report(
                    5,
                    &format!(
                        "Retry {}/{} for {} in {}s...",
                        attempt + 1,
                        max_attempts,
                        variable_code,
                        delay.as_secs_f64()
                    ),
                );
            },
        )
        .await
        .map_err(|exhausted| ResolveError::Exhausted {
            variable: variable_code.to_string(),
            attempts: exhausted.attempts,
            last_error: exhausted.last_error,
        })?;

        put_typed(self.cache.as_ref(), &key, &set);
        Ok(set)
    }

    /// Resolve every variable, degrading failures to total-only sets.
    pub async fn resolve_all(
        &self,
        schema: &CensusYearSchema,
        variable_codes: &[String],
        progress: &dyn ProgressReporter,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        for (idx, code) in variable_codes.iter().enumerate() {
            match self.get_categories(schema, code, progress).await {
                Ok(set) => {
                    progress.report(
                        scaled(5, 5, idx, variable_codes.len()),
                        &format!("Variable {}: {} categories", code, set.categories().len()),
                    );
                    resolution.categories.insert(code.clone(), set);
                }
                Err(e) => {
                    log::warn!("Could not resolve categories for {}: {}", code, e);
                    resolution
                        .categories
                        .insert(code.clone(), VariableCategorySet::total_only(code.as_str()));
                    resolution.degraded.push((code.clone(), e));
                }
            }
        }
        resolution
    }

    /// Live lookup. Orders by the numeric value of the category code, so a
    /// non-numeric code makes the query fail (and count as a failed attempt).
    async fn fetch_categories(
        &self,
        schema: &CensusYearSchema,
        variable_code: &str,
    ) -> Result<VariableCategorySet, EngineError> {
        let table = string_literal(&schema.urls.metadata_table);
        let params = [SqlValue::from(variable_code)];

        let categories_sql = format!(
            "SELECT DISTINCT valor_categoria, etiqueta_categoria\nFROM {}\nWHERE codigo_variable = ?\n  AND valor_categoria IS NOT NULL\nORDER BY CAST(valor_categoria AS INTEGER)",
            table
        );
        let categories = self
            .executor
            .execute(&categories_sql, &params)
            .await
            .map_err(|e| with_operation(e, "fetching categories"))?;

        let nulls_sql = format!(
            "SELECT COUNT(*) AS null_count\nFROM {}\nWHERE codigo_variable = ?\n  AND valor_categoria IS NULL",
            table
        );
        let nulls = self
            .executor
            .execute(&nulls_sql, &params)
            .await
            .map_err(|e| with_operation(e, "counting null categories"))?;

        let mut set = VariableCategorySet::from_rows(
            variable_code,
            categories.rows.iter().map(|row| {
                (
                    row.first().and_then(|v| v.to_code_string()),
                    row.get(1)
                        .and_then(|v| v.to_code_string())
                        .unwrap_or_default(),
                )
            }),
        );
        let null_count = nulls
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        if null_count > 0.0 {
            set.mark_nulls();
        }
        Ok(set)
    }
}

/// Attach the operation name to a query failure that lacks one.
pub(crate) fn with_operation(error: EngineError, operation: &str) -> EngineError {
    match error {
        EngineError::Query { message, .. } => EngineError::query(operation, message),
        other => other,
    }
}
