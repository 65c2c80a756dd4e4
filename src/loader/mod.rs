//! Census layer loading
//!
//! A [`CensusSession`] owns one engine handle plus the metadata cache and the
//! category resolver built on top of it. Loading a layer runs these steps:
//!
//! 1. prepare the engine handle (extensions load once per handle)
//! 2. preload the year's bulk category map, then resolve categories,
//!    degrading failed variables to total-only
//! 3. check the column budget, before the census query runs
//! 4. plan the two-stage query
//! 5. execute it; an empty result becomes [`LoadOutcome::NoData`]
//! 6. materialize rows into a [`CensusLayer`]
//!
//! Progress milestones: 2 connecting, 3 metadata, 5-10 resolving, 10-25 planning,
//! 30 executing, 60 rows returned, 70-95 materializing, 100 done.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, CacheStore, MemoryCache};
use crate::category_resolver::{CategoryResolver, Clock, RetryPolicy, TokioClock};
use crate::census_catalog::{CensusYear, CensusYearSchema, GeoLevel};
use crate::config::LoaderConfig;
use crate::engine::{render_query_for_log, QueryExecutor};
use crate::progress::{NoProgress, ProgressReporter};
use crate::query_generator::{
    build_census_query, build_geo_filter, build_pivot, build_spatial_filter, planned_column_count,
    BoundingBox, BudgetStatus, CategorySelection, CensusQuery, PlanInput,
};

mod custom_query;
mod errors;
pub mod layer;
pub mod materialize;
mod metadata;

pub use custom_query::CustomQueryOutcome;
pub use errors::LoaderError;
pub use layer::{CensusLayer, Feature, FeatureSink, FieldDef, FieldKind};
pub use materialize::MaterializeError;

/// What to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Census year; the session's default year when absent.
    pub year: Option<CensusYear>,
    pub variable_codes: Vec<String>,
    pub level: GeoLevel,
    /// Unit codes at `level` (`PROV`, `PROV-DEPTO`, `PROV-DEPTO-FRACC` or radio id).
    pub geo_filters: Option<Vec<String>>,
    pub bbox: Option<BoundingBox>,
    pub selected_categories: Option<CategorySelection>,
}

impl LoadRequest {
    pub fn new(variable_codes: Vec<String>, level: GeoLevel) -> Self {
        Self {
            year: None,
            variable_codes,
            level,
            geo_filters: None,
            bbox: None,
            selected_categories: None,
        }
    }

    pub fn with_year(mut self, year: CensusYear) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_geo_filters(mut self, codes: Vec<String>) -> Self {
        self.geo_filters = Some(codes);
        self
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_selected_categories(mut self, selection: CategorySelection) -> Self {
        self.selected_categories = Some(selection);
        self
    }
}

/// A planned, not yet executed, census query.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLoad {
    pub schema: CensusYearSchema,
    pub query: CensusQuery,
    /// Query text with parameters inlined, for display only.
    pub log_text: String,
    /// Variables whose categories could not be resolved.
    pub degraded: Vec<String>,
    /// Composite geographic codes ignored for a wrong part count.
    pub dropped_filters: Vec<String>,
}

impl PlannedLoad {
    pub fn column_count(&self) -> usize {
        self.query.column_names.len()
    }
}

/// Query ran but matched no units.
#[derive(Debug, Clone, PartialEq)]
pub struct NoData {
    pub message: String,
    pub bbox: Option<BoundingBox>,
    pub geo_filters: Option<Vec<String>>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(CensusLayer),
    NoData(NoData),
}

pub struct CensusSession {
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<dyn CacheStore>,
    resolver: CategoryResolver,
    config: LoaderConfig,
}

impl CensusSession {
    /// Session over `executor` with an in-memory cache and real-time retry waits.
    pub fn new(executor: Arc<dyn QueryExecutor>, config: LoaderConfig) -> Self {
        let cache = Arc::new(MemoryCache::new(CacheConfig {
            enabled: config.cache_enabled,
            max_entries: config.cache_max_entries,
        }));
        Self::with_parts(executor, cache, Arc::new(TokioClock), config)
    }

    pub fn with_parts(
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        config: LoaderConfig,
    ) -> Self {
        let retry = RetryPolicy::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        );
        let resolver = CategoryResolver::new(executor.clone(), cache.clone(), retry, clock);
        Self {
            executor,
            cache,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn resolver(&self) -> &CategoryResolver {
        &self.resolver
    }

    pub fn schema(&self, year: Option<CensusYear>) -> CensusYearSchema {
        year.unwrap_or(self.config.default_year)
            .schema(&self.config.base_url)
    }

    async fn prepare(&self) -> Result<(), LoaderError> {
        self.executor
            .prepare()
            .await
            .map_err(|e| LoaderError::operation("initializing the data engine", e))
    }

    /// Resolve categories, enforce the column budget and build the query.
    pub async fn plan_census_load(
        &self,
        request: &LoadRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<PlannedLoad, LoaderError> {
        let schema = self.schema(request.year);
        let codes = &request.variable_codes;
        let selection = request.selected_categories.as_ref();

        self.prepare().await?;
        progress.report(3, &format!("Loading census {} metadata...", schema.year));
        if let Err(e) = self
            .resolver
            .preload_all_metadata(&schema, &NoProgress)
            .await
        {
            log::warn!(
                "Bulk metadata preload failed, resolving variables one by one: {}",
                e
            );
        }

        progress.report(
            5,
            &format!("Fetching categories for {} variables...", codes.len()),
        );
        let resolution = self.resolver.resolve_all(&schema, codes, progress).await;
        let degraded: Vec<String> = resolution
            .degraded
            .iter()
            .map(|(code, _)| code.clone())
            .collect();

        let column_count = planned_column_count(codes, &resolution.categories, selection);
        log::info!("Loading {} columns", column_count);
        if let BudgetStatus::Warn { count, threshold } =
            self.config.column_budget().check(column_count)?
        {
            log::warn!(
                "Request produces {} columns (warning threshold {}); the layer may be slow to use",
                count,
                threshold
            );
        }
        progress.report(
            10,
            &format!(
                "Preparing query for level {} ({} columns)...",
                request.level, column_count
            ),
        );

        let pivot = build_pivot(codes, &resolution.categories, selection)?;
        let geo_filter = build_geo_filter(
            request.level,
            request.geo_filters.as_deref(),
            &schema.geo_id_column,
        );
        let spatial_filter = build_spatial_filter(request.bbox.as_ref())?;

        progress.report(20, "Building query...");
        let query = build_census_query(&PlanInput {
            schema: &schema,
            level: request.level,
            variable_codes: codes,
            pivot: &pivot,
            geo_filter: &geo_filter,
            spatial_filter: &spatial_filter,
        })?;

        let log_text = render_query_for_log(&query.sql, &query.params).unwrap_or_else(|e| {
            log::debug!("Could not inline query parameters for logging: {}", e);
            query.sql.clone()
        });
        log::debug!("Census query:\n{}", query.sql);
        log::debug!("Census query with parameters:\n{}", log_text);
        progress.report(25, "Query ready");

        Ok(PlannedLoad {
            schema,
            query,
            log_text,
            degraded,
            dropped_filters: geo_filter.dropped,
        })
    }

    /// Load census variables as a layer.
    pub async fn load_census_layer(
        &self,
        request: &LoadRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<LoadOutcome, LoaderError> {
        progress.report(2, "Initializing data engine connection...");
        self.prepare().await?;

        let planned = self.plan_census_load(request, progress).await?;

        progress.report(30, "Executing query...");
        let result = self
            .executor
            .execute(&planned.query.sql, &planned.query.params)
            .await
            .map_err(|e| LoaderError::operation("loading census layer", e))?;
        progress.report(60, &format!("Query returned {} rows...", result.rows.len()));

        if result.is_empty() {
            let no_data = no_data(request, planned.query.sql);
            log::warn!("{}", no_data.message);
            return Ok(LoadOutcome::NoData(no_data));
        }

        progress.report(70, "Creating layer...");
        let level = request.level;
        let name = layer::layer_name(planned.schema.year, &request.variable_codes, level);
        let mut layer = CensusLayer::new(name).with_query(planned.query.sql.as_str());
        let features = materialize::materialize_census_rows(
            &result,
            &planned.query.column_names,
            &mut layer,
            progress,
        )?;

        progress.report(100, "Layer loaded");
        log::info!(
            "Loaded {} features with {} variables ({} expanded columns)",
            features,
            request.variable_codes.len(),
            planned.column_count()
        );
        Ok(LoadOutcome::Loaded(layer))
    }

    /// Preload the year's metadata and the unit codes of `level` together.
    ///
    /// Both are independent reads. They overlap only when the session's
    /// engine handle allows concurrent queries; a single DuckDB handle runs
    /// them one after the other.
    pub async fn warm_up(
        &self,
        year: Option<CensusYear>,
        level: GeoLevel,
    ) -> Result<(usize, usize), LoaderError> {
        self.prepare().await?;
        let schema = self.schema(year);
        let (metadata, codes) = tokio::try_join!(
            async {
                self.resolver
                    .preload_all_metadata(&schema, &NoProgress)
                    .await
                    .map_err(LoaderError::from)
            },
            self.get_geographic_codes(Some(schema.year), level, &NoProgress),
        )?;
        Ok((metadata.len(), codes.len()))
    }
}

fn no_data(request: &LoadRequest, query: String) -> NoData {
    let mut message = String::from("No data returned for the selected filters.");
    if let Some(bbox) = &request.bbox {
        message.push_str(&format!(
            " Try zooming out or disabling the extent filter. Bbox used: {}",
            bbox
        ));
    }
    if let Some(filters) = request.geo_filters.as_ref().filter(|f| !f.is_empty()) {
        message.push_str(&format!(" Geographic filters: {}", filters.join(", ")));
    }
    NoData {
        message,
        bbox: request.bbox,
        geo_filters: request.geo_filters.clone(),
        query,
    }
}
