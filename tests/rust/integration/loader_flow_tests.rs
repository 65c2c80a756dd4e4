//! Census loads through `CensusSession` with a scripted engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use censo_layers::cache::MemoryCache;
use censo_layers::category_resolver::{Clock, ResolveError};
use censo_layers::census_catalog::{CensusYear, GeoLevel};
use censo_layers::config::LoaderConfig;
use censo_layers::engine::{
    result_of, EngineError, QueryExecutor, QueryResult, ScriptedExecutor, SqlValue,
};
use censo_layers::loader::{
    CensusSession, FieldKind, LoadOutcome, LoadRequest, LoaderError, MaterializeError,
};
use censo_layers::progress::NoProgress;
use censo_layers::query_generator::{BoundingBox, CategorySelection, QueryGeneratorError};

const METADATA_QUERY: &str = "ORDER BY codigo_variable, valor_categoria";
const GEO_CODES_QUERY: &str = "AS label";
const LIVE_CATEGORIES_QUERY: &str = "SELECT DISTINCT valor_categoria";
const CENSUS_QUERY: &str = "census_pivoted";
const SQUARE: &str = "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))";

/// Records waits instead of sleeping.
#[derive(Default)]
struct InstantClock {
    sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

fn text(value: &str) -> SqlValue {
    SqlValue::from(value)
}

fn codes(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Metadata rows for PERSONA_P09 (two categories plus NULL) and HOGAR_H05.
fn metadata() -> QueryResult {
    result_of(
        &["codigo_variable", "valor_categoria", "etiqueta_categoria"],
        vec![
            vec![text("HOGAR_H05"), text("1"), text("Sí")],
            vec![text("HOGAR_H05"), text("2"), text("No")],
            vec![text("PERSONA_P09"), text("1"), text("Sin instrucción")],
            vec![text("PERSONA_P09"), text("2"), text("Primario")],
            vec![text("PERSONA_P09"), SqlValue::Null, SqlValue::Null],
        ],
    )
}

fn geo_codes() -> QueryResult {
    result_of(
        &["code", "label"],
        vec![
            vec![text("02-007"), text("Ciudad Autónoma de Buenos Aires - Comuna 7")],
            vec![text("06-014"), text("Buenos Aires - Adolfo Alsina")],
        ],
    )
}

fn census_row(geo_id: &str, wkt: SqlValue, counts: &[i64]) -> Vec<SqlValue> {
    let mut row = vec![text(geo_id), wkt];
    row.extend(counts.iter().map(|&c| SqlValue::Int(c)));
    row
}

fn session_with(
    executor: Arc<ScriptedExecutor>,
    clock: Arc<InstantClock>,
    config: LoaderConfig,
) -> CensusSession {
    CensusSession::with_parts(
        executor,
        Arc::new(MemoryCache::with_defaults()),
        clock,
        LoaderConfig {
            base_url: "https://example.org/censo".to_string(),
            ..config
        },
    )
}

fn session(executor: Arc<ScriptedExecutor>) -> CensusSession {
    session_with(executor, Arc::default(), LoaderConfig::default())
}

#[tokio::test]
async fn test_dissolved_load_from_preloaded_metadata() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(METADATA_QUERY, metadata())
            .respond(GEO_CODES_QUERY, geo_codes())
            .respond(
                CENSUS_QUERY,
                result_of(
                    &[
                        "geo_id",
                        "wkt",
                        "persona_p09_sin_instruccion",
                        "persona_p09_primario",
                        "persona_p09_null",
                        "persona_p09_total",
                        "hogar_h05_si",
                        "hogar_h05_no",
                        "hogar_h05_total",
                    ],
                    vec![
                        census_row("02-007", text(SQUARE), &[10, 20, 3, 33, 7, 4, 11]),
                        census_row("06-014", text(SQUARE), &[0, 5, 0, 5, 2, 1, 3]),
                    ],
                ),
            ),
    );
    let session = session(executor.clone());

    assert_eq!(session.warm_up(None, GeoLevel::Depto).await.unwrap(), (2, 2));

    let request = LoadRequest::new(codes(&["PERSONA_P09", "HOGAR_H05"]), GeoLevel::Depto)
        .with_geo_filters(codes(&["02-007", "06-014"]));
    let seen = Mutex::new(Vec::new());
    let reporter = |percent: u8, _: &str| seen.lock().unwrap().push(percent);

    let layer = match session.load_census_layer(&request, &reporter).await.unwrap() {
        LoadOutcome::Loaded(layer) => layer,
        other => panic!("expected a layer, got {:?}", other),
    };

    assert_eq!(layer.name, "Censo 2022 - 2 variables (DEPTO)");
    assert_eq!(layer.feature_count(), 2);
    assert_eq!(layer.fields.len(), 1 + 7);
    assert_eq!(layer.fields[0].kind, FieldKind::String);
    assert_eq!(layer.attribute(0, "geo_id"), Some(&text("02-007")));
    assert_eq!(layer.attribute(0, "persona_p09_total"), Some(&SqlValue::Float(33.0)));
    assert_eq!(layer.attribute(1, "hogar_h05_no"), Some(&SqlValue::Float(1.0)));
    assert!(layer.query.as_deref().unwrap().contains("WITH census_pivoted"));

    // Categories came from the preloaded map, not from live lookups.
    assert!(executor.executed_matching(LIVE_CATEGORIES_QUERY).is_empty());
    assert_eq!(executor.executed_matching(METADATA_QUERY).len(), 1);

    let census = executor.executed_matching(CENSUS_QUERY);
    assert_eq!(census.len(), 1);
    assert_eq!(
        census[0].params,
        vec![
            text("PERSONA_P09"),
            text("HOGAR_H05"),
            text("02"),
            text("007"),
            text("06"),
            text("014"),
        ]
    );

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.first(), Some(&2));
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
}

#[tokio::test]
async fn test_fact_rows_never_reach_the_presentation_stage() {
    let executor = Arc::new(ScriptedExecutor::new().respond(METADATA_QUERY, metadata()));
    let session = session(executor);
    session
        .resolver()
        .preload_all_metadata(&session.schema(None), &NoProgress)
        .await
        .unwrap();

    for level in [GeoLevel::Radio, GeoLevel::Fracc, GeoLevel::Depto, GeoLevel::Prov] {
        let request = LoadRequest::new(codes(&["PERSONA_P09"]), level)
            .with_bbox(BoundingBox::new(-60.0, -35.0, -57.0, -33.0).unwrap());
        let planned = session.plan_census_load(&request, &NoProgress).await.unwrap();
        let (staging, presentation) = planned
            .query
            .sql
            .split_once("\n)\nSELECT")
            .expect("staging CTE");

        assert!(staging.contains("census-data.parquet"));
        assert!(!presentation.contains("census-data.parquet"), "{}", level);
        assert!(presentation.contains("ST_Intersects(g.geometry"), "{}", level);
        assert!(!planned.log_text.contains('?'));
        assert_eq!(planned.column_count(), 4);
    }
}

#[tokio::test]
async fn test_empty_result_reports_filters() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(METADATA_QUERY, metadata())
            .respond(CENSUS_QUERY, QueryResult::default()),
    );
    let session = session(executor);
    session
        .resolver()
        .preload_all_metadata(&session.schema(None), &NoProgress)
        .await
        .unwrap();

    let bbox = BoundingBox::new(-58.5, -34.7, -58.3, -34.5).unwrap();
    let request = LoadRequest::new(codes(&["HOGAR_H05"]), GeoLevel::Radio)
        .with_geo_filters(codes(&["020070101"]))
        .with_bbox(bbox);

    match session.load_census_layer(&request, &NoProgress).await.unwrap() {
        LoadOutcome::NoData(no_data) => {
            assert!(no_data.message.contains("(-58.5, -34.7, -58.3, -34.5)"));
            assert!(no_data.message.contains("Geographic filters: 020070101"));
            assert_eq!(no_data.bbox, Some(bbox));
            assert!(no_data.query.contains("WHERE g.COD_2022 IN (?)"));
        }
        other => panic!("expected no data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unresolvable_variable_degrades_to_total() {
    let clock = Arc::new(InstantClock::default());
    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(METADATA_QUERY, metadata())
            .fail(LIVE_CATEGORIES_QUERY, "HTTP 503"),
    );
    let session = session_with(executor.clone(), clock.clone(), LoaderConfig::default());
    session
        .resolver()
        .preload_all_metadata(&session.schema(None), &NoProgress)
        .await
        .unwrap();

    let request = LoadRequest::new(codes(&["HOGAR_H05", "VIVIENDA_V99"]), GeoLevel::Prov);
    let planned = session.plan_census_load(&request, &NoProgress).await.unwrap();

    assert_eq!(planned.degraded, vec!["VIVIENDA_V99".to_string()]);
    assert_eq!(
        planned.query.column_names,
        vec!["hogar_h05_si", "hogar_h05_no", "hogar_h05_total", "vivienda_v99_total"]
    );
    assert_eq!(executor.executed_matching(LIVE_CATEGORIES_QUERY).len(), 3);
    assert_eq!(
        *clock.sleeps.lock().unwrap(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );

    let resolution = session
        .resolver()
        .resolve_all(&session.schema(None), &codes(&["VIVIENDA_V99"]), &NoProgress)
        .await;
    match &resolution.degraded[..] {
        [(code, ResolveError::Exhausted { attempts, last_error, .. })] => {
            assert_eq!(code, "VIVIENDA_V99");
            assert_eq!(*attempts, 3);
            assert!(matches!(last_error, EngineError::Query { .. }));
        }
        other => panic!("unexpected degradation: {:?}", other),
    }
}

#[tokio::test]
async fn test_column_budget_rejects_before_census_query() {
    let executor = Arc::new(ScriptedExecutor::new().respond(METADATA_QUERY, metadata()));
    let config = LoaderConfig {
        column_warn_threshold: Some(2),
        column_reject_threshold: Some(4),
        ..LoaderConfig::default()
    };
    let session = session_with(executor.clone(), Arc::default(), config);
    session
        .resolver()
        .preload_all_metadata(&session.schema(None), &NoProgress)
        .await
        .unwrap();

    let request = LoadRequest::new(codes(&["PERSONA_P09"]), GeoLevel::Depto);
    let err = session
        .load_census_layer(&request, &NoProgress)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LoaderError::Query(QueryGeneratorError::ColumnBudgetExceeded {
            attempted: 4,
            limit: 4
        })
    );
    assert!(executor.executed_matching(CENSUS_QUERY).is_empty());

    // Narrowing the categories brings the request back under the limit.
    let mut selection = CategorySelection::new();
    selection.insert("PERSONA_P09".to_string(), vec!["1".to_string()]);
    let planned = session
        .plan_census_load(&request.clone().with_selected_categories(selection), &NoProgress)
        .await
        .unwrap();
    assert_eq!(planned.column_count(), 3);
}

#[tokio::test]
async fn test_unparseable_geometry_aborts_load() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(METADATA_QUERY, metadata())
            .respond(
                CENSUS_QUERY,
                result_of(
                    &["geo_id", "wkt", "hogar_h05_si", "hogar_h05_no", "hogar_h05_total"],
                    vec![
                        census_row("02", text(SQUARE), &[1, 2, 3]),
                        census_row("06", text("MULTIPOLYGON(((0 0"), &[1, 2, 3]),
                    ],
                ),
            ),
    );
    let session = session(executor);
    session
        .resolver()
        .preload_all_metadata(&session.schema(None), &NoProgress)
        .await
        .unwrap();

    let request = LoadRequest::new(codes(&["HOGAR_H05"]), GeoLevel::Prov);
    let err = session
        .load_census_layer(&request, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        LoaderError::Materialize(MaterializeError::InvalidGeometry { geo_id, .. }) if geo_id == "06"
    ));
}

#[tokio::test]
async fn test_engine_failure_names_the_operation() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(METADATA_QUERY, metadata())
            .fail(CENSUS_QUERY, "IO Error: connection reset"),
    );
    let session = session(executor);
    session
        .resolver()
        .preload_all_metadata(&session.schema(None), &NoProgress)
        .await
        .unwrap();

    let request = LoadRequest::new(codes(&["HOGAR_H05"]), GeoLevel::Radio);
    let err = session
        .load_census_layer(&request, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(&err, LoaderError::Operation { operation, .. } if operation == "loading census layer"));
    assert!(err.to_string().contains("connection reset"));
}

#[tokio::test]
async fn test_malformed_filter_codes_are_dropped() {
    let executor = Arc::new(ScriptedExecutor::new().respond(METADATA_QUERY, metadata()));
    let session = session(executor.clone());
    session
        .resolver()
        .preload_all_metadata(&session.schema(None), &NoProgress)
        .await
        .unwrap();

    let request = LoadRequest::new(codes(&["HOGAR_H05"]), GeoLevel::Fracc)
        .with_geo_filters(codes(&["02-007", "02-007-01"]));
    let planned = session.plan_census_load(&request, &NoProgress).await.unwrap();

    assert_eq!(planned.dropped_filters, vec!["02-007".to_string()]);
    assert_eq!(planned.query.params.len(), 1 + 3);
    assert!(planned
        .query
        .sql
        .contains("WHERE ((g.PROV = ? AND g.DEPTO = ? AND g.FRACC = ?))"));
    assert!(executor.executed_matching(LIVE_CATEGORIES_QUERY).is_empty());
}

#[tokio::test]
async fn test_single_variable_layer_name_uses_year() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(METADATA_QUERY, metadata())
            .respond(
                CENSUS_QUERY,
                result_of(
                    &["geo_id", "wkt", "hogar_h05_si", "hogar_h05_no", "hogar_h05_total"],
                    vec![census_row("020070101", text(SQUARE), &[1, 1, 2])],
                ),
            ),
    );
    let session = session(executor.clone());
    let schema = CensusYear::Y2010.schema("https://example.org/censo");
    session
        .resolver()
        .preload_all_metadata(&schema, &NoProgress)
        .await
        .unwrap();

    let request = LoadRequest::new(codes(&["HOGAR_H05"]), GeoLevel::Radio)
        .with_year(CensusYear::Y2010);
    match session.load_census_layer(&request, &NoProgress).await.unwrap() {
        LoadOutcome::Loaded(layer) => assert_eq!(layer.name, "Censo 2010 - HOGAR_H05 (RADIO)"),
        other => panic!("expected a layer, got {:?}", other),
    }
    let census = executor.executed_matching(CENSUS_QUERY);
    assert!(census[0].sql.contains("ON r.COD_2010 = c.id_geo"));
}

#[tokio::test]
async fn test_text_valued_categories_resolved_from_bulk_map() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(
                METADATA_QUERY,
                result_of(
                    &["codigo_variable", "valor_categoria", "etiqueta_categoria"],
                    vec![
                        vec![text("DEPTO_NOMBRE"), text("12 de Octubre"), text("12 de Octubre")],
                        vec![text("DEPTO_NOMBRE"), text("Adolfo Alsina"), text("Adolfo Alsina")],
                    ],
                ),
            )
            .fail(
                LIVE_CATEGORIES_QUERY,
                "Conversion Error: Could not convert string '12 de Octubre' to INT32",
            ),
    );
    let session = session(executor.clone());

    // No warm-up: planning fills the bulk map itself.
    let request = LoadRequest::new(codes(&["DEPTO_NOMBRE"]), GeoLevel::Prov);
    let planned = session.plan_census_load(&request, &NoProgress).await.unwrap();

    assert!(planned.degraded.is_empty());
    assert_eq!(
        planned.query.column_names,
        vec![
            "depto_nombre_cat_12_de_octubre",
            "depto_nombre_adolfo_alsina",
            "depto_nombre_total",
        ]
    );
    assert_eq!(executor.executed_matching(METADATA_QUERY).len(), 1);
    assert!(executor.executed_matching(LIVE_CATEGORIES_QUERY).is_empty());

    // The bulk map is held for the session.
    session.plan_census_load(&request, &NoProgress).await.unwrap();
    assert_eq!(executor.executed_matching(METADATA_QUERY).len(), 1);
}

#[tokio::test]
async fn test_failed_bulk_preload_falls_back_to_live_lookup() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .fail(METADATA_QUERY, "HTTP 503")
            .respond(
                LIVE_CATEGORIES_QUERY,
                result_of(
                    &["valor_categoria", "etiqueta_categoria"],
                    vec![vec![text("1"), text("Sí")], vec![text("2"), text("No")]],
                ),
            )
            .respond("null_count", result_of(&["null_count"], vec![vec![SqlValue::Int(0)]])),
    );
    let session = session(executor.clone());

    let request = LoadRequest::new(codes(&["HOGAR_H05"]), GeoLevel::Prov);
    let planned = session.plan_census_load(&request, &NoProgress).await.unwrap();

    assert!(planned.degraded.is_empty());
    assert_eq!(
        planned.query.column_names,
        vec!["hogar_h05_si", "hogar_h05_no", "hogar_h05_total"]
    );
    assert_eq!(executor.executed_matching(LIVE_CATEGORIES_QUERY).len(), 1);
}

/// Counts `prepare` calls on top of a scripted executor.
struct PrepareCounter {
    inner: ScriptedExecutor,
    prepares: AtomicUsize,
}

#[async_trait]
impl QueryExecutor for PrepareCounter {
    async fn prepare(&self) -> Result<(), EngineError> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, EngineError> {
        self.inner.execute(sql, params).await
    }
}

#[tokio::test]
async fn test_planning_prepares_the_engine() {
    let executor = Arc::new(PrepareCounter {
        inner: ScriptedExecutor::new().respond(METADATA_QUERY, metadata()),
        prepares: AtomicUsize::new(0),
    });
    let session = CensusSession::with_parts(
        executor.clone(),
        Arc::new(MemoryCache::with_defaults()),
        Arc::new(InstantClock::default()),
        LoaderConfig::default(),
    );

    let request = LoadRequest::new(codes(&["HOGAR_H05"]), GeoLevel::Depto);
    session.plan_census_load(&request, &NoProgress).await.unwrap();
    assert!(executor.prepares.load(Ordering::SeqCst) >= 1);
}
