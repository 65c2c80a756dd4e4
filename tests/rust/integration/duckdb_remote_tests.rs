//! Loads against the published census files. Needs network access for the
//! DuckDB extensions and the remote Parquet files:
//!
//! ```text
//! cargo test --features duckdb --test integration -- --ignored
//! ```

use std::sync::Arc;

use censo_layers::census_catalog::GeoLevel;
use censo_layers::config::LoaderConfig;
use censo_layers::engine::DuckDbConnection;
use censo_layers::loader::{CensusSession, LoadOutcome, LoadRequest};
use censo_layers::progress::NoProgress;

fn session() -> CensusSession {
    let connection = DuckDbConnection::open_in_memory(true).unwrap();
    CensusSession::new(Arc::new(connection), LoaderConfig::default())
}

#[tokio::test]
#[ignore]
async fn test_province_totals_match_category_sums() {
    let session = session();
    let variables = session.get_variables(None, Some("HOGAR"), &NoProgress).await.unwrap();
    let (code, _) = variables.first().cloned().unwrap();

    let request = LoadRequest::new(vec![code.clone()], GeoLevel::Prov);
    let layer = match session.load_census_layer(&request, &NoProgress).await.unwrap() {
        LoadOutcome::Loaded(layer) => layer,
        LoadOutcome::NoData(no_data) => panic!("{}", no_data.message),
    };
    assert_eq!(layer.feature_count(), 24);

    let total_field = format!("{}_total", code.to_lowercase());
    for idx in 0..layer.feature_count() {
        let total = layer
            .attribute(idx, &total_field)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let parts: f64 = layer.fields[1..]
            .iter()
            .filter(|f| f.name != total_field)
            .filter_map(|f| layer.attribute(idx, &f.name).and_then(|v| v.as_f64()))
            .sum();
        assert_eq!(parts, total, "feature {}", idx);
    }
}

#[tokio::test]
#[ignore]
async fn test_entity_types_and_province_codes() {
    let session = session();
    let entity_types = session.get_entity_types(None, &NoProgress).await.unwrap();
    assert_eq!(entity_types, vec!["HOGAR", "PERSONA", "VIVIENDA"]);

    let provinces = session
        .get_geographic_codes(None, GeoLevel::Prov, &NoProgress)
        .await
        .unwrap();
    assert!(provinces.iter().any(|(code, _)| code == "02"));
}
