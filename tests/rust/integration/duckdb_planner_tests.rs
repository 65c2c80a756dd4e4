//! Planner output executed by an in-memory DuckDB over small local tables.
//!
//! No extensions are loaded: `ST_AsText` and `ST_MemUnion_Agg` are stood in
//! by macros over a text geometry column, and the Parquet locations are
//! swapped for local table names.

use censo_layers::census_catalog::{CategoryMap, CensusYear, GeoLevel, VariableCategorySet};
use censo_layers::engine::{DuckDbConnection, QueryExecutor, QueryResult};
use censo_layers::query_generator::common::string_literal;
use censo_layers::query_generator::{
    build_census_query, build_geo_filter, build_pivot, build_spatial_filter, PlanInput,
};

const RADIOS: &str = "
CREATE MACRO ST_AsText(g) AS g;
CREATE MACRO ST_MemUnion_Agg(g) AS min(g);
CREATE TABLE radios AS SELECT * FROM (VALUES
    ('02', '007', '01', '01', '020070101', 'POLY_A'),
    ('02', '007', '01', '02', '020070102', 'POLY_B'),
    ('06', '014', '01', '01', '060140101', 'POLY_C'),
    ('06', '014', '02', '01', '060140201', 'POLY_D'),
    ('06', '014', '02', '02', '060140202', 'POLY_E')
) t(PROV, DEPTO, FRACC, RADIO, COD_2022, geometry);
CREATE TABLE facts AS SELECT * FROM (VALUES
    ('020070101', 'A', '1', 5), ('020070101', 'A', '2', 5),
    ('020070102', 'A', '1', 3), ('020070102', 'A', '2', 2),
    ('060140101', 'A', '1', 4), ('060140101', 'A', '2', 6),
    ('060140201', 'A', '1', 1), ('060140201', 'A', '2', 4)
) t(id_geo, codigo_variable, valor_categoria, conteo);
";

/// Session with variable B spread over `b_categories` categories, one count
/// each, on every radio that has facts.
async fn connection(b_categories: usize) -> DuckDbConnection {
    let conn = DuckDbConnection::open_in_memory(false).unwrap();
    conn.execute_batch(RADIOS).await.unwrap();
    conn.execute_batch(&format!(
        "INSERT INTO facts
         SELECT r.COD_2022, 'B', CAST(i AS VARCHAR), 1
         FROM radios r, generate_series(1, {}) s(i)
         WHERE r.COD_2022 <> '060140202';",
        b_categories
    ))
    .await
    .unwrap();
    conn
}

fn category_map(b_categories: usize) -> CategoryMap {
    let mut a = VariableCategorySet::new("A");
    a.push_category("1", "Si");
    a.push_category("2", "No");
    let mut b = VariableCategorySet::new("B");
    for i in 1..=b_categories {
        b.push_category(i.to_string(), format!("Clase {}", i));
    }
    [a, b]
        .into_iter()
        .map(|s| (s.variable_code.clone(), s))
        .collect()
}

async fn run(b_categories: usize, level: GeoLevel, geo_codes: Option<&[&str]>) -> QueryResult {
    let schema = CensusYear::Y2022.schema("mem");
    let codes = vec!["A".to_string(), "B".to_string()];
    let pivot = build_pivot(&codes, &category_map(b_categories), None).unwrap();
    let geo_codes: Option<Vec<String>> =
        geo_codes.map(|c| c.iter().map(|s| s.to_string()).collect());
    let geo_filter = build_geo_filter(level, geo_codes.as_deref(), &schema.geo_id_column);
    let spatial = build_spatial_filter(None).unwrap();
    let query = build_census_query(&PlanInput {
        schema: &schema,
        level,
        variable_codes: &codes,
        pivot: &pivot,
        geo_filter: &geo_filter,
        spatial_filter: &spatial,
    })
    .unwrap();

    let sql = query
        .sql
        .replace(&string_literal(&schema.urls.geometry_table), "radios")
        .replace(&string_literal(&schema.urls.fact_table), "facts");
    connection(b_categories)
        .await
        .execute(&sql, &query.params)
        .await
        .unwrap()
}

fn column(result: &QueryResult, name: &str) -> Vec<(String, f64)> {
    let id = result.column_index("geo_id").unwrap();
    let idx = result.column_index(name).unwrap();
    result
        .rows
        .iter()
        .map(|row| {
            (
                row[id].to_code_string().unwrap(),
                row[idx].as_f64().unwrap_or(f64::NAN),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_province_totals_independent_of_other_variable_categories() {
    let with_three = run(3, GeoLevel::Prov, None).await;
    let with_six = run(6, GeoLevel::Prov, None).await;

    let expected = vec![("02".to_string(), 15.0), ("06".to_string(), 15.0)];
    assert_eq!(column(&with_three, "a_total"), expected);
    assert_eq!(column(&with_six, "a_total"), expected);
    assert_eq!(column(&with_three, "a_si"), column(&with_six, "a_si"));

    assert_eq!(
        column(&with_six, "b_total"),
        vec![("02".to_string(), 12.0), ("06".to_string(), 12.0)]
    );
    assert_eq!(column(&with_six, "b_clase_6"), vec![("02".to_string(), 2.0), ("06".to_string(), 2.0)]);
}

#[tokio::test]
async fn test_dissolved_department_matches_sum_of_radios() {
    let depto = run(4, GeoLevel::Depto, None).await;
    assert_eq!(
        column(&depto, "a_total"),
        vec![("02-007".to_string(), 15.0), ("06-014".to_string(), 15.0)]
    );

    let radios = run(4, GeoLevel::Radio, None).await;
    let per_radio = column(&radios, "a_total");
    assert_eq!(per_radio.len(), 5);
    let comuna: f64 = per_radio
        .iter()
        .filter(|(id, _)| id.starts_with("02007"))
        .map(|(_, v)| v)
        .sum();
    assert_eq!(comuna, 15.0);
    // A radio without facts is kept with zero counts.
    assert_eq!(per_radio.last(), Some(&("060140202".to_string(), 0.0)));
}

#[tokio::test]
async fn test_radio_filter_round_trip() {
    let present = run(3, GeoLevel::Radio, Some(&["020070101"])).await;
    assert_eq!(column(&present, "a_total"), vec![("020070101".to_string(), 10.0)]);
    let wkt = present.column_index("wkt").unwrap();
    assert_eq!(present.rows[0][wkt].to_code_string().as_deref(), Some("POLY_A"));

    let absent = run(3, GeoLevel::Radio, Some(&["999999999"])).await;
    assert!(absent.is_empty());
}
