//! Result rows to layer features.

use geo_types::Geometry;
use thiserror::Error;
use wkt::TryFromWkt;

use crate::engine::{QueryResult, SqlValue};
use crate::progress::{scaled, ProgressReporter};
use crate::query_generator::planner::{GEO_ID_OUTPUT, WKT_OUTPUT};

use super::layer::{Feature, FeatureSink, FieldDef, FieldKind};

const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MaterializeError {
    #[error("Invalid geometry for unit {geo_id}: {message}")]
    InvalidGeometry { geo_id: String, message: String },

    #[error("Result row {row} has {found} values, expected {expected}")]
    RowShape {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Non-numeric value '{value}' in column {column} for unit {geo_id}")]
    InvalidNumber {
        geo_id: String,
        column: String,
        value: String,
    },
}

fn parse_geometry(wkt: &str) -> Result<Geometry<f64>, String> {
    Geometry::<f64>::try_from_wkt_str(wkt).map_err(|e| e.to_string())
}

/// Materialize planner output rows `(geo_id, wkt, columns...)`.
///
/// Any row without a parseable geometry aborts the whole load. NULL counts
/// stay NULL; every other count becomes a float.
pub fn materialize_census_rows(
    result: &QueryResult,
    column_names: &[String],
    sink: &mut dyn FeatureSink,
    progress: &dyn ProgressReporter,
) -> Result<usize, MaterializeError> {
    let mut fields = vec![FieldDef::new(GEO_ID_OUTPUT, FieldKind::String)];
    fields.extend(
        column_names
            .iter()
            .map(|name| FieldDef::new(name.as_str(), FieldKind::Double)),
    );
    sink.set_fields(fields);

    let expected = column_names.len() + 2;
    let total = result.rows.len();
    progress.report(75, &format!("Processing {} features...", total));

    for (idx, row) in result.rows.iter().enumerate() {
        if row.len() != expected {
            return Err(MaterializeError::RowShape {
                row: idx,
                expected,
                found: row.len(),
            });
        }

        let geo_id = row[0].to_code_string().unwrap_or_default();
        let geometry = match &row[1] {
            SqlValue::Text(wkt) => parse_geometry(wkt),
            SqlValue::Null => Err("geometry is NULL".to_string()),
            other => Err(format!("expected WKT text, found {:?}", other)),
        }
        .map_err(|message| MaterializeError::InvalidGeometry {
            geo_id: geo_id.clone(),
            message,
        })?;

        let mut attributes = Vec::with_capacity(expected - 1);
        attributes.push(SqlValue::Text(geo_id.clone()));
        for (value, column) in row[2..].iter().zip(column_names) {
            attributes.push(count_value(value, &geo_id, column)?);
        }
        sink.add_feature(Feature {
            geometry,
            attributes,
        });

        if idx % PROGRESS_EVERY == 0 || idx + 1 == total {
            progress.report(
                scaled(75, 20, idx, total),
                &format!("Processing features: {}/{}", idx + 1, total),
            );
        }
    }

    Ok(total)
}

fn count_value(value: &SqlValue, geo_id: &str, column: &str) -> Result<SqlValue, MaterializeError> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    value
        .as_f64()
        .map(SqlValue::Float)
        .ok_or_else(|| MaterializeError::InvalidNumber {
            geo_id: geo_id.to_string(),
            column: column.to_string(),
            value: value.to_code_string().unwrap_or_default(),
        })
}

/// Materialize a user query result that has a `wkt` column.
///
/// Field types come from the first non-NULL value of each column. Rows whose
/// geometry is missing or unparseable are skipped. Returns the number of
/// features added.
pub fn materialize_query_rows(
    result: &QueryResult,
    sink: &mut dyn FeatureSink,
    progress: &dyn ProgressReporter,
) -> usize {
    let Some(wkt_idx) = result.column_index(WKT_OUTPUT) else {
        return 0;
    };
    let attribute_indices: Vec<usize> = (0..result.columns.len())
        .filter(|&idx| idx != wkt_idx)
        .collect();

    sink.set_fields(
        attribute_indices
            .iter()
            .map(|&idx| FieldDef::new(result.columns[idx].as_str(), infer_kind(result, idx)))
            .collect(),
    );

    let total = result.rows.len();
    progress.report(60, &format!("Adding {} features...", total));

    let mut added = 0;
    for (idx, row) in result.rows.iter().enumerate() {
        let geometry = match row.get(wkt_idx) {
            Some(SqlValue::Text(wkt)) => parse_geometry(wkt),
            _ => Err("no geometry".to_string()),
        };
        match geometry {
            Ok(geometry) => {
                sink.add_feature(Feature {
                    geometry,
                    attributes: attribute_indices
                        .iter()
                        .map(|&i| row.get(i).cloned().unwrap_or(SqlValue::Null))
                        .collect(),
                });
                added += 1;
            }
            Err(message) => log::debug!("Skipping result row {}: {}", idx, message),
        }

        if idx % PROGRESS_EVERY == 0 {
            progress.report(
                scaled(60, 35, idx, total),
                &format!("Processing features: {}/{}", idx + 1, total),
            );
        }
    }

    progress.report(100, "Done");
    log::info!("Custom SQL query produced a layer with {} features", added);
    added
}

fn infer_kind(result: &QueryResult, column: usize) -> FieldKind {
    let sample = result
        .rows
        .iter()
        .filter_map(|row| row.get(column))
        .find(|value| !value.is_null());
    match sample {
        Some(SqlValue::Int(_)) => FieldKind::Integer,
        Some(SqlValue::Float(_)) => FieldKind::Double,
        _ => FieldKind::String,
    }
}
