//! Geographic unit filter
//!
//! Restricts the presentation stage to selected units. Filter codes come from
//! the caller and are bound as parameters, never spliced into the predicate.

use crate::census_catalog::GeoLevel;
use crate::engine::SqlValue;

use super::common::{placeholders, qualified_column, GEOMETRY_ALIAS};

/// Predicate fragment plus the values bound to its placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoFilter {
    /// Boolean expression over the geometry-side columns, or empty.
    pub predicate: String,
    pub params: Vec<SqlValue>,
    /// Composite codes ignored because of a wrong part count.
    pub dropped: Vec<String>,
}

impl GeoFilter {
    pub fn is_empty(&self) -> bool {
        self.predicate.is_empty()
    }
}

/// Build the filter for `codes` at `level`.
///
/// `geo_id_column` is the year-specific radio identifier column. Composite
/// codes ("PROV-DEPTO", "PROV-DEPTO-FRACC") with the wrong number of parts
/// are skipped and reported in [`GeoFilter::dropped`].
pub fn build_geo_filter(level: GeoLevel, codes: Option<&[String]>, geo_id_column: &str) -> GeoFilter {
    let codes = match codes {
        Some(codes) if !codes.is_empty() => codes,
        _ => return GeoFilter::default(),
    };

    match level {
        GeoLevel::Prov => in_list(&qualified_column(GEOMETRY_ALIAS, "PROV"), codes),
        GeoLevel::Radio => in_list(&qualified_column(GEOMETRY_ALIAS, geo_id_column), codes),
        GeoLevel::Depto | GeoLevel::Fracc => composite(level, codes),
    }
}

fn in_list(column: &str, codes: &[String]) -> GeoFilter {
    GeoFilter {
        predicate: format!("{} IN ({})", column, placeholders(codes.len())),
        params: codes.iter().map(|c| SqlValue::Text(c.clone())).collect(),
        dropped: Vec::new(),
    }
}

fn composite(level: GeoLevel, codes: &[String]) -> GeoFilter {
    let columns = level.layout().group_columns;
    let expected_parts = level.filter_code_parts();

    let equality = columns
        .iter()
        .map(|col| format!("{} = ?", qualified_column(GEOMETRY_ALIAS, col)))
        .collect::<Vec<_>>()
        .join(" AND ");

    let mut conditions = Vec::new();
    let mut filter = GeoFilter::default();

    for code in codes {
        let parts: Vec<&str> = code.split('-').collect();
        if parts.len() != expected_parts {
            log::warn!(
                "Ignoring {} filter code '{}': expected {} dash-separated parts, found {}",
                level,
                code,
                expected_parts,
                parts.len()
            );
            filter.dropped.push(code.clone());
            continue;
        }
        conditions.push(format!("({})", equality));
        filter
            .params
            .extend(parts.into_iter().map(|p| SqlValue::Text(p.to_string())));
    }

    if !conditions.is_empty() {
        filter.predicate = format!("({})", conditions.join(" OR "));
    }
    filter
}
