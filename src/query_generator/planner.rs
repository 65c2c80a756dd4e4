//! Two-stage aggregation query.
//!
//! Joining geometry rows straight to fact rows and then aggregating counts a
//! geometry once per (variable x category) fact row, inflating sums whenever
//! more than one variable or category is selected. The plan avoids that:
//!
//! 1. **Staging** (`census_pivoted`): every base unit LEFT JOINed to its fact
//!    rows for the requested variables and grouped by the base-unit key, so
//!    there is exactly one staged row per base unit, including units with no
//!    facts.
//! 2. **Presentation**: staged rows join their geometry on the base-unit key.
//!    RADIO is 1:1. Coarser levels union the geometries and re-sum the staged
//!    columns, which is safe because each base unit contributes once.
//!
//! Geographic and spatial filters apply to the geometry side in the
//! presentation stage: they choose which base units contribute, never how
//! often a fact row is counted.

use crate::census_catalog::{CensusYearSchema, GeoLevel, BASE_UNIT_COLUMNS};
use crate::engine::SqlValue;

use super::common::{
    ensure_identifier, placeholders, qualified_column, quote_identifier, string_literal,
    FACT_ALIAS, GEOMETRY_ALIAS, STAGED_ALIAS, STAGED_CTE, STAGE_GEOMETRY_ALIAS,
};
use super::errors::QueryGeneratorError;
use super::geo_filter::GeoFilter;
use super::pivot::{PivotPlan, VARIABLE_COLUMN};

/// Fact table column holding the base unit identifier.
pub const FACT_GEO_ID_COLUMN: &str = "id_geo";
/// Output column holding the unit identifier.
pub const GEO_ID_OUTPUT: &str = "geo_id";
/// Output column holding the geometry as WKT.
pub const WKT_OUTPUT: &str = "wkt";

/// Everything the planner needs for one load request.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    pub schema: &'a CensusYearSchema,
    pub level: GeoLevel,
    pub variable_codes: &'a [String],
    pub pivot: &'a PivotPlan,
    pub geo_filter: &'a GeoFilter,
    pub spatial_filter: &'a str,
}

/// Final SQL with its positional parameters.
///
/// Result rows are `(geo_id, wkt, pivot columns...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CensusQuery {
    pub sql: String,
    /// Variable codes first (staging join), then geographic filter values.
    pub params: Vec<SqlValue>,
    pub column_names: Vec<String>,
}

pub fn build_census_query(input: &PlanInput<'_>) -> Result<CensusQuery, QueryGeneratorError> {
    if input.variable_codes.is_empty() || input.pivot.is_empty() {
        return Err(QueryGeneratorError::NoVariables);
    }
    let geo_id_column = ensure_identifier(&input.schema.geo_id_column)?;
    let urls = &input.schema.urls;
    let layout = input.level.layout();

    let stage_keys = key_list(STAGE_GEOMETRY_ALIAS, &BASE_UNIT_COLUMNS);

    let mut stage_select = stage_keys.clone();
    stage_select.extend(input.pivot.select_items());

    let staging = format!(
        "{cte} AS (\n    SELECT\n        {select}\n    FROM {geometry} {r}\n    LEFT JOIN {facts} {c}\n        ON {r_id} = {c_id} AND {c_var} IN ({vars})\n    GROUP BY {keys}\n)",
        cte = STAGED_CTE,
        select = stage_select.join(",\n        "),
        geometry = string_literal(&urls.geometry_table),
        facts = string_literal(&urls.fact_table),
        r = STAGE_GEOMETRY_ALIAS,
        c = FACT_ALIAS,
        r_id = qualified_column(STAGE_GEOMETRY_ALIAS, geo_id_column),
        c_id = qualified_column(FACT_ALIAS, FACT_GEO_ID_COLUMN),
        c_var = qualified_column(FACT_ALIAS, VARIABLE_COLUMN),
        vars = placeholders(input.variable_codes.len()),
        keys = stage_keys.join(", "),
    );

    let geometry_expr = if layout.dissolve {
        format!(
            "ST_AsText(ST_MemUnion_Agg({}))",
            qualified_column(GEOMETRY_ALIAS, "geometry")
        )
    } else {
        format!("ST_AsText({})", qualified_column(GEOMETRY_ALIAS, "geometry"))
    };

    let mut select = vec![
        format!(
            "{} AS {}",
            input.level.id_expression(GEOMETRY_ALIAS, geo_id_column),
            GEO_ID_OUTPUT
        ),
        format!("{} AS {}", geometry_expr, WKT_OUTPUT),
    ];
    for name in input.pivot.column_names() {
        let staged = qualified_column(STAGED_ALIAS, &quote_identifier(name));
        if layout.dissolve {
            select.push(format!("SUM({}) AS {}", staged, quote_identifier(name)));
        } else {
            select.push(staged);
        }
    }

    let join_on = BASE_UNIT_COLUMNS
        .iter()
        .map(|col| {
            format!(
                "{} = {}",
                qualified_column(GEOMETRY_ALIAS, col),
                qualified_column(STAGED_ALIAS, col)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");

    let filters: Vec<&str> = [input.geo_filter.predicate.as_str(), input.spatial_filter]
        .into_iter()
        .filter(|f| !f.is_empty())
        .collect();
    let where_clause = if filters.is_empty() {
        "1=1".to_string()
    } else {
        filters.join("\n    AND ")
    };

    let mut sql = format!(
        "WITH {staging}\nSELECT\n    {select}\nFROM {geometry} {g}\nJOIN {cte} {cp}\n    ON {join_on}\nWHERE {where_clause}",
        staging = staging,
        select = select.join(",\n    "),
        geometry = string_literal(&urls.geometry_table),
        g = GEOMETRY_ALIAS,
        cte = STAGED_CTE,
        cp = STAGED_ALIAS,
        join_on = join_on,
        where_clause = where_clause,
    );
    if layout.dissolve {
        sql.push_str("\nGROUP BY ");
        sql.push_str(&key_list(GEOMETRY_ALIAS, layout.group_columns).join(", "));
    }
    sql.push_str(&format!("\nORDER BY {}", GEO_ID_OUTPUT));

    let mut params: Vec<SqlValue> = input
        .variable_codes
        .iter()
        .map(|code| SqlValue::Text(code.clone()))
        .collect();
    params.extend(input.geo_filter.params.iter().cloned());

    Ok(CensusQuery {
        sql,
        params,
        column_names: input
            .pivot
            .column_names()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

fn key_list(alias: &str, columns: &[&str]) -> Vec<String> {
    columns
        .iter()
        .map(|col| qualified_column(alias, col))
        .collect()
}
