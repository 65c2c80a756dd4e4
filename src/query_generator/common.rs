//! Common SQL text helpers for query generation
//!
//! Structural SQL (table locations, column lists) cannot be bound as
//! parameters, so it is assembled as text. Only internally derived values may
//! pass through here: sanitized labels, validated variable codes, configured
//! URLs and category codes read from the metadata table. Values supplied by a
//! caller are always bound with `?`.

use lazy_static::lazy_static;
use regex::Regex;

use super::errors::QueryGeneratorError;

lazy_static! {
    static ref PLAIN_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref VARIABLE_CODE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
}

/// Table alias of the base geometry rows in the staging stage.
pub const STAGE_GEOMETRY_ALIAS: &str = "r";
/// Table alias of the fact rows in the staging stage.
pub const FACT_ALIAS: &str = "c";
/// Table alias of the geometry rows in the presentation stage.
pub const GEOMETRY_ALIAS: &str = "g";
/// Table alias of the staged (pre-aggregated) rows in the presentation stage.
pub const STAGED_ALIAS: &str = "cp";
/// Name of the staging CTE.
pub const STAGED_CTE: &str = "census_pivoted";

/// Quote a text value as a SQL string literal, doubling embedded quotes.
///
/// # Examples
/// ```
/// use censo_layers::query_generator::common::string_literal;
/// assert_eq!(string_literal("PERSONA_P11"), "'PERSONA_P11'");
/// assert_eq!(string_literal("12 de Octubre"), "'12 de Octubre'");
/// assert_eq!(string_literal("O'Higgins"), "'O''Higgins'");
/// ```
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an output column name.
///
/// Output names are always double quoted so that lowercase names stay
/// lowercase in engines that fold unquoted identifiers.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Format a qualified column reference: table_alias.column_name
///
/// # Examples
/// ```
/// use censo_layers::query_generator::common::qualified_column;
/// assert_eq!(qualified_column("g", "PROV"), "g.PROV");
/// ```
pub fn qualified_column(table_alias: &str, column_name: &str) -> String {
    format!("{}.{}", table_alias, column_name)
}

/// Reject anything but a plain identifier for structural column names
/// (for instance the per-year geo id column).
pub fn ensure_identifier(name: &str) -> Result<&str, QueryGeneratorError> {
    if PLAIN_IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(QueryGeneratorError::InvalidIdentifier(name.to_string()))
    }
}

/// Variable codes end up in column names and pivot predicates.
pub fn ensure_variable_code(code: &str) -> Result<&str, QueryGeneratorError> {
    if VARIABLE_CODE.is_match(code) {
        Ok(code)
    } else {
        Err(QueryGeneratorError::InvalidVariableCode(code.to_string()))
    }
}

/// `?, ?, ?` for `count` placeholders.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
