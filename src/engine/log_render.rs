/// Readable query text for logs and query-log panes
///
/// Replaces positional `?` placeholders with escaped literals so a user can
/// copy the statement into another SQL client. The rendered text is for
/// display only; execution always goes through bound parameters.
use thiserror::Error;

use super::SqlValue;
use crate::query_generator::common::string_literal;

#[derive(Debug, Error, PartialEq)]
pub enum LogRenderError {
    #[error("Query has {placeholders} placeholders but {params} parameters were supplied")]
    ParameterCountMismatch { placeholders: usize, params: usize },

    #[error("Unsupported parameter type for value: {0}")]
    UnsupportedType(String),
}

/// Format a parameter value as a SQL literal
fn format_parameter(value: &SqlValue) -> Result<String, LogRenderError> {
    match value {
        SqlValue::Text(s) => Ok(string_literal(s)),
        SqlValue::Int(i) => Ok(i.to_string()),
        SqlValue::Float(f) if f.is_finite() => Ok(f.to_string()),
        SqlValue::Float(f) => Err(LogRenderError::UnsupportedType(format!(
            "Non-finite float: {}",
            f
        ))),
        SqlValue::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        SqlValue::Null => Ok("NULL".to_string()),
    }
}

/// Substitute `?` placeholders in order.
///
/// Question marks inside single-quoted string literals (remote URLs with query
/// strings, for instance) are not placeholders and are copied through.
pub fn render_query_for_log(sql: &str, params: &[SqlValue]) -> Result<String, LogRenderError> {
    let mut result = String::with_capacity(sql.len() * 2);
    let mut in_literal = false;
    let mut next_param = 0usize;
    let mut placeholders = 0usize;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                // A doubled quote toggles twice and stays inside the literal.
                in_literal = !in_literal;
                result.push(ch);
            }
            '?' if !in_literal => {
                placeholders += 1;
                if let Some(value) = params.get(next_param) {
                    result.push_str(&format_parameter(value)?);
                    next_param += 1;
                } else {
                    result.push('?');
                }
            }
            _ => result.push(ch),
        }
    }

    if placeholders != params.len() {
        return Err(LogRenderError::ParameterCountMismatch {
            placeholders,
            params: params.len(),
        });
    }

    Ok(result)
}
