//! Category pivot
//!
//! Expands each selected variable into one conditional-sum column per
//! category, one for the NULL bucket when present, and a variable total that
//! ignores category (so it cross-checks the category columns).

use std::collections::{HashMap, HashSet};

use crate::census_catalog::{CategoryMap, VariableCategorySet};

use super::common::{ensure_variable_code, qualified_column, quote_identifier, string_literal, FACT_ALIAS};
use super::errors::QueryGeneratorError;
use super::sanitize::sanitize_label;

/// Fact table column holding the variable code.
pub const VARIABLE_COLUMN: &str = "codigo_variable";
/// Fact table column holding the category value.
pub const CATEGORY_COLUMN: &str = "valor_categoria";
/// Fact table column holding the count.
pub const COUNT_COLUMN: &str = "conteo";

/// Allowed category values per variable code.
pub type CategorySelection = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PivotColumnKind {
    Category { value: String },
    Null,
    Total,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotColumn {
    /// Output column name, `[a-z][a-z0-9_]*`.
    pub name: String,
    pub variable_code: String,
    pub kind: PivotColumnKind,
    /// Aggregate over the fact rows of the staging stage.
    pub expression: String,
}

/// Ordered output columns of one load request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PivotPlan {
    columns: Vec<PivotColumn>,
}

impl PivotPlan {
    pub fn columns(&self) -> &[PivotColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// `expr AS "name"` items for a SELECT list.
    pub fn select_items(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| format!("{} AS {}", c.expression, quote_identifier(&c.name)))
            .collect()
    }
}

/// Category set a variable pivots with: resolved set restricted to the
/// caller's selection. Unknown variables pivot total-only.
pub fn effective_categories(
    variable_code: &str,
    category_map: &CategoryMap,
    selected: Option<&CategorySelection>,
) -> VariableCategorySet {
    let Some(set) = category_map.get(variable_code) else {
        return VariableCategorySet::total_only(variable_code);
    };
    match selected.and_then(|s| s.get(variable_code)) {
        Some(allowed) if !allowed.is_empty() => set.filtered(allowed),
        _ => set.clone(),
    }
}

/// Number of columns [`build_pivot`] would emit for the same inputs.
pub fn planned_column_count(
    variable_codes: &[String],
    category_map: &CategoryMap,
    selected: Option<&CategorySelection>,
) -> usize {
    variable_codes
        .iter()
        .map(|code| effective_categories(code, category_map, selected).column_count())
        .sum()
}

/// Build the pivot columns for `variable_codes`, in input order.
pub fn build_pivot(
    variable_codes: &[String],
    category_map: &CategoryMap,
    selected: Option<&CategorySelection>,
) -> Result<PivotPlan, QueryGeneratorError> {
    let mut columns = Vec::new();
    let mut seen = HashSet::new();

    for code in variable_codes {
        ensure_variable_code(code)?;
        let set = effective_categories(code, category_map, selected);
        let prefix = code.to_lowercase();

        let mut push = |name: String, kind: PivotColumnKind, expression: String| {
            if !seen.insert(name.clone()) {
                return Err(QueryGeneratorError::DuplicateColumn {
                    column: name,
                    variable_code: code.clone(),
                });
            }
            columns.push(PivotColumn {
                name,
                variable_code: code.clone(),
                kind,
                expression,
            });
            Ok(())
        };

        if !set.is_total_only() {
            for category in set.categories() {
                push(
                    format!("{}_{}", prefix, sanitize_label(&category.label)),
                    PivotColumnKind::Category {
                        value: category.value.clone(),
                    },
                    conditional_sum(
                        code,
                        Some(format!(
                            "{} = {}",
                            qualified_column(FACT_ALIAS, CATEGORY_COLUMN),
                            string_literal(&category.value)
                        )),
                    ),
                )?;
            }
            if set.has_nulls() {
                push(
                    format!("{}_null", prefix),
                    PivotColumnKind::Null,
                    conditional_sum(
                        code,
                        Some(format!(
                            "{} IS NULL",
                            qualified_column(FACT_ALIAS, CATEGORY_COLUMN)
                        )),
                    ),
                )?;
            }
        }

        push(
            format!("{}_total", prefix),
            PivotColumnKind::Total,
            conditional_sum(code, None),
        )?;
    }

    Ok(PivotPlan { columns })
}

fn conditional_sum(variable_code: &str, condition: Option<String>) -> String {
    let mut predicate = format!(
        "{} = {}",
        qualified_column(FACT_ALIAS, VARIABLE_COLUMN),
        string_literal(variable_code)
    );
    if let Some(condition) = condition {
        predicate.push_str(" AND ");
        predicate.push_str(&condition);
    }
    format!(
        "SUM(CASE WHEN {} THEN {} ELSE 0 END)",
        predicate,
        qualified_column(FACT_ALIAS, COUNT_COLUMN)
    )
}
