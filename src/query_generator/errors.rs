use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryGeneratorError {
    #[error("No census variables selected (select at least one variable code)")]
    NoVariables,
    #[error("Invalid variable code '{0}' (allowed: ASCII letters, digits and underscore)")]
    InvalidVariableCode(String),
    #[error("Invalid column identifier '{0}' (allowed: ASCII letters, digits and underscore)")]
    InvalidIdentifier(String),
    /// A generated column name is already taken. Besides two labels of one
    /// variable sanitizing alike, this covers a label sanitizing to `total`
    /// or `null` (clashing with the variable's own `_total`/`_null` column)
    /// and names shared across variables, e.g. label "B total" of `A` against
    /// the total of `A_B`. `variable_code` is the variable whose column came
    /// second.
    #[error("Duplicate output column '{column}' for variable {variable_code} (a category label sanitizes to a name already in use)")]
    DuplicateColumn {
        column: String,
        variable_code: String,
    },
    #[error("Too many columns: the request would produce {attempted} columns, limit is {limit} (must stay below it; select fewer variables or categories)")]
    ColumnBudgetExceeded { attempted: usize, limit: usize },
    #[error("Invalid bounding box ({xmin}, {ymin}, {xmax}, {ymax}): coordinates must be finite with min <= max")]
    InvalidBoundingBox {
        xmin: f64,
        ymin: f64,
        xmax: f64,
        ymax: f64,
    },
}
