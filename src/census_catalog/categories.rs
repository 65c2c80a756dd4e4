//! Category breakdowns of census variables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One category of a variable: the raw stored code and its human label.
///
/// Values are kept as text. Some are numeric-looking ("1", "02") and some are
/// place names, so they are never cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub value: String,
    pub label: String,
}

impl Category {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// All categories of one variable, in source order and unique by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableCategorySet {
    pub variable_code: String,
    categories: Vec<Category>,
    has_nulls: bool,
}

/// Category sets keyed by variable code.
pub type CategoryMap = HashMap<String, VariableCategorySet>;

impl VariableCategorySet {
    pub fn new(variable_code: impl Into<String>) -> Self {
        Self {
            variable_code: variable_code.into(),
            categories: Vec::new(),
            has_nulls: false,
        }
    }

    /// Set used when a variable's categories could not be resolved: it
    /// pivots to a single total column.
    pub fn total_only(variable_code: impl Into<String>) -> Self {
        Self::new(variable_code)
    }

    /// Build from raw `(value, label)` rows; a `None` value marks the NULL bucket.
    pub fn from_rows<I>(variable_code: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = (Option<String>, String)>,
    {
        let mut set = Self::new(variable_code);
        for (value, label) in rows {
            match value {
                Some(value) => set.push_category(value, label),
                None => set.mark_nulls(),
            }
        }
        set
    }

    /// Append a category unless one with the same value is already present.
    pub fn push_category(&mut self, value: impl Into<String>, label: impl Into<String>) {
        let value = value.into();
        if self.categories.iter().any(|c| c.value == value) {
            return;
        }
        self.categories.push(Category::new(value, label));
    }

    pub fn mark_nulls(&mut self) {
        self.has_nulls = true;
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn has_nulls(&self) -> bool {
        self.has_nulls
    }

    pub fn is_total_only(&self) -> bool {
        self.categories.is_empty() && !self.has_nulls
    }

    /// Copy restricted to the allowed category values, keeping source order.
    ///
    /// An empty allow-list means "no restriction".
    pub fn filtered(&self, allowed: &[String]) -> Self {
        if allowed.is_empty() {
            return self.clone();
        }
        Self {
            variable_code: self.variable_code.clone(),
            categories: self
                .categories
                .iter()
                .filter(|c| allowed.contains(&c.value))
                .cloned()
                .collect(),
            has_nulls: self.has_nulls,
        }
    }

    /// Number of pivot columns this set produces.
    pub fn column_count(&self) -> usize {
        if self.is_total_only() {
            1
        } else {
            self.categories.len() + usize::from(self.has_nulls) + 1
        }
    }
}
