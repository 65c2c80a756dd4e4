use thiserror::Error;

use crate::category_resolver::ResolveError;
use crate::engine::EngineError;
use crate::query_generator::{Placeholder, QueryGeneratorError};

use super::materialize::MaterializeError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoaderError {
    #[error(transparent)]
    Query(#[from] QueryGeneratorError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("Error {operation}: {source}")]
    Operation {
        operation: String,
        #[source]
        source: EngineError,
    },

    #[error("Query still contains template placeholders to replace: {}", list_placeholders(.0))]
    UnresolvedPlaceholders(Vec<Placeholder>),
}

impl LoaderError {
    pub fn operation(operation: impl Into<String>, source: EngineError) -> Self {
        LoaderError::Operation {
            operation: operation.into(),
            source,
        }
    }
}

fn list_placeholders(placeholders: &[Placeholder]) -> String {
    placeholders
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
