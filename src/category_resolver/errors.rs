use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("Failed to fetch categories for {variable} after {attempts} attempts: {last_error}")]
    Exhausted {
        variable: String,
        attempts: u32,
        last_error: EngineError,
    },

    #[error("Failed to load census metadata: {0}")]
    Engine(#[from] EngineError),
}
