use crate::{completion::CompletionError, extractor::ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Completion error")]
    Completion(#[from] CompletionError),
    #[error("Validation error")]
    Validation(#[from] ValidationError),
}
