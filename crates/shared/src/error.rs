//! Error types for shared support chat types

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("Identifier must not be empty: {0}")]
    Empty(&'static str),
}
