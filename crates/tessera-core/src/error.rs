//! Error types for asset and batch validation.

use crate::layout::{Attribute, VertexLayout};
use thiserror::Error;

/// Validation error for vertex and index data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A primitive declared a different layout than its mesh
    #[error("layout mismatch: expected {expected:?}, found {found:?}")]
    LayoutMismatch {
        expected: VertexLayout,
        found: VertexLayout,
    },

    /// An attribute stream exists without an index array
    #[error("missing index array for {0:?}")]
    MissingIndices(Attribute),

    /// An index array exists for an attribute the layout does not carry
    #[error("index array supplied for absent attribute {0:?}")]
    UnexpectedIndices(Attribute),

    /// Per-attribute index arrays disagree in length
    #[error("index count mismatch for {attribute:?}: expected {expected}, found {found}")]
    IndexCountMismatch {
        attribute: Attribute,
        expected: usize,
        found: usize,
    },

    /// An index points past the end of its attribute stream
    #[error("index {index} out of range for {attribute:?} stream of length {len}")]
    IndexOutOfRange {
        attribute: Attribute,
        index: u32,
        len: usize,
    },

    /// A UI batch index points past the end of its vertices
    #[error("UI index {index} out of range for {len} vertices")]
    UiIndexOutOfRange { index: u16, len: usize },

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
