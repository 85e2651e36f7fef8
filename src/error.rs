//! Error types for grid construction, joins and diffusion.

use thiserror::Error;

/// Errors raised at the boundary of the grid engine.
///
/// Every variant is a configuration or input error: the engine is
/// deterministic and performs no I/O, so nothing here is retryable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// Compass label that is not one of the eight directions.
    #[error("invalid bearing: {0}")]
    InvalidBearing(String),

    /// Attribute value kind other than `number` or `string`.
    #[error("unsupported value kind: {0}")]
    UnsupportedKind(String),

    /// Decay descriptor that does not parse.
    #[error("invalid decay rule: {0}")]
    InvalidDecay(String),

    /// Required join column absent from an input row.
    #[error("missing column `{0}`")]
    MissingColumn(String),

    /// Column present but holding an unusable value.
    #[error("invalid value in column `{column}`: {reason}")]
    InvalidValue { column: String, reason: String },

    /// Line geometry that could not be decoded.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("cell {index} out of range (grid has {len} cells)")]
    CellOutOfRange { index: usize, len: usize },

    /// Attribute holds (or would receive) a value of the wrong kind.
    #[error("attribute `{attribute}` on cell {cell}: expected {expected}")]
    KindMismatch {
        attribute: String,
        cell: usize,
        expected: &'static str,
    },

    #[error("attribute `{attribute}` missing on cell {cell}")]
    MissingAttribute { attribute: String, cell: usize },

    /// Grid parameters outside their valid ranges.
    #[error("invalid grid configuration: {0}")]
    Config(String),
}

/// Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;
