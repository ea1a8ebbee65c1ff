//! Result-model error types.

use thiserror::Error;

/// Result type for typed row decoding.
pub type RowDecodeResult<T> = Result<T, RowDecodeError>;

/// A row could not be decoded into the requested type.
///
/// Carries the zero-based row index so callers can point at the offending
/// record without dumping the whole result set.
#[derive(Debug, Error)]
#[error("row {index} could not be decoded: {source}")]
pub struct RowDecodeError {
    pub index: usize,
    #[source]
    pub source: serde_json::Error,
}

impl RowDecodeError {
    pub fn new(index: usize, source: serde_json::Error) -> Self {
        Self { index, source }
    }
}
