//! Storage-neutral query results.
//!
//! Every storage adapter returns a [`ResultSet`]: an ordered list of rows, each
//! row an ordered JSON object keyed by column name. Positional arguments are
//! plain JSON values; adapters decide how to bind them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RowDecodeError, RowDecodeResult};

/// One result row (column name -> value, in column order).
pub type Row = Map<String, Value>;

/// One positional statement argument.
pub type QueryArg = Value;

/// Rows returned by a statement plus the number of rows it affected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            rows_affected: 0,
        }
    }

    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.rows_affected = rows_affected;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Decode every row into `T`.
    ///
    /// Fails on the first row that does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> RowDecodeResult<Vec<T>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                serde_json::from_value(Value::Object(row.clone()))
                    .map_err(|e| RowDecodeError::new(index, e))
            })
            .collect()
    }

    /// JSON view of the rows (what handlers usually send back).
    pub fn to_json(&self) -> Value {
        Value::Array(self.rows.iter().cloned().map(Value::Object).collect())
    }
}

impl FromIterator<Row> for ResultSet {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self::from_rows(iter.into_iter().collect())
    }
}
