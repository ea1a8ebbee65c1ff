//! `trellis-core` — storage-neutral building blocks shared by every layer.
//!
//! This crate contains **no I/O**: the result model returned by storage
//! adapters and the fixed HTTP status description table.

pub mod error;
pub mod result_set;
pub mod status;

pub use error::{RowDecodeError, RowDecodeResult};
pub use result_set::{QueryArg, ResultSet, Row};
pub use status::describe_status;
