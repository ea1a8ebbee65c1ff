//! Infrastructure layer: storage adapters, query catalog, Data Access Layer
//! and (optionally) the Redis session blacklist.

pub mod adapter;
pub mod catalog;
pub mod db;

#[cfg(feature = "redis")]
pub mod cache;

pub use adapter::{AdapterError, AdapterResult, AdapterTransaction, StorageAdapter};
pub use catalog::{CatalogError, ConfigFormat, QueryCatalog};
pub use db::{
    BuildFailure, BuildReport, ConnectionState, DbError, DbManager, DbOptions, DbResult,
    Transaction, TransactionState,
};
