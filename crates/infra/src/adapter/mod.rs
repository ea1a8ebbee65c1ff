//! Storage adapter boundary.
//!
//! A backend is anything that can `connect`, `disconnect` and `execute` a
//! statement with positional arguments, plus open a transaction bound to one
//! leased connection. The Data Access Layer only ever talks to this trait.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{ExecutedStatement, InMemoryAdapter, InMemoryTransaction};
pub use postgres::{PgAdapter, PgAdapterConfig, PgTransaction};

use async_trait::async_trait;
use thiserror::Error;

use trellis_core::{QueryArg, ResultSet};

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Backend failure.
///
/// Messages are backend-specific and may contain statement details; they are
/// logged, never sent to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("adapter is not connected")]
    NotConnected,

    #[error("query error: {0}")]
    Query(String),
}

/// A backend-specific storage implementation.
///
/// ## Lifecycle
///
/// `connect` is called once before serving traffic and `disconnect` once at
/// shutdown. `disconnect` on an adapter that never connected must succeed as
/// a no-op so the shutdown path cannot fail on it.
///
/// ## Concurrency
///
/// `execute` may be called concurrently; pooled backends lease a connection
/// per call. Anything that must run on a single connection (transactions)
/// goes through [`StorageAdapter::begin`].
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    type Transaction: AdapterTransaction;

    async fn connect(&self) -> AdapterResult<()>;

    async fn disconnect(&self) -> AdapterResult<()>;

    async fn execute(&self, statement: &str, args: &[QueryArg]) -> AdapterResult<ResultSet>;

    /// Lease one connection and open a transaction on it.
    async fn begin(&self) -> AdapterResult<Self::Transaction>;
}

/// A transaction pinned to one leased connection.
///
/// Dropping it without `commit`/`rollback` rolls back.
#[async_trait]
pub trait AdapterTransaction: Send + 'static {
    async fn execute(&mut self, statement: &str, args: &[QueryArg]) -> AdapterResult<ResultSet>;

    async fn commit(self) -> AdapterResult<()>;

    async fn rollback(self) -> AdapterResult<()>;
}
