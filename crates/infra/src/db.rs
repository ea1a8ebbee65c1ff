//! Data Access Layer: guarded execution over one storage adapter.
//!
//! ## Lifecycle
//!
//! `Unconnected --connect--> Connected --disconnect--> Closed`
//!
//! Only `Connected` permits statements. `Closed` is terminal: a closed
//! instance never reconnects, build a new one instead.
//!
//! ## Execution modes
//!
//! - **named**: statements from the query catalog, by name
//! - **direct**: caller-supplied statement text, only with `allow_direct_queries`
//! - **transactional**: a [`Transaction`] handle pinned to one leased
//!   connection, only with `allow_transactions`
//!
//! ## Schema bootstrap policy
//!
//! `build_from_model_file` and `build_from_statements` run every statement
//! strictly in sequence and **continue past failures**. Failures are logged
//! and returned in the [`BuildReport`]; the operation itself only fails on
//! preconditions (gate, model path, connection state, model file loading).

use std::path::PathBuf;
use std::sync::RwLock;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use trellis_core::{QueryArg, ResultSet};

use crate::adapter::{AdapterError, AdapterTransaction, StorageAdapter};
use crate::catalog::{self, CatalogError, QueryCatalog};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    /// Queries/model file could not be loaded (`ConfigLoad` / `UnsupportedFileType`).
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("database is not connected")]
    NotConnected,

    #[error("direct queries are not allowed")]
    DirectQueryDisallowed,

    #[error("transactions are not allowed")]
    TransactionsDisallowed,

    #[error("queries are not loaded")]
    QueriesNotLoaded,

    #[error("query not found: {0}")]
    QueryNotFound(String),

    #[error("model path is not provided")]
    ModelPathMissing,

    #[error("query failed: {0}")]
    Query(String),
}

impl From<AdapterError> for DbError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Connection(msg) => DbError::Connection(msg),
            AdapterError::NotConnected => DbError::NotConnected,
            AdapterError::Query(msg) => DbError::Query(msg),
        }
    }
}

/// Capabilities and file locations of a Data Access Layer instance.
#[derive(Debug, Clone, Default)]
pub struct DbOptions {
    pub allow_direct_queries: bool,
    pub allow_transactions: bool,
    pub queries_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
}

impl DbOptions {
    pub fn with_direct_queries(mut self, allow: bool) -> Self {
        self.allow_direct_queries = allow;
        self
    }

    pub fn with_transactions(mut self, allow: bool) -> Self {
        self.allow_transactions = allow;
        self
    }

    pub fn with_queries_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.queries_path = Some(path.into());
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Closed,
}

/// One failed schema-build statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub index: usize,
    pub statement: String,
    pub error: DbError,
}

/// Outcome of a schema build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Statements dispatched (successful or not).
    pub executed: usize,
    pub failures: Vec<BuildFailure>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.executed - self.failures.len()
    }
}

/// Owns one storage adapter and the query catalog; exposes neither directly.
pub struct DbManager<A: StorageAdapter> {
    adapter: A,
    options: DbOptions,
    queries: QueryCatalog,
    state: RwLock<ConnectionState>,
}

impl<A: StorageAdapter> DbManager<A> {
    pub fn new(adapter: A, options: DbOptions) -> Self {
        Self {
            adapter,
            options,
            queries: QueryCatalog::new(),
            state: RwLock::new(ConnectionState::Unconnected),
        }
    }

    pub fn options(&self) -> &DbOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn queries(&self) -> &QueryCatalog {
        &self.queries
    }

    fn set_state(&self, next: ConnectionState) {
        *self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = next;
    }

    /// Connect the adapter, then load the query catalog (if configured).
    ///
    /// A catalog failure disconnects the adapter again and leaves the
    /// instance unconnected.
    #[instrument(skip(self), err)]
    pub async fn connect(&mut self) -> DbResult<()> {
        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Closed => {
                return Err(DbError::Connection(
                    "data access layer is closed".to_string(),
                ));
            }
            ConnectionState::Unconnected => {}
        }

        self.adapter.connect().await?;

        if let Some(path) = self.options.queries_path.clone() {
            match QueryCatalog::load(&path).await {
                Ok(catalog) => self.queries = catalog,
                Err(err) => {
                    if let Err(e) = self.adapter.disconnect().await {
                        warn!(error = %e, "adapter disconnect after catalog failure failed");
                    }
                    return Err(err.into());
                }
            }
        }

        self.set_state(ConnectionState::Connected);
        info!(queries = self.queries.len(), "data access layer connected");
        Ok(())
    }

    /// Close the instance. Safe to call in any state, including never connected.
    #[instrument(skip(self), err)]
    pub async fn disconnect(&self) -> DbResult<()> {
        let previous = self.state();
        if previous == ConnectionState::Closed {
            return Ok(());
        }

        self.set_state(ConnectionState::Closed);
        self.adapter.disconnect().await?;
        info!(?previous, "data access layer closed");
        Ok(())
    }

    fn ensure_connected(&self) -> DbResult<()> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            _ => Err(DbError::NotConnected),
        }
    }

    fn ensure_direct_allowed(&self) -> DbResult<()> {
        if self.options.allow_direct_queries {
            Ok(())
        } else {
            Err(DbError::DirectQueryDisallowed)
        }
    }

    fn ensure_transactions_allowed(&self) -> DbResult<()> {
        if self.options.allow_transactions {
            Ok(())
        } else {
            Err(DbError::TransactionsDisallowed)
        }
    }

    fn resolve(&self, name: &str) -> DbResult<&str> {
        if self.queries.is_empty() {
            return Err(DbError::QueriesNotLoaded);
        }
        self.queries
            .get(name)
            .ok_or_else(|| DbError::QueryNotFound(name.to_string()))
    }

    /// The single guarded path every statement goes through.
    async fn query(&self, statement: &str, args: &[QueryArg]) -> DbResult<ResultSet> {
        self.ensure_connected()?;
        Ok(self.adapter.execute(statement, args).await?)
    }

    /// Run caller-supplied statement text.
    #[instrument(skip(self, statement), err)]
    pub async fn execute_direct(&self, statement: &str) -> DbResult<ResultSet> {
        self.ensure_direct_allowed()?;
        self.query(statement, &[]).await
    }

    /// Run a catalog statement by name with positional arguments.
    #[instrument(skip(self, args), fields(args = args.len()), err)]
    pub async fn execute_named(&self, name: &str, args: &[QueryArg]) -> DbResult<ResultSet> {
        let statement = self.resolve(name)?;
        debug!(statement, "resolved named query");
        self.query(statement, args).await
    }

    /// Lease one connection and open a transaction on it.
    #[instrument(skip(self), err)]
    pub async fn begin_transaction(&self) -> DbResult<Transaction<'_, A>> {
        self.ensure_transactions_allowed()?;
        self.ensure_connected()?;
        let inner = self.adapter.begin().await?;
        Ok(Transaction {
            db: self,
            inner: Some(inner),
        })
    }

    /// Build the schema from the configured model file (continue on failure).
    #[instrument(skip(self), err)]
    pub async fn build_from_model_file(&self) -> DbResult<BuildReport> {
        let path = self
            .options
            .model_path
            .as_ref()
            .ok_or(DbError::ModelPathMissing)?;
        self.ensure_connected()?;

        let statements = catalog::load_model(path).await?;
        Ok(self.build(&statements).await)
    }

    /// Build from caller-supplied statements (direct-query gated, continue on failure).
    #[instrument(skip(self, statements), fields(statements = statements.len()), err)]
    pub async fn build_from_statements(&self, statements: &[String]) -> DbResult<BuildReport> {
        self.ensure_direct_allowed()?;
        self.ensure_connected()?;
        Ok(self.build(statements).await)
    }

    async fn build(&self, statements: &[String]) -> BuildReport {
        let mut report = BuildReport::default();
        for (index, statement) in statements.iter().enumerate() {
            report.executed += 1;
            if let Err(error) = self.query(statement, &[]).await {
                warn!(index, %error, "schema statement failed; continuing");
                report.failures.push(BuildFailure {
                    index,
                    statement: statement.clone(),
                    error,
                });
            }
        }

        info!(
            executed = report.executed,
            failed = report.failures.len(),
            "schema build finished"
        );
        report
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Active,
}

/// A transaction bound to one leased connection for its whole lifetime.
///
/// `commit`/`rollback` consume the handle. Dropping an active handle rolls
/// back at the backend.
pub struct Transaction<'a, A: StorageAdapter> {
    db: &'a DbManager<A>,
    inner: Option<A::Transaction>,
}

impl<A: StorageAdapter> Transaction<'_, A> {
    pub fn state(&self) -> TransactionState {
        if self.inner.is_some() {
            TransactionState::Active
        } else {
            TransactionState::Idle
        }
    }

    fn active(&mut self) -> DbResult<&mut A::Transaction> {
        self.db.ensure_transactions_allowed()?;
        self.db.ensure_connected()?;
        self.inner.as_mut().ok_or_else(|| {
            DbError::Query("transaction is no longer active".to_string())
        })
    }

    /// Run caller-supplied statement text inside the transaction.
    pub async fn execute(&mut self, statement: &str, args: &[QueryArg]) -> DbResult<ResultSet> {
        self.db.ensure_direct_allowed()?;
        let tx = self.active()?;
        Ok(tx.execute(statement, args).await?)
    }

    /// Run a catalog statement by name inside the transaction.
    pub async fn execute_named(&mut self, name: &str, args: &[QueryArg]) -> DbResult<ResultSet> {
        let db = self.db;
        let statement = db.resolve(name)?;
        let tx = self.active()?;
        Ok(tx.execute(statement, args).await?)
    }

    pub async fn commit(mut self) -> DbResult<()> {
        self.active()?;
        match self.inner.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Ok(()),
        }
    }

    pub async fn rollback(mut self) -> DbResult<()> {
        self.active()?;
        match self.inner.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Ok(()),
        }
    }
}

impl<A: StorageAdapter> Drop for Transaction<'_, A> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            warn!("transaction dropped while active; rolling back");
        }
    }
}
