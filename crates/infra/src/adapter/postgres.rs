//! Postgres storage adapter (SQLx connection pool).
//!
//! ## Argument binding
//!
//! | JSON argument | bound as |
//! |---------------|----------|
//! | `null` | `NULL` (text) |
//! | bool | `BOOL` |
//! | integer | `INT8` |
//! | other number | `FLOAT8` |
//! | string | `TEXT` |
//! | array / object | `JSONB` |
//!
//! ## Row decoding
//!
//! Columns are decoded by Postgres type name into JSON: integers and floats
//! to numbers, `JSON`/`JSONB` as-is, `UUID` and date/time types to strings,
//! text-like types as strings. Anything else fails the statement with a
//! decode error naming the column.
//!
//! ## Thread Safety
//!
//! `PgAdapter` is `Send + Sync`; every `execute` leases a pool connection for
//! the duration of the statement. Transactions hold one leased connection
//! until commit/rollback (SQLx rolls back on drop).

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::types::{Json, Uuid};
use sqlx::{Column, Either, Executor, PgPool, Postgres, Row as SqlxRow, TypeInfo};
use tokio_stream::StreamExt;
use tracing::{info, instrument};

use trellis_core::{QueryArg, ResultSet, Row};

use super::{AdapterError, AdapterResult, AdapterTransaction, StorageAdapter};

/// Connection parameters, consumed as already validated values.
#[derive(Debug, Clone)]
pub struct PgAdapterConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PgAdapterConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Postgres-backed storage adapter.
#[derive(Debug)]
pub struct PgAdapter {
    config: PgAdapterConfig,
    pool: RwLock<Option<PgPool>>,
}

impl PgAdapter {
    pub fn new(config: PgAdapterConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    fn pool(&self) -> AdapterResult<PgPool> {
        self.pool
            .read()
            .map_err(|_| AdapterError::Connection("lock poisoned".to_string()))?
            .clone()
            .ok_or(AdapterError::NotConnected)
    }
}

#[async_trait]
impl StorageAdapter for PgAdapter {
    type Transaction = PgTransaction;

    #[instrument(skip(self), fields(max_connections = self.config.max_connections), err)]
    async fn connect(&self) -> AdapterResult<()> {
        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.acquire_timeout)
            .connect(&self.config.url)
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        *self
            .pool
            .write()
            .map_err(|_| AdapterError::Connection("lock poisoned".to_string()))? = Some(pool);

        info!("postgres pool connected");
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        let pool = self
            .pool
            .write()
            .map_err(|_| AdapterError::Connection("lock poisoned".to_string()))?
            .take();

        // Never connected (or already closed): nothing to release.
        if let Some(pool) = pool {
            pool.close().await;
            info!("postgres pool closed");
        }
        Ok(())
    }

    async fn execute(&self, statement: &str, args: &[QueryArg]) -> AdapterResult<ResultSet> {
        let pool = self.pool()?;
        run(&pool, statement, args).await
    }

    async fn begin(&self) -> AdapterResult<PgTransaction> {
        let tx = self
            .pool()?
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PgTransaction { tx })
    }
}

/// A Postgres transaction holding one pool connection.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl AdapterTransaction for PgTransaction {
    async fn execute(&mut self, statement: &str, args: &[QueryArg]) -> AdapterResult<ResultSet> {
        run(&mut *self.tx, statement, args).await
    }

    async fn commit(self) -> AdapterResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> AdapterResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_transaction", e))
    }
}

async fn run<'c, E>(executor: E, statement: &str, args: &[QueryArg]) -> AdapterResult<ResultSet>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = bind_args(sqlx::query(statement), args);

    let mut result = ResultSet::empty();
    let mut stream = executor.fetch_many(query);
    while let Some(item) = stream.next().await {
        match item.map_err(|e| map_sqlx_error("execute", e))? {
            Either::Left(done) => result.rows_affected += done.rows_affected(),
            Either::Right(row) => result.rows.push(decode_row(&row)?),
        }
    }
    Ok(result)
}

fn bind_args<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &[QueryArg],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(Json(other.clone())),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> AdapterResult<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name()).map_err(|e| {
            AdapterError::Query(format!("failed to decode column `{}`: {e}", column.name()))
        })?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|f| Value::from(f64::from(f))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::from),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx)?,
        "UUID" => row
            .try_get::<Option<Uuid>, _>(idx)?
            .map(|u| Value::from(u.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|t| Value::from(t.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|t| Value::from(t.to_string())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| Value::from(d.to_string())),
        _ => row.try_get::<Option<String>, _>(idx)?.map(Value::from),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> AdapterError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            AdapterError::Query(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => AdapterError::NotConnected,
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            AdapterError::Connection(format!("{operation}: {err}"))
        }
        other => AdapterError::Query(format!("{operation}: {other}")),
    }
}
