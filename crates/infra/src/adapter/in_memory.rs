use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use trellis_core::{QueryArg, ResultSet};

use super::{AdapterError, AdapterResult, AdapterTransaction, StorageAdapter};

/// One statement as seen by the in-memory backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub statement: String,
    pub args: Vec<QueryArg>,
    pub in_transaction: bool,
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    refuse_connect: bool,
    responses: HashMap<String, ResultSet>,
    failing: HashSet<String>,
    log: Vec<ExecutedStatement>,
}

/// Scripted in-memory backend.
///
/// Records every statement it receives and answers with the result scripted
/// for that exact statement text (an empty result otherwise). Clones share
/// state, so a caller can keep a handle after moving the adapter into a
/// Data Access Layer.
///
/// Intended for tests/dev. Not a SQL engine.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAdapter {
    state: Arc<Mutex<State>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `statement` with `result`.
    pub fn respond_to(self, statement: impl Into<String>, result: ResultSet) -> Self {
        self.lock().responses.insert(statement.into(), result);
        self
    }

    /// Fail every execution of `statement`.
    pub fn fail_on(self, statement: impl Into<String>) -> Self {
        self.lock().failing.insert(statement.into());
        self
    }

    /// Make `connect` fail.
    pub fn refuse_connections(self) -> Self {
        self.lock().refuse_connect = true;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.lock().log.clone()
    }

    /// Statement texts in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().log.iter().map(|e| e.statement.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, statement: &str, args: &[QueryArg], in_transaction: bool) -> AdapterResult<ResultSet> {
        let mut state = self.lock();
        if !state.connected {
            return Err(AdapterError::NotConnected);
        }

        state.log.push(ExecutedStatement {
            statement: statement.to_string(),
            args: args.to_vec(),
            in_transaction,
        });

        if state.failing.contains(statement) {
            return Err(AdapterError::Query(format!("scripted failure: {statement}")));
        }

        Ok(state.responses.get(statement).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl StorageAdapter for InMemoryAdapter {
    type Transaction = InMemoryTransaction;

    async fn connect(&self) -> AdapterResult<()> {
        let mut state = self.lock();
        if state.refuse_connect {
            return Err(AdapterError::Connection("connection refused".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        self.lock().connected = false;
        Ok(())
    }

    async fn execute(&self, statement: &str, args: &[QueryArg]) -> AdapterResult<ResultSet> {
        self.run(statement, args, false)
    }

    async fn begin(&self) -> AdapterResult<InMemoryTransaction> {
        self.run("BEGIN", &[], true)?;
        Ok(InMemoryTransaction {
            adapter: self.clone(),
            open: true,
        })
    }
}

/// Transaction on the in-memory backend; logs its control statements.
#[derive(Debug)]
pub struct InMemoryTransaction {
    adapter: InMemoryAdapter,
    open: bool,
}

impl InMemoryTransaction {
    fn finish(mut self, control: &str) -> AdapterResult<()> {
        self.open = false;
        self.adapter.run(control, &[], true).map(|_| ())
    }
}

#[async_trait]
impl AdapterTransaction for InMemoryTransaction {
    async fn execute(&mut self, statement: &str, args: &[QueryArg]) -> AdapterResult<ResultSet> {
        self.adapter.run(statement, args, true)
    }

    async fn commit(self) -> AdapterResult<()> {
        self.finish("COMMIT")
    }

    async fn rollback(self) -> AdapterResult<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.open {
            let _ = self.adapter.run("ROLLBACK", &[], true);
        }
    }
}
