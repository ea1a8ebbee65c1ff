//! Service wiring: session verifier, access controller and Data Access Layer.
//!
//! Built once at startup by [`AppServices::bootstrap`] and torn down once by
//! [`AppServices::shutdown`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use serde_json::Value;
use tracing::{info, warn};

use trellis_auth::{AccessController, Blacklist, InMemoryBlacklist, SessionConfig, SessionManager};
use trellis_infra::{DbManager, DbOptions, StorageAdapter};

use crate::config::AppConfig;

pub struct AppServices<A: StorageAdapter> {
    pub db: DbManager<A>,
    pub sessions: Arc<SessionManager<Value>>,
    pub access: Arc<AccessController>,
    shut_down: AtomicBool,
}

impl<A: StorageAdapter> AppServices<A> {
    pub fn new(
        db: DbManager<A>,
        sessions: Arc<SessionManager<Value>>,
        access: Arc<AccessController>,
    ) -> Self {
        Self {
            db,
            sessions,
            access,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Connect storage, build the schema (when a model file is configured)
    /// and load the access policy.
    pub async fn bootstrap(adapter: A, config: &AppConfig) -> anyhow::Result<Self> {
        let ttl = chrono::Duration::try_seconds(config.session_ttl_secs)
            .context("session ttl out of range")?;
        let blacklist = build_blacklist(config).await?;
        let sessions = SessionManager::new(SessionConfig::new(config.session_secret.clone(), ttl))
            .with_blacklist(Arc::clone(&blacklist));

        let mut options = DbOptions::default()
            .with_direct_queries(config.allow_direct_queries)
            .with_transactions(config.allow_transactions);
        if let Some(path) = &config.queries_path {
            options = options.with_queries_path(path);
        }
        if let Some(path) = &config.model_path {
            options = options.with_model_path(path);
        }

        let mut db = DbManager::new(adapter, options);
        db.connect()
            .await
            .context("failed to connect the data access layer")?;

        // Past this point a failure must release what was opened.
        let access = match prepare(&db, config).await {
            Ok(access) => access,
            Err(e) => {
                if let Err(close) = db.disconnect().await {
                    warn!(error = %close, "failed to disconnect after bootstrap failure");
                }
                if let Err(close) = blacklist.close().await {
                    warn!(error = %close, "failed to close blacklist after bootstrap failure");
                }
                return Err(e);
            }
        };

        Ok(Self::new(db, Arc::new(sessions), Arc::new(access)))
    }

    /// Release the session store, then the Data Access Layer. Runs once;
    /// later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(blacklist) = self.sessions.blacklist() {
            if let Err(e) = blacklist.close().await {
                warn!(error = %e, "failed to close session blacklist");
            }
        }

        if let Err(e) = self.db.disconnect().await {
            warn!(error = %e, "failed to disconnect data access layer");
        }

        info!("services shut down");
    }
}

/// Build the schema (when a model file is configured), then load the
/// access policy.
async fn prepare<A: StorageAdapter>(
    db: &DbManager<A>,
    config: &AppConfig,
) -> anyhow::Result<AccessController> {
    if db.options().model_path.is_some() {
        let report = db
            .build_from_model_file()
            .await
            .context("failed to build schema from model file")?;
        if !report.is_clean() {
            warn!(
                failed = report.failures.len(),
                executed = report.executed,
                "schema build finished with failures"
            );
        }
    }

    match &config.access_policy_query {
        Some(query) => load_access_policy(db, query).await,
        None => {
            warn!("ACCESS_POLICY_QUERY not set; every role check will be denied");
            Ok(AccessController::default())
        }
    }
}

/// Run the named policy query and parse its `area`/`action`/`role` rows.
pub async fn load_access_policy<A: StorageAdapter>(
    db: &DbManager<A>,
    query: &str,
) -> anyhow::Result<AccessController> {
    let rows = db
        .execute_named(query, &[])
        .await
        .with_context(|| format!("failed to run access policy query `{query}`"))?;
    let controller = AccessController::from_rows(&rows)?;
    info!(
        areas = controller.policy().areas().count(),
        "access policy loaded"
    );
    Ok(controller)
}

async fn build_blacklist(config: &AppConfig) -> anyhow::Result<Arc<dyn Blacklist>> {
    match &config.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => Ok(Arc::new(
            trellis_infra::cache::RedisBlacklist::connect(url).await?,
        )),
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            warn!("REDIS_URL set but the `redis` feature is disabled; using in-memory blacklist");
            Ok(Arc::new(InMemoryBlacklist::new()))
        }
        None => Ok(Arc::new(InMemoryBlacklist::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::{ResultSet, Row};
    use trellis_infra::ConnectionState;
    use trellis_infra::adapter::InMemoryAdapter;

    fn policy_rows() -> ResultSet {
        [("queries", "execute", "admin"), ("billing", "*", "auditor")]
            .into_iter()
            .map(|(area, action, role)| {
                let mut row = Row::new();
                row.insert("area".into(), json!(area));
                row.insert("action".into(), json!(action));
                row.insert("role".into(), json!(role));
                row
            })
            .collect()
    }

    fn queries_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("queries.json");
        std::fs::write(
            &path,
            r#"{"queries": {"get-access-policy": "SELECT area, action, role FROM access_policy"}}"#,
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn bootstrap_loads_policy_and_shutdown_closes_storage() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = InMemoryAdapter::new().respond_to(
            "SELECT area, action, role FROM access_policy",
            policy_rows(),
        );
        let config = AppConfig {
            queries_path: Some(queries_file(&dir)),
            access_policy_query: Some("get-access-policy".to_string()),
            ..AppConfig::default()
        };

        let services = AppServices::bootstrap(adapter.clone(), &config).await.unwrap();

        assert!(services.access.check_access("queries", "execute", "admin"));
        assert!(services.access.check_access("billing", "refund", "auditor"));
        assert!(!services.access.check_access("queries", "execute", "guest"));

        services.shutdown().await;
        services.shutdown().await;
        assert_eq!(services.db.state(), ConnectionState::Closed);
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn missing_policy_query_fails_bootstrap_and_releases_storage() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = InMemoryAdapter::new();
        let config = AppConfig {
            queries_path: Some(queries_file(&dir)),
            access_policy_query: Some("nope".to_string()),
            ..AppConfig::default()
        };

        assert!(AppServices::bootstrap(adapter.clone(), &config).await.is_err());
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn unreadable_model_file_fails_bootstrap_and_releases_storage() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = InMemoryAdapter::new();
        let config = AppConfig {
            model_path: Some(dir.path().join("missing.yaml")),
            ..AppConfig::default()
        };

        assert!(AppServices::bootstrap(adapter.clone(), &config).await.is_err());
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn model_file_failures_do_not_abort_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.toml");
        std::fs::write(
            &model,
            "[queries]\nusers = \"CREATE TABLE users (id INT)\"\nbroken = \"CREATE TABLE\"\n",
        )
        .unwrap();
        let adapter = InMemoryAdapter::new().fail_on("CREATE TABLE");
        let config = AppConfig {
            model_path: Some(model),
            ..AppConfig::default()
        };

        AppServices::bootstrap(adapter.clone(), &config).await.unwrap();
        assert_eq!(
            adapter.statements(),
            vec!["CREATE TABLE users (id INT)", "CREATE TABLE"]
        );
    }
}
