//! Query catalog and schema model loading.
//!
//! Both files are configuration documents (JSON, YAML or TOML, chosen by file
//! extension) with a top-level `queries` mapping of name -> statement:
//!
//! - the **queries file** becomes a [`QueryCatalog`] (name -> trimmed statement)
//! - the **model file** becomes an ordered list of schema-build statements
//!   (names discarded, document order kept)
//!
//! Loading reads the file and nothing else; no connection I/O happens here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unsupported file type `{extension}`: {path}")]
    UnsupportedFileType { path: PathBuf, extension: String },

    #[error("failed to load {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },
}

impl CatalogError {
    fn load(path: &Path, reason: impl Into<String>) -> Self {
        CatalogError::ConfigLoad {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Configuration dialect of a queries/model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick the dialect from the file extension.
    pub fn from_path(path: &Path) -> CatalogResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match extension {
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            other => Err(CatalogError::UnsupportedFileType {
                path: path.to_path_buf(),
                extension: other.to_string(),
            }),
        }
    }

    /// Parse `content` into a JSON document.
    pub fn parse(self, content: &str) -> Result<Value, String> {
        match self {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// Named statements loaded from the queries file. Read-only after load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCatalog {
    queries: HashMap<String, String>,
}

impl QueryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
    pub async fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let document = load_document(path).await?;
        let catalog = Self::from_document(path, &document)?;
        debug!(queries = catalog.len(), "query catalog loaded");
        Ok(catalog)
    }

    /// Build a catalog from an already parsed document.
    pub fn from_document(path: &Path, document: &Value) -> CatalogResult<Self> {
        let queries = statements(path, document)?
            .into_iter()
            .map(|(name, statement)| (name.to_string(), statement))
            .collect();
        Ok(Self { queries })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.queries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }
}

/// Load the ordered schema-build statements of a model file.
#[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
pub async fn load_model(path: impl AsRef<Path>) -> CatalogResult<Vec<String>> {
    let path = path.as_ref();
    let document = load_document(path).await?;
    Ok(statements(path, &document)?
        .into_iter()
        .map(|(_, statement)| statement)
        .collect())
}

async fn load_document(path: &Path) -> CatalogResult<Value> {
    // Reject the dialect before touching the file.
    let format = ConfigFormat::from_path(path)?;

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CatalogError::load(path, e.to_string()))?;

    format
        .parse(&content)
        .map_err(|reason| CatalogError::load(path, reason))
}

fn statements<'d>(path: &Path, document: &'d Value) -> CatalogResult<Vec<(&'d str, String)>> {
    let queries: &Map<String, Value> = document
        .get("queries")
        .and_then(Value::as_object)
        .ok_or_else(|| CatalogError::load(path, "missing top-level `queries` mapping"))?;

    queries
        .iter()
        .map(|(name, value)| match value.as_str() {
            Some(statement) => Ok((name.as_str(), statement.trim().to_string())),
            None => Err(CatalogError::load(
                path,
                format!("query `{name}` is not a string"),
            )),
        })
        .collect()
}
