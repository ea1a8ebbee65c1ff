//! Named-query endpoint: runs a catalog statement and returns its rows.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use trellis_infra::StorageAdapter;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::pipeline::HandlerArgs;

/// Positional arguments for a named query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryArgs {
    #[serde(default)]
    pub args: Vec<Value>,
}

pub async fn run<A: StorageAdapter>(
    args: HandlerArgs<AppServices<A>>,
) -> anyhow::Result<Option<Value>> {
    let name = args
        .params
        .get("name")
        .ok_or_else(|| ApiError::bad_request("missing query name"))?;

    let positional = match args.body {
        Some(body) => {
            serde_json::from_value::<QueryArgs>(body)
                .map_err(|e| ApiError::bad_request(e.to_string()))?
                .args
        }
        None => Vec::new(),
    };

    let result = args.state.db.execute_named(name, &positional).await?;
    Ok(Some(json!({
        "rows": result.to_json(),
        "rowsAffected": result.rows_affected,
    })))
}
