use axum::http::StatusCode;
use serde_json::{Value, json};

use trellis_infra::StorageAdapter;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::pipeline::HandlerArgs;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// No route matches the path.
pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// The path exists but not under this method.
pub async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub async fn whoami<A: StorageAdapter>(
    args: HandlerArgs<AppServices<A>>,
) -> anyhow::Result<Option<Value>> {
    Ok(Some(json!({
        "identity": args.identity.claims(),
        "roles": args.identity.roles(),
    })))
}

/// Revoke the presented token.
pub async fn logout<A: StorageAdapter>(
    args: HandlerArgs<AppServices<A>>,
) -> anyhow::Result<Option<Value>> {
    args.state.sessions.revoke_token(&args.token).await?;
    Ok(None)
}
