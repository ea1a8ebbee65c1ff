//! Error Translator: the single place a failure becomes an HTTP response.
//!
//! Every response body has the shape
//! `{ "message": string, "statusCode": number, "description": string }`,
//! where `description` comes from the fixed status table in `trellis-core`.
//! Unclassified failures become a 500 with a generic message; their detail
//! is logged, never sent.

use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use trellis_auth::SessionError;
use trellis_core::describe_status;
use trellis_infra::DbError;

use crate::pipeline::PipelineError;

/// A classified failure with its wire representation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{status_code} {description}: {message}")]
pub struct ApiError {
    pub message: String,
    pub status_code: u16,
    pub description: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let description = describe_status(status.as_u16())
            .or(status.canonical_reason())
            .unwrap_or("Unknown Status");
        Self {
            message: message.into(),
            status_code: status.as_u16(),
            description,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// The generic payload for anything unclassified.
    pub fn unknown() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Unknown error")
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<&SessionError> for ApiError {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::InvalidToken(_) | SessionError::TokenBlacklisted => {
                ApiError::unauthorized("Invalid user token")
            }
            SessionError::BlacklistUnavailable => {
                ApiError::new(StatusCode::NOT_IMPLEMENTED, "Token revocation is not configured")
            }
            SessionError::Blacklist(_) => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Session store unavailable")
            }
            SessionError::Signing(_) => ApiError::unknown(),
        }
    }
}

impl From<&BytesRejection> for ApiError {
    fn from(rejection: &BytesRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<&DbError> for ApiError {
    fn from(err: &DbError) -> Self {
        match err {
            DbError::QueryNotFound(name) => ApiError::not_found(format!("Query not found: {name}")),
            DbError::DirectQueryDisallowed => ApiError::forbidden("Direct queries are not allowed"),
            DbError::TransactionsDisallowed => ApiError::forbidden("Transactions are not allowed"),
            DbError::NotConnected | DbError::Connection(_) => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Database unavailable")
            }
            DbError::QueriesNotLoaded
            | DbError::ModelPathMissing
            | DbError::Catalog(_)
            | DbError::Query(_) => ApiError::unknown(),
        }
    }
}

/// Translate any pipeline failure into its response payload.
pub fn translate(err: &PipelineError) -> ApiError {
    let api_error = match err {
        PipelineError::Validation(_) => ApiError::bad_request("Invalid body type"),
        PipelineError::RoleCheckFailed { area, action } => {
            ApiError::forbidden(format!("Failed role check: {area}/{action}"))
        }
        PipelineError::PreprocessCheckFailed(name) => {
            ApiError::unauthorized(format!("Failed preprocess check: {name}"))
        }
        PipelineError::PostprocessCheckFailed(name) => {
            ApiError::unauthorized(format!("Failed postprocess check: {name}"))
        }
        PipelineError::Session(e) => ApiError::from(e),
        PipelineError::Handler(e) => classify(e),
    };

    if api_error.status().is_server_error() {
        error!(error = %err, status = api_error.status_code, "request failed");
    } else {
        debug!(error = %err, status = api_error.status_code, "request rejected");
    }
    api_error
}

fn classify(err: &anyhow::Error) -> ApiError {
    if let Some(e) = err.downcast_ref::<ApiError>() {
        e.clone()
    } else if let Some(e) = err.downcast_ref::<DbError>() {
        ApiError::from(e)
    } else if let Some(e) = err.downcast_ref::<SessionError>() {
        ApiError::from(e)
    } else {
        ApiError::unknown()
    }
}
