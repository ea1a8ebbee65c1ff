//! Pipeline stages.
//!
//! Each stage either lets the request continue, answers it, or fails with a
//! [`PipelineError`]. Stages share nothing but the per-request
//! [`RequestContext`] and the read-only [`PipelineEnv`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use trellis_auth::{AccessController, SessionError, SessionManager};

use crate::context::{Identity, RequestId};
use crate::middleware::extract_bearer;

use super::route::{
    BodySchema, Handler, HandlerArgs, Method, PostprocessCheck, PreprocessCheck, RoleCheck,
};
use super::PipelineError;

/// Shared, read-only collaborators of every compiled route.
pub struct PipelineEnv<S> {
    pub sessions: Arc<SessionManager<Value>>,
    pub access: Arc<AccessController>,
    pub state: Arc<S>,
}

impl<S> Clone for PipelineEnv<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            access: Arc::clone(&self.access),
            state: Arc::clone(&self.state),
        }
    }
}

/// Per-request state threaded through the stages.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub request_id: Option<RequestId>,
    pub headers: HeaderMap,
    pub raw_body: Bytes,
    /// Set by body validation.
    pub body: Option<Value>,
    pub query: HashMap<String, String>,
    pub params: HashMap<String, String>,
    /// Set by the handler.
    pub response: Option<Value>,
    session: Option<(Identity, String)>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            request_id: None,
            headers: HeaderMap::new(),
            raw_body: Bytes::new(),
            body: None,
            query: HashMap::new(),
            params: HashMap::new(),
            response: None,
            session: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<RequestId>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_raw_body(mut self, body: Bytes) -> Self {
        self.raw_body = body;
        self
    }

    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|(identity, _)| identity)
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|(_, token)| token.as_str())
    }

    /// Verify the bearer token once and memoise the identity.
    pub async fn resolve_identity(
        &mut self,
        sessions: &SessionManager<Value>,
    ) -> Result<Identity, PipelineError> {
        if let Some(identity) = self.identity() {
            return Ok(identity.clone());
        }

        let token = extract_bearer(&self.headers)
            .map_err(SessionError::InvalidToken)?
            .to_string();
        let identity = Identity::new(sessions.verify_token(&token).await?);

        self.session = Some((identity.clone(), token));
        Ok(identity)
    }
}

pub enum Flow {
    Continue,
    Respond(Response),
}

#[async_trait]
pub trait Stage<S: Send + Sync + 'static>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut RequestContext, env: &PipelineEnv<S>) -> Result<Flow, PipelineError>;
}

pub struct BodyValidation {
    schema: BodySchema,
}

impl BodyValidation {
    pub fn new(schema: BodySchema) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> Stage<S> for BodyValidation {
    fn name(&self) -> &'static str {
        "body_validation"
    }

    async fn run(&self, ctx: &mut RequestContext, _env: &PipelineEnv<S>) -> Result<Flow, PipelineError> {
        let raw: Value = serde_json::from_slice(&ctx.raw_body)
            .map_err(|e| PipelineError::Validation(format!("body is not JSON: {e}")))?;
        let body = self
            .schema
            .validate(raw)
            .map_err(PipelineError::Validation)?;
        ctx.body = Some(body);
        Ok(Flow::Continue)
    }
}

pub struct RoleCheckStage {
    check: RoleCheck,
}

impl RoleCheckStage {
    pub fn new(check: RoleCheck) -> Self {
        Self { check }
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> Stage<S> for RoleCheckStage {
    fn name(&self) -> &'static str {
        "role_check"
    }

    async fn run(&self, ctx: &mut RequestContext, env: &PipelineEnv<S>) -> Result<Flow, PipelineError> {
        let identity = ctx.resolve_identity(&env.sessions).await?;
        let RoleCheck { area, action } = &self.check;

        if env.access.check_any(area, action, identity.roles()) {
            Ok(Flow::Continue)
        } else {
            Err(PipelineError::RoleCheckFailed {
                area: area.clone(),
                action: action.clone(),
            })
        }
    }
}

pub struct PreprocessChecks {
    checks: Vec<(String, PreprocessCheck)>,
}

impl PreprocessChecks {
    pub fn new(checks: Vec<(String, PreprocessCheck)>) -> Self {
        Self { checks }
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> Stage<S> for PreprocessChecks {
    fn name(&self) -> &'static str {
        "preprocess_checks"
    }

    async fn run(&self, ctx: &mut RequestContext, env: &PipelineEnv<S>) -> Result<Flow, PipelineError> {
        let identity = ctx.resolve_identity(&env.sessions).await?;
        for (name, check) in &self.checks {
            if !check(identity.clone()).await {
                return Err(PipelineError::PreprocessCheckFailed(name.clone()));
            }
        }
        Ok(Flow::Continue)
    }
}

pub struct SessionStage;

#[async_trait]
impl<S: Send + Sync + 'static> Stage<S> for SessionStage {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn run(&self, ctx: &mut RequestContext, env: &PipelineEnv<S>) -> Result<Flow, PipelineError> {
        ctx.resolve_identity(&env.sessions).await?;
        Ok(Flow::Continue)
    }
}

pub struct HandlerStage<S> {
    handler: Handler<S>,
}

impl<S> HandlerStage<S> {
    pub fn new(handler: Handler<S>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> Stage<S> for HandlerStage<S> {
    fn name(&self) -> &'static str {
        "handler"
    }

    async fn run(&self, ctx: &mut RequestContext, env: &PipelineEnv<S>) -> Result<Flow, PipelineError> {
        let identity = ctx.resolve_identity(&env.sessions).await?;
        let args = HandlerArgs {
            body: ctx.body.take(),
            query: std::mem::take(&mut ctx.query),
            params: std::mem::take(&mut ctx.params),
            identity,
            token: ctx.token().unwrap_or_default().to_string(),
            state: Arc::clone(&env.state),
        };

        ctx.response = (self.handler)(args).await.map_err(PipelineError::Handler)?;
        Ok(Flow::Continue)
    }
}

pub struct PostprocessChecks {
    checks: Vec<(String, PostprocessCheck)>,
}

impl PostprocessChecks {
    pub fn new(checks: Vec<(String, PostprocessCheck)>) -> Self {
        Self { checks }
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> Stage<S> for PostprocessChecks {
    fn name(&self) -> &'static str {
        "postprocess_checks"
    }

    async fn run(&self, ctx: &mut RequestContext, env: &PipelineEnv<S>) -> Result<Flow, PipelineError> {
        let identity = ctx.resolve_identity(&env.sessions).await?;
        for (name, check) in &self.checks {
            if !check(identity.clone(), ctx.response.clone()).await {
                return Err(PipelineError::PostprocessCheckFailed(name.clone()));
            }
        }
        Ok(Flow::Continue)
    }
}

/// Commits the handler's value: 200 with a JSON body, or an empty 200.
pub struct SendStage;

#[async_trait]
impl<S: Send + Sync + 'static> Stage<S> for SendStage {
    fn name(&self) -> &'static str {
        "send"
    }

    async fn run(&self, ctx: &mut RequestContext, _env: &PipelineEnv<S>) -> Result<Flow, PipelineError> {
        let response = match ctx.response.take() {
            Some(value) => (StatusCode::OK, Json(value)).into_response(),
            None => StatusCode::OK.into_response(),
        };
        Ok(Flow::Respond(response))
    }
}
