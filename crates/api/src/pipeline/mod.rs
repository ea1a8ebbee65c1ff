//! Declarative route pipeline.
//!
//! A [`RouteDescription`] is compiled once at startup into a fixed, ordered
//! list of stages:
//!
//! 1. body validation (non-GET routes with a body schema)
//! 2. role check (routes with a role check)
//! 3. pre-process checks (in declaration order)
//! 4. session verification (always)
//! 5. handler
//! 6. post-process checks (in declaration order)
//! 7. send
//!
//! Any stage failure short-circuits into the error translator, which is the
//! only place a failure becomes a response. Stages 2 and 3 need the caller's
//! identity before stage 4 runs; identity is resolved lazily through the
//! session verifier and memoised on the request, so the token is verified
//! (and the blacklist consulted) at most once per request.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use trellis_auth::SessionError;

pub mod compiler;
pub mod route;
pub mod stages;

pub use compiler::{CompiledRoute, build_routes, compile, register};
pub use route::{
    BodySchema, Handler, HandlerArgs, Method, PostprocessCheck, PreprocessCheck, RoleCheck,
    RouteDescription, handler, postprocess_check, preprocess_check,
};
pub use stages::{Flow, PipelineEnv, RequestContext, Stage};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("body validation failed: {0}")]
    Validation(String),

    #[error("role check failed for {area}/{action}")]
    RoleCheckFailed { area: String, action: String },

    #[error("preprocess check failed: {0}")]
    PreprocessCheckFailed(String),

    #[error("postprocess check failed: {0}")]
    PostprocessCheckFailed(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),
}
