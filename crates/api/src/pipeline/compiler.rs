use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use tracing::{debug, info};

use crate::app::errors::{ApiError, translate};
use crate::context::RequestId;

use super::route::{Method, RouteDescription};
use super::stages::{
    BodyValidation, Flow, HandlerStage, PipelineEnv, PostprocessChecks, PreprocessChecks,
    RequestContext, RoleCheckStage, SendStage, SessionStage, Stage,
};

/// A route description turned into its fixed stage sequence.
///
/// Built once at startup and shared by every matching request.
pub struct CompiledRoute<S: Send + Sync + 'static> {
    method: Method,
    path: String,
    stages: Vec<Box<dyn Stage<S>>>,
    env: PipelineEnv<S>,
}

impl<S: Send + Sync + 'static> CompiledRoute<S> {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run the stages in order. The first failure is handed to the error
    /// translator and ends the request.
    pub async fn dispatch(&self, mut ctx: RequestContext) -> Response {
        for stage in &self.stages {
            match stage.run(&mut ctx, &self.env).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Respond(response)) => return response,
                Err(err) => {
                    debug!(stage = stage.name(), path = %self.path, "pipeline short-circuited");
                    return translate(&err).into_response();
                }
            }
        }

        // Unreachable with a compiled stage list: `send` always answers.
        StatusCode::OK.into_response()
    }
}

pub fn compile<S: Send + Sync + 'static>(
    route: RouteDescription<S>,
    env: PipelineEnv<S>,
) -> CompiledRoute<S> {
    let RouteDescription {
        path,
        method,
        handler,
        body_schema,
        preprocess,
        postprocess,
        role_check,
    } = route;

    let mut stages: Vec<Box<dyn Stage<S>>> = Vec::new();

    if let Some(schema) = body_schema.filter(|_| method != Method::Get) {
        stages.push(Box::new(BodyValidation::new(schema)));
    }
    if let Some(check) = role_check {
        stages.push(Box::new(RoleCheckStage::new(check)));
    }
    if !preprocess.is_empty() {
        stages.push(Box::new(PreprocessChecks::new(preprocess)));
    }
    stages.push(Box::new(SessionStage));
    stages.push(Box::new(HandlerStage::new(handler)));
    if !postprocess.is_empty() {
        stages.push(Box::new(PostprocessChecks::new(postprocess)));
    }
    stages.push(Box::new(SendStage));

    let compiled = CompiledRoute {
        method,
        path,
        stages,
        env,
    };
    info!(
        method = compiled.method.as_str(),
        path = %compiled.path,
        stages = ?compiled.stage_names(),
        "route compiled"
    );
    compiled
}

/// Mount a compiled route on `router` under its own method and path.
pub fn register<S: Send + Sync + 'static>(router: Router, route: CompiledRoute<S>) -> Router {
    let route = Arc::new(route);
    let path = route.path.clone();
    let method = route.method;

    let endpoint = move |params: Option<Path<HashMap<String, String>>>,
                         Query(query): Query<HashMap<String, String>>,
                         request_id: Option<Extension<RequestId>>,
                         headers: HeaderMap,
                         body: Result<Bytes, BytesRejection>| {
        let route = Arc::clone(&route);
        async move {
            let body = match body {
                Ok(body) => body,
                Err(rejection) => {
                    debug!(path = %route.path, %rejection, "request body rejected");
                    return ApiError::from(&rejection).into_response();
                }
            };
            let ctx = RequestContext::new(route.method, route.path.clone())
                .with_request_id(request_id.map(|Extension(id)| id))
                .with_headers(headers)
                .with_query(query)
                .with_params(params.map(|Path(p)| p).unwrap_or_default())
                .with_raw_body(body);
            route.dispatch(ctx).await
        }
    };

    let method_router = match method {
        Method::Get => get(endpoint),
        Method::Post => post(endpoint),
        Method::Put => put(endpoint),
        Method::Delete => delete(endpoint),
    };
    router.route(&path, method_router)
}

/// Compile and register a whole route table.
pub fn build_routes<S: Send + Sync + 'static>(
    env: PipelineEnv<S>,
    routes: Vec<RouteDescription<S>>,
) -> Router {
    routes.into_iter().fold(Router::new(), |router, route| {
        register(router, compile(route, env.clone()))
    })
}
