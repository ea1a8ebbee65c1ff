//! HTTP application wiring.
//!
//! - `services.rs`: storage, session and access-policy wiring plus shutdown
//! - `routes/`: the declarative route table and its handlers
//! - `errors.rs`: the error translator and response payload

use std::sync::Arc;

use axum::{Router, routing::get};
use tower::ServiceBuilder;

use trellis_infra::StorageAdapter;

use crate::middleware;
use crate::pipeline::{PipelineEnv, RouteDescription, build_routes};

pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app<A: StorageAdapter>(services: Arc<AppServices<A>>) -> Router {
    build_app_with(services, routes::table())
}

/// Build the router for an explicit route table.
pub fn build_app_with<A: StorageAdapter>(
    services: Arc<AppServices<A>>,
    table: Vec<RouteDescription<AppServices<A>>>,
) -> Router {
    let env = PipelineEnv {
        sessions: Arc::clone(&services.sessions),
        access: Arc::clone(&services.access),
        state: services,
    };

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(build_routes(env, table))
        .fallback(routes::system::not_found)
        .method_not_allowed_fallback(routes::system::method_not_allowed)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        )))
}
