//! Declarative route table.

use trellis_infra::StorageAdapter;

use crate::app::services::AppServices;
use crate::pipeline::{BodySchema, RouteDescription, handler};

pub mod queries;
pub mod system;

/// Every pipeline-compiled endpoint. `/health` is mounted outside the pipeline.
pub fn table<A: StorageAdapter>() -> Vec<RouteDescription<AppServices<A>>> {
    vec![
        RouteDescription::get("/whoami", handler(system::whoami::<A>)),
        RouteDescription::post("/session/logout", handler(system::logout::<A>)),
        RouteDescription::get("/queries/:name", handler(queries::run::<A>))
            .with_role_check("queries", "execute"),
        RouteDescription::post("/queries/:name", handler(queries::run::<A>))
            .with_body_schema(BodySchema::of::<queries::QueryArgs>())
            .with_role_check("queries", "execute"),
    ]
}
