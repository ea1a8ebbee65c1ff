use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Identity;

use super::BoxFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Everything a handler receives.
pub struct HandlerArgs<S> {
    /// The validated body; `None` for GET routes and routes without a schema.
    pub body: Option<Value>,
    pub query: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub identity: Identity,
    /// The verified bearer token.
    pub token: String,
    pub state: Arc<S>,
}

pub type Handler<S> =
    Arc<dyn Fn(HandlerArgs<S>) -> BoxFuture<'static, anyhow::Result<Option<Value>>> + Send + Sync>;

pub type PreprocessCheck = Arc<dyn Fn(Identity) -> BoxFuture<'static, bool> + Send + Sync>;

pub type PostprocessCheck =
    Arc<dyn Fn(Identity, Option<Value>) -> BoxFuture<'static, bool> + Send + Sync>;

pub fn handler<S, F, Fut>(f: F) -> Handler<S>
where
    S: 'static,
    F: Fn(HandlerArgs<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    Arc::new(move |args| -> BoxFuture<'static, anyhow::Result<Option<Value>>> {
        Box::pin(f(args))
    })
}

pub fn preprocess_check<F, Fut>(f: F) -> PreprocessCheck
where
    F: Fn(Identity) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(move |identity| -> BoxFuture<'static, bool> { Box::pin(f(identity)) })
}

pub fn postprocess_check<F, Fut>(f: F) -> PostprocessCheck
where
    F: Fn(Identity, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(move |identity, response| -> BoxFuture<'static, bool> {
        Box::pin(f(identity, response))
    })
}

/// A request body shape, expressed as a Rust type.
///
/// Validation deserializes the body into the type and serializes it back,
/// so the handler sees the normalized body (unknown keys dropped).
#[derive(Clone, Copy)]
pub struct BodySchema {
    name: &'static str,
    validate: fn(Value) -> Result<Value, String>,
}

impl BodySchema {
    pub fn of<T: DeserializeOwned + Serialize>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            validate: validate_as::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn validate(&self, body: Value) -> Result<Value, String> {
        (self.validate)(body)
    }
}

impl core::fmt::Debug for BodySchema {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("BodySchema").field(&self.name).finish()
    }
}

fn validate_as<T: DeserializeOwned + Serialize>(body: Value) -> Result<Value, String> {
    let parsed: T = serde_json::from_value(body).map_err(|e| e.to_string())?;
    serde_json::to_value(parsed).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCheck {
    pub area: String,
    pub action: String,
}

/// Declarative description of one endpoint. Immutable once compiled.
pub struct RouteDescription<S> {
    pub path: String,
    pub method: Method,
    pub handler: Handler<S>,
    pub body_schema: Option<BodySchema>,
    pub preprocess: Vec<(String, PreprocessCheck)>,
    pub postprocess: Vec<(String, PostprocessCheck)>,
    pub role_check: Option<RoleCheck>,
}

impl<S> RouteDescription<S> {
    pub fn new(method: Method, path: impl Into<String>, handler: Handler<S>) -> Self {
        Self {
            path: path.into(),
            method,
            handler,
            body_schema: None,
            preprocess: Vec::new(),
            postprocess: Vec::new(),
            role_check: None,
        }
    }

    pub fn get(path: impl Into<String>, handler: Handler<S>) -> Self {
        Self::new(Method::Get, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: Handler<S>) -> Self {
        Self::new(Method::Post, path, handler)
    }

    pub fn put(path: impl Into<String>, handler: Handler<S>) -> Self {
        Self::new(Method::Put, path, handler)
    }

    pub fn delete(path: impl Into<String>, handler: Handler<S>) -> Self {
        Self::new(Method::Delete, path, handler)
    }

    pub fn with_body_schema(mut self, schema: BodySchema) -> Self {
        self.body_schema = Some(schema);
        self
    }

    pub fn with_role_check(mut self, area: impl Into<String>, action: impl Into<String>) -> Self {
        self.role_check = Some(RoleCheck {
            area: area.into(),
            action: action.into(),
        });
        self
    }

    pub fn with_preprocess(mut self, name: impl Into<String>, check: PreprocessCheck) -> Self {
        self.preprocess.push((name.into(), check));
        self
    }

    pub fn with_postprocess(mut self, name: impl Into<String>, check: PostprocessCheck) -> Self {
        self.postprocess.push((name.into(), check));
        self
    }
}
