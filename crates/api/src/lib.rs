//! HTTP API: route pipeline, error translation and service wiring.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
pub mod pipeline;
