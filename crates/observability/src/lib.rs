//! Tracing/logging setup shared by every binary in the workspace.

pub mod subscriber;

pub use subscriber::{LogFormat, ObservabilityConfig};

/// Initialize process-wide tracing with the default configuration.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init(&ObservabilityConfig::from_env());
}

/// Initialize process-wide tracing with an explicit configuration.
pub fn init_with(config: &ObservabilityConfig) {
    subscriber::init(config);
}
