//!
//! Flowline Server - HTTP API for managing messaging flows
//!
//! This module exports all the components of the Flowline server.

use std::sync::Arc;

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Task queue module
pub mod queue;

/// Server module
pub mod server;

// Re-export key types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use queue::{MemoryTaskQueue, Task, TaskQueue};
pub use server::{FlowlineServer, Stores};

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    init_logging(&config);

    let engine = flowline_engine::HttpEngineClient::new(&config.engine_url)
        .map_err(|e| ServerError::ConfigError(e.to_string()))?;

    let server = FlowlineServer::new(
        config,
        Stores::in_memory(),
        Arc::new(engine),
        Arc::new(MemoryTaskQueue::new()),
    );

    server.run().await
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    fmt().with_env_filter(filter).with_target(true).init();
}
