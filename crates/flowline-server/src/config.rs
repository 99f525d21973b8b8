//! Configuration for the Flowline server
//!
//! This module contains the configuration types and loading functionality.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// URL of the flow execution engine
    pub engine_url: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How many revisions a listing returns
    #[serde(default = "default_revision_limit")]
    pub revision_list_limit: usize,

    /// Page size for run listings
    #[serde(default = "default_run_page_size")]
    pub run_page_size: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_revision_limit() -> usize {
    100
}

fn default_run_page_size() -> usize {
    50
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        let mut config = Self::default();

        if let Ok(port) = env::var("SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.port = port;
            } else {
                warn!("Invalid SERVER_PORT value: {}", port);
            }
        }

        if let Ok(host) = env::var("SERVER_HOST") {
            config.bind_address = host;
        }

        if let Ok(engine_url) = env::var("ENGINE_URL") {
            config.engine_url = engine_url;
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.log_level = log_level;
        }

        if let Ok(limit) = env::var("REVISION_LIST_LIMIT") {
            if let Ok(limit) = limit.parse::<usize>() {
                config.revision_list_limit = limit;
            } else {
                warn!("Invalid REVISION_LIST_LIMIT value: {}", limit);
            }
        }

        if let Ok(size) = env::var("RUN_PAGE_SIZE") {
            if let Ok(size) = size.parse::<usize>() {
                config.run_page_size = size;
            } else {
                warn!("Invalid RUN_PAGE_SIZE value: {}", size);
            }
        }

        if config.engine_url.is_empty() {
            return Err(ServerError::ConfigError(
                "Engine URL is required".to_string(),
            ));
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            engine_url: String::new(),
            log_level: default_log_level(),
            revision_list_limit: default_revision_limit(),
            run_page_size: default_run_page_size(),
        }
    }
}
