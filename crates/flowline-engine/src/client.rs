//! HTTP client for the flow execution engine
//!
//! The engine owns flow execution and definition analysis; this layer talks
//! to it over a small JSON-over-HTTP surface.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use flowline_core::OrgId;

use crate::error::{EngineError, EngineResult};

/// Client interface to the flow execution engine
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Inspect a flow definition, returning its dependencies, results and
    /// any issues the engine found
    async fn flow_inspect(&self, org: Option<OrgId>, definition: &Value) -> EngineResult<Value>;

    /// Return a copy of a definition with its localization rewritten so
    /// `language` becomes the base language
    async fn flow_change_language(&self, definition: &Value, language: &str)
        -> EngineResult<Value>;

    /// Start a simulation session, returning the session and its events
    async fn sim_start(&self, payload: &Value) -> EngineResult<Value>;

    /// Resume a simulation session with user input
    async fn sim_resume(&self, payload: &Value) -> EngineResult<Value>;

    /// Extract a PO catalog of translatable texts from the given flow
    /// definitions
    async fn po_export(
        &self,
        org: OrgId,
        definitions: &[Value],
        language: &str,
    ) -> EngineResult<String>;

    /// Apply a PO catalog to the given flow definitions, returning the
    /// updated definitions
    async fn po_import(
        &self,
        org: OrgId,
        definitions: &[Value],
        catalog: &str,
        language: &str,
    ) -> EngineResult<Vec<Value>>;
}

/// HTTP implementation of [`EngineClient`]
#[derive(Debug, Clone)]
pub struct HttpEngineClient {
    /// Base URL of the engine, e.g. `http://localhost:8090`
    base_url: String,

    /// HTTP client
    client: Client,
}

impl HttpEngineClient {
    /// Create a new client for the engine at `base_url`
    pub fn new(base_url: &str) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::RequestFailed(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/mr/{}", self.base_url, path)
    }

    /// POST a JSON payload and parse the JSON response
    async fn post(&self, path: &str, payload: &Value) -> EngineResult<Value> {
        debug!(path, "calling engine");

        let response = self.client.post(self.url(path)).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::ResponseError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn flow_inspect(&self, org: Option<OrgId>, definition: &Value) -> EngineResult<Value> {
        let mut payload = json!({ "flow": definition });
        if let Some(org) = org {
            payload["org_id"] = json!(org.0);
        }

        self.post("flow/inspect", &payload).await
    }

    async fn flow_change_language(
        &self,
        definition: &Value,
        language: &str,
    ) -> EngineResult<Value> {
        self.post(
            "flow/change_language",
            &json!({ "flow": definition, "language": language }),
        )
        .await
    }

    async fn sim_start(&self, payload: &Value) -> EngineResult<Value> {
        self.post("sim/start", payload).await
    }

    async fn sim_resume(&self, payload: &Value) -> EngineResult<Value> {
        self.post("sim/resume", payload).await
    }

    async fn po_export(
        &self,
        org: OrgId,
        definitions: &[Value],
        language: &str,
    ) -> EngineResult<String> {
        let payload = json!({
            "org_id": org.0,
            "flows": definitions,
            "language": language,
        });

        let response = self
            .client
            .post(self.url("po/export"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::ResponseError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .text()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))
    }

    async fn po_import(
        &self,
        org: OrgId,
        definitions: &[Value],
        catalog: &str,
        language: &str,
    ) -> EngineResult<Vec<Value>> {
        let payload = json!({
            "org_id": org.0,
            "flows": definitions,
            "po": catalog,
            "language": language,
        });

        let result = self.post("po/import", &payload).await?;

        result["flows"]
            .as_array()
            .cloned()
            .ok_or_else(|| EngineError::InvalidResponse("Missing flows in response".to_string()))
    }
}
