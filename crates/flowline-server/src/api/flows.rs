//! Handlers for the flow management endpoints

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use flowline_core::domain::flow::FlowType;
use flowline_core::domain::start::Recipients;
use flowline_core::{FlowId, OrgId, RunId};

use crate::api::errors::ApiError;
use crate::server::{ExportParams, FlowlineServer};

/// Query parameters for flow listings
#[derive(Debug, Deserialize)]
pub struct ListFlowsParams {
    /// List archived flows instead of active ones
    #[serde(default)]
    pub archived: bool,
}

/// Request body for creating a flow
#[derive(Debug, Deserialize)]
pub struct CreateFlowRequest {
    /// Flow name
    pub name: String,

    /// The kind of flow
    pub flow_type: FlowType,

    /// Language the flow is authored in
    #[serde(default = "default_base_language")]
    pub base_language: String,

    /// Keywords that should trigger the flow
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn default_base_language() -> String {
    "eng".to_string()
}

/// Request body for updating a flow
#[derive(Debug, Deserialize)]
pub struct UpdateFlowRequest {
    /// New name, if changing
    pub name: Option<String>,

    /// New keyword set, if changing
    pub keywords: Option<Vec<String>>,

    /// New run expiration in minutes, if changing
    pub expires_after_minutes: Option<u32>,
}

/// Request body for bulk flow operations
#[derive(Debug, Deserialize)]
pub struct BulkFlowsRequest {
    /// Flows to operate on
    pub flows: Vec<FlowId>,
}

/// Request body for labeling flows
#[derive(Debug, Deserialize)]
pub struct LabelFlowsRequest {
    /// Flows to operate on
    pub flows: Vec<FlowId>,

    /// The label to add or remove
    pub label: String,

    /// Whether to add (true) or remove (false) the label
    #[serde(default = "default_true")]
    pub add: bool,
}

fn default_true() -> bool {
    true
}

/// Request body for starting a flow
#[derive(Debug, Deserialize)]
pub struct StartFlowRequest {
    /// Who to start
    #[serde(flatten)]
    pub recipients: Recipients,

    /// Restart contacts already in this flow
    #[serde(default)]
    pub restart_participants: bool,

    /// Include contacts active in other flows
    #[serde(default)]
    pub include_active: bool,
}

/// Request body for a simulation resume
#[derive(Debug, Deserialize)]
pub struct SimResumeRequest {
    /// The session being resumed
    pub session: Value,

    /// The resume event
    pub resume: Value,
}

/// Request body for a translation import
#[derive(Debug, Deserialize)]
pub struct ImportTranslationRequest {
    /// The PO catalog contents
    pub catalog: String,
}

/// Request body for a language change preview
#[derive(Debug, Deserialize)]
pub struct ChangeLanguageRequest {
    /// The new base language
    pub language: String,
}

/// Query parameters for run listings
#[derive(Debug, Deserialize)]
pub struct ListRunsParams {
    /// Offset into the run listing
    #[serde(default)]
    pub offset: usize,
}

/// Identity header set by the authenticating proxy; defaults for local use
const USER_HEADER: &str = "x-flowline-user";

fn request_user(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

/// GET /v1/orgs/:org/flows
pub async fn list_flows(
    State(server): State<Arc<FlowlineServer>>,
    Path(org): Path<i64>,
    Query(params): Query<ListFlowsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let flows = server.list_flows(OrgId(org), params.archived).await?;
    Ok(Json(json!({ "flows": flows })))
}

/// POST /v1/orgs/:org/flows
pub async fn create_flow(
    State(server): State<Arc<FlowlineServer>>,
    Path(org): Path<i64>,
    headers: axum::http::HeaderMap,
    Json(request): Json<CreateFlowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flow = server
        .create_flow(
            OrgId(org),
            &request_user(&headers),
            &request.name,
            request.flow_type,
            &request.base_language,
            &request.keywords,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(flow)))
}

/// GET /v1/flows/:id
pub async fn get_flow(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let flow = server.get_flow(&FlowId(id)).await?;
    Ok(Json(flow))
}

/// POST /v1/flows/:id
pub async fn update_flow(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateFlowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flow = server
        .update_flow(
            &FlowId(id),
            request.name.as_deref(),
            request.keywords.as_deref(),
            request.expires_after_minutes,
        )
        .await?;
    Ok(Json(flow))
}

/// DELETE /v1/flows/:id
pub async fn delete_flow(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    server.delete_flow(&FlowId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/flows/:id/copy
pub async fn copy_flow(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let copy = server.copy_flow(&FlowId(id), &request_user(&headers)).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

/// POST /v1/orgs/:org/flows/archive
pub async fn archive_flows(
    State(server): State<Arc<FlowlineServer>>,
    Json(request): Json<BulkFlowsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flows = server.archive_flows(&request.flows).await?;
    Ok(Json(json!({ "flows": flows })))
}

/// POST /v1/orgs/:org/flows/restore
pub async fn restore_flows(
    State(server): State<Arc<FlowlineServer>>,
    Json(request): Json<BulkFlowsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flows = server.restore_flows(&request.flows).await?;
    Ok(Json(json!({ "flows": flows })))
}

/// POST /v1/orgs/:org/flows/label
pub async fn label_flows(
    State(server): State<Arc<FlowlineServer>>,
    Json(request): Json<LabelFlowsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    server
        .label_flows(&request.flows, &request.label, request.add)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/flows/:id/revisions
pub async fn list_revisions(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let revisions = server.list_revisions(&FlowId(id)).await?;
    Ok(Json(json!({ "results": revisions })))
}

/// GET /v1/flows/:id/revisions/:revision
pub async fn get_revision(
    State(server): State<Arc<FlowlineServer>>,
    Path((id, revision)): Path<(Uuid, u32)>,
) -> Result<impl IntoResponse, ApiError> {
    let definition = server.get_revision_definition(&FlowId(id), revision).await?;
    Ok(Json(json!({ "definition": definition })))
}

/// POST /v1/flows/:id/revisions
pub async fn save_revision(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
    headers: axum::http::HeaderMap,
    Json(definition): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let (flow, revision, issues) = server
        .save_revision(&FlowId(id), &request_user(&headers), definition)
        .await?;

    Ok(Json(json!({
        "revision": revision.as_summary(),
        "issues": issues,
        "metadata": flow.metadata,
    })))
}

/// POST /v1/flows/:id/start
pub async fn start_flow(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
    headers: axum::http::HeaderMap,
    Json(request): Json<StartFlowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let start = server
        .start_flow(
            &FlowId(id),
            &request_user(&headers),
            request.recipients,
            request.restart_participants,
            request.include_active,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(start)))
}

/// GET /v1/orgs/:org/starts
pub async fn list_starts(
    State(server): State<Arc<FlowlineServer>>,
    Path(org): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let starts = server.list_starts(OrgId(org)).await?;
    Ok(Json(json!({ "starts": starts })))
}

/// POST /v1/orgs/:org/exports
pub async fn request_export(
    State(server): State<Arc<FlowlineServer>>,
    Path(org): Path<i64>,
    headers: axum::http::HeaderMap,
    Json(params): Json<ExportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let export = server
        .request_export(OrgId(org), &request_user(&headers), params)
        .await?;
    Ok((StatusCode::CREATED, Json(export)))
}

/// POST /v1/flows/:id/simulate/start
pub async fn simulate_start(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
    Json(contact): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let session = server.simulate_start(&FlowId(id), contact).await?;
    Ok(Json(session))
}

/// POST /v1/flows/:id/simulate/resume
pub async fn simulate_resume(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SimResumeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = server
        .simulate_resume(&FlowId(id), request.session, request.resume)
        .await?;
    Ok(Json(session))
}

/// POST /v1/flows/:id/change_language
pub async fn change_language(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeLanguageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let definition = server.change_language(&FlowId(id), &request.language).await?;
    Ok(Json(json!({ "definition": definition })))
}

/// GET /v1/flows/:id/translations/:language
pub async fn export_translation(
    State(server): State<Arc<FlowlineServer>>,
    Path((id, language)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = server.export_translation(&FlowId(id), &language).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/x-gettext-translation")],
        catalog,
    ))
}

/// POST /v1/flows/:id/translations
pub async fn import_translation(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
    headers: axum::http::HeaderMap,
    Json(request): Json<ImportTranslationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (flow, revision) = server
        .import_translation(&FlowId(id), &request_user(&headers), &request.catalog)
        .await?;
    Ok(Json(json!({
        "revision": revision.as_summary(),
        "flow": flow,
    })))
}

/// GET /v1/flows/:id/activity
pub async fn flow_activity(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (chart, totals) = server.flow_activity(&FlowId(id)).await?;
    Ok(Json(json!({
        "chart": chart,
        "totals": totals,
        "completion_pct": totals.completion_pct(),
    })))
}

/// GET /v1/flows/:id/results
pub async fn result_counts(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let counts = server.result_counts(&FlowId(id)).await?;
    Ok(Json(json!({ "results": counts })))
}

/// GET /v1/flows/:id/runs
pub async fn list_runs(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
    Query(params): Query<ListRunsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let runs = server.list_runs(&FlowId(id), params.offset).await?;
    Ok(Json(json!({ "runs": runs })))
}

/// DELETE /v1/runs/:id
pub async fn delete_run(
    State(server): State<Arc<FlowlineServer>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    server.delete_run(&RunId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
