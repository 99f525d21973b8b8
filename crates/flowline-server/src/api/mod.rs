//! API module for the Flowline server
//!
//! This module contains the API routes and handlers.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod flows;
pub mod health;

use crate::server::FlowlineServer;

/// Build the router for API endpoints
pub fn build_router(server: Arc<FlowlineServer>) -> Router {
    Router::new()
        // flow management
        .route(
            "/v1/orgs/:org/flows",
            get(flows::list_flows).post(flows::create_flow),
        )
        .route("/v1/orgs/:org/flows/archive", post(flows::archive_flows))
        .route("/v1/orgs/:org/flows/restore", post(flows::restore_flows))
        .route("/v1/orgs/:org/flows/label", post(flows::label_flows))
        .route(
            "/v1/flows/:id",
            get(flows::get_flow)
                .post(flows::update_flow)
                .delete(flows::delete_flow),
        )
        .route("/v1/flows/:id/copy", post(flows::copy_flow))
        // revisions
        .route(
            "/v1/flows/:id/revisions",
            get(flows::list_revisions).post(flows::save_revision),
        )
        .route("/v1/flows/:id/revisions/:revision", get(flows::get_revision))
        // starts and exports
        .route("/v1/flows/:id/start", post(flows::start_flow))
        .route("/v1/orgs/:org/starts", get(flows::list_starts))
        .route("/v1/orgs/:org/exports", post(flows::request_export))
        // simulation and languages
        .route("/v1/flows/:id/simulate/start", post(flows::simulate_start))
        .route("/v1/flows/:id/simulate/resume", post(flows::simulate_resume))
        .route("/v1/flows/:id/change_language", post(flows::change_language))
        .route(
            "/v1/flows/:id/translations",
            post(flows::import_translation),
        )
        .route(
            "/v1/flows/:id/translations/:language",
            get(flows::export_translation),
        )
        // run aggregates
        .route("/v1/flows/:id/activity", get(flows::flow_activity))
        .route("/v1/flows/:id/results", get(flows::result_counts))
        .route("/v1/flows/:id/runs", get(flows::list_runs))
        .route("/v1/runs/:id", delete(flows::delete_run))
        // health check
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}
