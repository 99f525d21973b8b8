//! Integration tests for the HTTP API

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use flowline_core::domain::repository::WorkspaceRepository;
use flowline_core::domain::workspace::Workspace;
use flowline_core::OrgId;
use flowline_engine::{EngineClient, EngineResult};
use flowline_server::{api, FlowlineServer, MemoryTaskQueue, ServerConfig, Stores};

/// Engine stub with canned responses
struct StubEngine;

#[async_trait]
impl EngineClient for StubEngine {
    async fn flow_inspect(&self, _org: Option<OrgId>, _definition: &Value) -> EngineResult<Value> {
        Ok(json!({"results": [], "dependencies": [], "waiting_exits": [], "issues": []}))
    }

    async fn flow_change_language(
        &self,
        definition: &Value,
        language: &str,
    ) -> EngineResult<Value> {
        let mut rewritten = definition.clone();
        rewritten["language"] = json!(language);
        Ok(rewritten)
    }

    async fn sim_start(&self, _payload: &Value) -> EngineResult<Value> {
        Ok(json!({"session": {"status": "waiting"}, "events": []}))
    }

    async fn sim_resume(&self, _payload: &Value) -> EngineResult<Value> {
        Ok(json!({"session": {"status": "waiting"}, "events": []}))
    }

    async fn po_export(
        &self,
        _org: OrgId,
        _definitions: &[Value],
        _language: &str,
    ) -> EngineResult<String> {
        Ok("msgid \"Red\"\nmsgstr \"Rouge\"\n".to_string())
    }

    async fn po_import(
        &self,
        _org: OrgId,
        definitions: &[Value],
        _catalog: &str,
        _language: &str,
    ) -> EngineResult<Vec<Value>> {
        Ok(definitions.to_vec())
    }
}

async fn setup_router() -> axum::Router {
    let stores = Stores::in_memory();

    let mut workspace = Workspace::new(OrgId(1), "Nyaruka");
    workspace.primary_language = Some("eng".to_string());
    workspace.languages = vec!["eng".to_string(), "fra".to_string()];
    stores.workspaces.save(&workspace).await.unwrap();

    let server = FlowlineServer::new(
        ServerConfig::default(),
        stores,
        Arc::new(StubEngine),
        Arc::new(MemoryTaskQueue::new()),
    );
    api::build_router(Arc::new(server))
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-flowline-user", "admin")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let router = setup_router().await;

    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn test_flow_lifecycle() {
    let router = setup_router().await;

    // create
    let (status, flow) = send(
        &router,
        post(
            "/v1/orgs/1/flows",
            json!({"name": "Color Flow", "flow_type": "message", "keywords": ["color"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let flow_id = flow["id"].as_str().unwrap().to_string();

    // fetch
    let (status, fetched) = send(&router, get(&format!("/v1/flows/{}", flow_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], json!("Color Flow"));

    // list
    let (status, listing) = send(&router, get("/v1/orgs/1/flows")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["flows"].as_array().unwrap().len(), 1);

    // a duplicate name is a validation error
    let (status, body) = send(
        &router,
        post(
            "/v1/orgs/1/flows",
            json!({"name": "color flow", "flow_type": "message"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errorDetails"]["errorCode"],
        json!("ERR_VALIDATION")
    );

    // revisions listing has the initial revision
    let (status, revisions) =
        send(&router, get(&format!("/v1/flows/{}/revisions", flow_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revisions["results"].as_array().unwrap().len(), 1);

    // unknown flows are 404s
    let (status, _) = send(
        &router,
        get("/v1/flows/a97f9c55-6bbb-44a8-9b93-8eacf1bb6e78"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_start_flow_endpoint() {
    let router = setup_router().await;

    let (_, flow) = send(
        &router,
        post(
            "/v1/orgs/1/flows",
            json!({"name": "Color Flow", "flow_type": "message"}),
        ),
    )
    .await;
    let flow_id = flow["id"].as_str().unwrap().to_string();
    let uri = format!("/v1/flows/{}/start", flow_id);

    // an empty selection is rejected
    let (status, _) = send(
        &router,
        post(&uri, json!({"mode": "selection", "contacts": [], "groups": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // a real selection is accepted
    let (status, start) = send(
        &router,
        post(
            &uri,
            json!({
                "mode": "selection",
                "contacts": ["59083c26-0b62-4d30-9d17-c35b1d0c3d48"],
                "groups": [],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(start["status"], json!("pending"));

    // the pending start blocks another
    let (status, body) = send(
        &router,
        post(
            &uri,
            json!({
                "mode": "selection",
                "contacts": ["59083c26-0b62-4d30-9d17-c35b1d0c3d48"],
                "groups": [],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["errorDetails"]["errorCode"],
        json!("ERR_ALREADY_STARTING")
    );
}

#[tokio::test]
async fn test_save_revision_endpoint() {
    let router = setup_router().await;

    let (_, flow) = send(
        &router,
        post(
            "/v1/orgs/1/flows",
            json!({"name": "Color Flow", "flow_type": "message"}),
        ),
    )
    .await;
    let flow_id = flow["id"].as_str().unwrap().to_string();
    let uri = format!("/v1/flows/{}/revisions", flow_id);

    let (status, saved) = send(
        &router,
        post(&uri, json!({"spec_version": "13.1", "revision": 1, "nodes": []})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["revision"]["revision"], json!(2));

    // a save against a stale revision from another editor conflicts
    let request = Request::builder()
        .method("POST")
        .uri(&uri)
        .header("content-type", "application/json")
        .header("x-flowline-user", "editor")
        .body(Body::from(
            json!({"spec_version": "13.1", "revision": 1, "nodes": []}).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["errorDetails"]["errorCode"],
        json!("ERR_USER_CONFLICT")
    );
}

#[tokio::test]
async fn test_translation_endpoints() {
    let router = setup_router().await;

    let (_, flow) = send(
        &router,
        post(
            "/v1/orgs/1/flows",
            json!({"name": "Color Flow", "flow_type": "message"}),
        ),
    )
    .await;
    let flow_id = flow["id"].as_str().unwrap().to_string();

    // export returns the raw catalog
    let response = router
        .clone()
        .oneshot(get(&format!("/v1/flows/{}/translations/fra", flow_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("msgid \"Red\""));

    // import validates the catalog language
    let (status, _) = send(
        &router,
        post(
            &format!("/v1/flows/{}/translations", flow_id),
            json!({"catalog": "msgid \"\"\nmsgstr \"\"\n\"Language: eng\\n\"\n"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, imported) = send(
        &router,
        post(
            &format!("/v1/flows/{}/translations", flow_id),
            json!({"catalog": "msgid \"\"\nmsgstr \"\"\n\"Language: fra\\n\"\n"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(imported["revision"]["revision"], json!(2));
}
