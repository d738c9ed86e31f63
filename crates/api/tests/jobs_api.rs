//! HTTP-level tests for the `/api/v1/jobs` endpoints.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use bigshot_db::store::JobStore;
use bigshot_pipeline::{ProcessorRegistry, SourceError, SourceProcessor};
use common::{
    body_json, build_test_app, expect_json, get, get_auth, post_auth, post_json_auth, TestApp,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct StaticSource;

#[async_trait]
impl SourceProcessor for StaticSource {
    fn name(&self) -> &str {
        "crt.sh"
    }

    async fn process(
        &self,
        target: &str,
        _api_key: Option<&str>,
    ) -> Result<Vec<String>, SourceError> {
        Ok(vec![format!("www.{target}"), format!("api.{target}")])
    }
}

async fn get_ok(app: &TestApp, uri: &str) -> serde_json::Value {
    expect_json(get_auth(app.router.clone(), uri, &app.token).await, StatusCode::OK).await
}

async fn start_enumeration(app: &TestApp) -> i64 {
    let body = json!({ "type": "domain_enumeration", "domains": ["example.com"] });
    let response = post_json_auth(app.router.clone(), "/api/v1/jobs", body, &app.token).await;
    let json = expect_json(response, StatusCode::ACCEPTED).await;
    json["data"]["id"].as_i64().unwrap()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_without_token_are_401() {
    let app = build_test_app();

    let response = get(app.router.clone(), "/api/v1/jobs").await;
    let json = expect_json(response, StatusCode::UNAUTHORIZED).await;
    assert_eq!(json["code"], "UNAUTHORIZED");

    let response = get_auth(app.router, "/api/v1/jobs", "not-a-jwt").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_returns_pending_job_with_202() {
    let app = build_test_app();
    let body = json!({ "type": "domain_enumeration", "domains": ["Example.com"] });

    let response = post_json_auth(app.router.clone(), "/api/v1/jobs", body, &app.token).await;
    let json = expect_json(response, StatusCode::ACCEPTED).await;

    assert_eq!(json["data"]["status"], "pending");
    assert_eq!(json["data"]["progress"], 0);
    assert_eq!(json["data"]["type"], "domain_enumeration");
    assert_eq!(json["data"]["target"], "example.com");
    assert!(json["data"]["result"]["task_id"].is_string());
    assert_eq!(app.queue.len(), 1);
}

#[tokio::test]
async fn invalid_domain_is_400_and_creates_nothing() {
    let app = build_test_app();
    let body = json!({ "type": "domain_enumeration", "domains": ["not a domain"] });

    let response = post_json_auth(app.router.clone(), "/api/v1/jobs", body, &app.token).await;
    let json = expect_json(response, StatusCode::BAD_REQUEST).await;

    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(app.queue.is_empty());
    assert_eq!(app.jobs.stats().await.unwrap().total_jobs, 0);
}

#[tokio::test]
async fn empty_sources_fail_request_validation() {
    let app = build_test_app();
    let body = json!({
        "type": "domain_enumeration",
        "domains": ["example.com"],
        "sources": []
    });

    let response = post_json_auth(app.router, "/api/v1/jobs", body, &app.token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queue_outage_surfaces_as_503_and_fails_job() {
    let app = build_test_app();
    app.queue.set_accepting(false);
    let body = json!({ "type": "data_normalization" });

    let response = post_json_auth(app.router.clone(), "/api/v1/jobs", body, &app.token).await;
    let json = expect_json(response, StatusCode::SERVICE_UNAVAILABLE).await;
    assert_eq!(json["code"], "QUEUE_UNAVAILABLE");

    let response = get_auth(app.router, "/api/v1/jobs?status=failed", &app.token).await;
    let json = expect_json(response, StatusCode::OK).await;
    assert_eq!(json["data"]["total"], 1);
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_unknown_job_is_404() {
    let app = build_test_app();
    let response = get_auth(app.router, "/api/v1/jobs/999", &app.token).await;
    let json = expect_json(response, StatusCode::NOT_FOUND).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_filters_by_type_and_pages() {
    let app = build_test_app();
    start_enumeration(&app).await;
    let body = json!({ "type": "data_cleanup", "days_old": 10 });
    post_json_auth(app.router.clone(), "/api/v1/jobs", body, &app.token).await;

    let uri = "/api/v1/jobs?type=data_cleanup&per_page=10";
    let json = get_ok(&app, uri).await;
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["per_page"], 10);
    assert_eq!(json["data"]["items"][0]["type"], "data_cleanup");

    let json = get_ok(&app, "/api/v1/jobs").await;
    assert_eq!(json["data"]["total"], 2);
}

#[tokio::test]
async fn status_includes_live_task_state() {
    let app = build_test_app();
    let id = start_enumeration(&app).await;

    let uri = format!("/api/v1/jobs/{id}/status");
    let json = get_ok(&app, &uri).await;
    assert_eq!(json["data"]["id"], id);
    assert_eq!(json["data"]["status"], "pending");
    assert_eq!(json["data"]["task_status"]["state"], "queued");
    assert_eq!(json["data"]["task_status"]["ready"], false);
    assert!(json["data"]["estimated_completion"].is_null());

    let uri = format!("/api/v1/jobs/{id}/task-status");
    let json = get_ok(&app, &uri).await;
    assert_eq!(json["data"]["state"], "queued");
}

#[tokio::test]
async fn results_are_409_until_completed() {
    let app = build_test_app();
    let id = start_enumeration(&app).await;

    let uri = format!("/api/v1/jobs/{id}/results");
    let response = get_auth(app.router, &uri, &app.token).await;
    let json = expect_json(response, StatusCode::CONFLICT).await;
    assert_eq!(json["code"], "CONFLICT");
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn worker_completion_is_visible_through_api() {
    let app = build_test_app();
    let id = start_enumeration(&app).await;

    let worker = app.worker(ProcessorRegistry::new().register(Arc::new(StaticSource)));
    worker.run_next(&*app.queue).await.unwrap().unwrap();

    let uri = format!("/api/v1/jobs/{id}");
    let json = get_ok(&app, &uri).await;
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["progress"], 100);

    let uri = format!("/api/v1/jobs/{id}/results");
    let json = get_ok(&app, &uri).await;
    assert_eq!(json["data"]["outcome"]["kind"], "enumeration");
    assert_eq!(json["data"]["outcome"]["total_found"], 2);
    assert!(json["data"]["outcome"].get("task_id").is_none());

    let uri = format!("/api/v1/jobs/{id}/logs");
    let json = get_ok(&app, &uri).await;
    let logs = json["data"]["logs"].as_array().unwrap();
    assert!(logs.len() >= 3);
    assert!(logs.iter().all(|l| l["level"] == "INFO"));

    let json = get_ok(&app, "/api/v1/jobs/stats").await;
    assert_eq!(json["data"]["total_jobs"], 1);
    assert_eq!(json["data"]["by_status"]["completed"], 1);
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_pending_job_then_reject_second_cancel() {
    let app = build_test_app();
    let id = start_enumeration(&app).await;
    let uri = format!("/api/v1/jobs/{id}/cancel");

    let response = post_auth(app.router.clone(), &uri, &app.token).await;
    let json = expect_json(response, StatusCode::OK).await;
    assert_eq!(json["data"]["status"], "cancelled");
    assert_eq!(json["data"]["error_message"], "Job cancelled by user");

    let before = app.jobs.find_by_id(id).await.unwrap().unwrap();
    let response = post_auth(app.router.clone(), &uri, &app.token).await;
    let json = expect_json(response, StatusCode::CONFLICT).await;
    assert_eq!(json["code"], "CONFLICT");
    let after = app.jobs.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(before, after);

    let uri = format!("/api/v1/jobs/{id}/task-status");
    let json = body_json(get_auth(app.router, &uri, &app.token).await).await;
    assert_eq!(json["data"]["state"], "revoked");
}

#[tokio::test]
async fn cancel_unknown_job_is_404() {
    let app = build_test_app();
    let response = post_auth(app.router, "/api/v1/jobs/42/cancel", &app.token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
