//! Integration tests for crm-pipeline API endpoints
//!
//! Tests cover:
//! - Health and build info endpoints
//! - Lead creation, public capture, listing, editing and deletion
//! - Status changes feeding the pipeline aggregate
//! - Pipeline stage reads, summary, and the recalculation endpoint
//! - Error responses for malformed input and unknown resources
//! - Aggregate store failures after the lead is saved
//! - The SSE event stream

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use crm_common::db::init_database;
use crm_common::events::EventBus;
use crm_pipeline::{build_router, AppState};
use futures::StreamExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: router over a fresh database, plus the pool behind it
async fn setup_app_with_pool() -> (TempDir, SqlitePool, axum::Router) {
    let dir = TempDir::new().expect("Should create temp dir");
    let pool = init_database(&dir.path().join("crm.db"))
        .await
        .expect("Should initialize database");
    let state = AppState::new(pool.clone(), EventBus::new(16));
    (dir, pool, build_router(state))
}

/// Test helper: router over a fresh database (keep the TempDir alive)
async fn setup_app() -> (TempDir, axum::Router) {
    let (dir, _pool, app) = setup_app_with_pool().await;
    (dir, app)
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Test helper: send a request and return status plus JSON body
async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, body)
}

fn lead_body(status: &str, budget: f64) -> Value {
    json!({
        "company_name": "Acme Corp",
        "contact_name": "Jane Doe",
        "email": "jane@acme.test",
        "status": status,
        "source": "referral",
        "preferences": { "budget": budget, "timeline": "Q3", "interests": ["crm"] }
    })
}

async fn create_lead(app: &axum::Router, status: &str, budget: f64) -> Value {
    let (code, body) = send(app, json_request("POST", "/api/leads", lead_body(status, budget))).await;
    assert_eq!(code, StatusCode::CREATED);
    body
}

async fn stage(app: &axum::Router, name: &str) -> (StatusCode, Value) {
    send(app, test_request("GET", &format!("/api/pipeline/{}", name))).await
}

// =============================================================================
// Health and build info
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app) = setup_app().await;

    let response = app.oneshot(test_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "crm-pipeline");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_buildinfo_endpoint() {
    let (_dir, app) = setup_app().await;

    let (status, body) = send(&app, test_request("GET", "/api/buildinfo")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
    assert!(body["git_hash"].is_string());
}

// =============================================================================
// Lead creation
// =============================================================================

#[tokio::test]
async fn test_create_lead_counts_into_stage() {
    let (_dir, app) = setup_app().await;

    let lead = create_lead(&app, "qualified", 5000.0).await;
    assert_eq!(lead["status"], "qualified");
    assert_eq!(lead["source"], "referral");
    assert!(lead["id"].is_string());

    let (status, row) = stage(&app, "qualified").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["count"], 1);
    assert_eq!(row["value"], 5000.0);
    assert_eq!(row["metrics"]["average_deal_size"], 5000.0);
    assert_eq!(row["metrics"]["average_time_in_stage"], Value::Null);
}

#[tokio::test]
async fn test_create_lead_defaults_to_new() {
    let (_dir, app) = setup_app().await;

    let body = json!({
        "company_name": "Globex",
        "contact_name": "Hank Scorpio",
        "email": "hank@globex.test"
    });
    let (status, lead) = send(&app, json_request("POST", "/api/leads", body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lead["status"], "new");

    let (_, row) = stage(&app, "new").await;
    assert_eq!(row["count"], 1);
    assert_eq!(row["value"], 0.0);
}

#[tokio::test]
async fn test_public_capture_enters_as_new() {
    let (_dir, app) = setup_app().await;

    let form = json!({
        "company_name": "Initech",
        "contact_name": "Bill Lumbergh",
        "email": "bill@initech.test",
        "message": "Please call back",
        "preferences": { "budget": 120.0 }
    });
    let (status, lead) = send(&app, json_request("POST", "/api/public/leads", form)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lead["status"], "new");
    assert_eq!(lead["source"], "website");
    assert_eq!(lead["notes"], "Please call back");

    let (_, row) = stage(&app, "new").await;
    assert_eq!(row["count"], 1);
    assert_eq!(row["value"], 120.0);
}

#[tokio::test]
async fn test_create_lead_invalid_email() {
    let (_dir, app) = setup_app().await;

    let mut body = lead_body("new", 10.0);
    body["email"] = json!("not-an-email");
    let (status, error) = send(&app, json_request("POST", "/api/leads", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "BAD_REQUEST");

    // Nothing was counted
    let (status, _) = stage(&app, "new").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_lead_negative_budget_rejected() {
    let (_dir, app) = setup_app().await;

    let (status, _) = send(&app, json_request("POST", "/api/leads", lead_body("new", -5.0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_lead_unknown_status_rejected() {
    let (_dir, app) = setup_app().await;

    let (status, body) =
        send(&app, json_request("POST", "/api/leads", lead_body("archived", 1.0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_create_lead_oversized_budget_rejected() {
    let (_dir, app) = setup_app().await;

    let (status, body) =
        send(&app, json_request("POST", "/api/leads", lead_body("new", 1e308))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = stage(&app, "new").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_aggregate_failure_keeps_lead() {
    let (_dir, pool, app) = setup_app_with_pool().await;
    sqlx::query("DROP TABLE pipeline_stages")
        .execute(&pool)
        .await
        .unwrap();

    let (status, body) =
        send(&app, json_request("POST", "/api/leads", lead_body("qualified", 10.0))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "DATABASE_ERROR");

    // The lead write is not rolled back
    let (status, page) = send(&app, test_request("GET", "/api/leads")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_results"], 1);
    assert_eq!(page["leads"][0]["status"], "qualified");
}

#[tokio::test]
async fn test_create_lead_malformed_json() {
    let (_dir, app) = setup_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/leads")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Status changes
// =============================================================================

#[tokio::test]
async fn test_status_change_increments_new_stage_only() {
    let (_dir, app) = setup_app().await;

    let lead = create_lead(&app, "qualified", 300.0).await;
    let id = lead["id"].as_str().unwrap();

    let (status, updated) = send(
        &app,
        json_request("PUT", &format!("/api/leads/{}/status", id), json!({ "status": "proposal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "proposal");

    // Cumulative: the earlier stage keeps its contribution
    let (_, qualified) = stage(&app, "qualified").await;
    assert_eq!(qualified["count"], 1);
    assert_eq!(qualified["value"], 300.0);
    assert_eq!(qualified["conversion_rate"], 100.0);

    let (_, proposal) = stage(&app, "proposal").await;
    assert_eq!(proposal["count"], 1);
    assert_eq!(proposal["value"], 300.0);
}

#[tokio::test]
async fn test_same_status_is_noop() {
    let (_dir, app) = setup_app().await;

    let lead = create_lead(&app, "contacted", 50.0).await;
    let id = lead["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        json_request("PUT", &format!("/api/leads/{}/status", id), json!({ "status": "contacted" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, row) = stage(&app, "contacted").await;
    assert_eq!(row["count"], 1);
}

#[tokio::test]
async fn test_closing_lead_sets_win_rate() {
    let (_dir, app) = setup_app().await;

    let lead = create_lead(&app, "negotiation", 900.0).await;
    let id = lead["id"].as_str().unwrap();
    send(
        &app,
        json_request("PUT", &format!("/api/leads/{}/status", id), json!({ "status": "closed_won" })),
    )
    .await;

    let (_, won) = stage(&app, "closed_won").await;
    assert_eq!(won["metrics"]["win_rate"], 100.0);
    assert_eq!(won["metrics"]["loss_rate"], 0.0);

    let (_, negotiation) = stage(&app, "negotiation").await;
    assert_eq!(negotiation["metrics"]["win_rate"], 0.0);
}

#[tokio::test]
async fn test_status_change_unknown_lead() {
    let (_dir, app) = setup_app().await;

    let uri = format!("/api/leads/{}/status", uuid::Uuid::new_v4());
    let (status, body) = send(&app, json_request("PUT", &uri, json!({ "status": "contacted" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_manual_edit_cannot_change_status() {
    let (_dir, app) = setup_app().await;

    let lead = create_lead(&app, "new", 10.0).await;
    let id = lead["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        json_request("PUT", &format!("/api/leads/{}", id), json!({ "status": "closed_won" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Lead reads, edits, deletes
// =============================================================================

#[tokio::test]
async fn test_manual_edit_leaves_pipeline_untouched() {
    let (_dir, app) = setup_app().await;

    let lead = create_lead(&app, "new", 10.0).await;
    let id = lead["id"].as_str().unwrap();

    let (status, updated) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/leads/{}", id),
            json!({ "score": 80, "preferences": { "budget": 9999.0 } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["score"], 80);

    let (_, row) = stage(&app, "new").await;
    assert_eq!(row["count"], 1);
    assert_eq!(row["value"], 10.0);
}

#[tokio::test]
async fn test_get_and_delete_lead() {
    let (_dir, app) = setup_app().await;

    let lead = create_lead(&app, "new", 10.0).await;
    let uri = format!("/api/leads/{}", lead["id"].as_str().unwrap());

    let (status, fetched) = send(&app, test_request("GET", &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["email"], "jane@acme.test");
    assert_eq!(fetched["preferences"]["interests"][0], "crm");

    let (status, _) = send(&app, test_request("DELETE", &uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, test_request("GET", &uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Past contributions remain
    let (_, row) = stage(&app, "new").await;
    assert_eq!(row["count"], 1);
}

#[tokio::test]
async fn test_list_leads_with_filter() {
    let (_dir, app) = setup_app().await;

    create_lead(&app, "new", 1.0).await;
    create_lead(&app, "new", 2.0).await;
    create_lead(&app, "contacted", 3.0).await;

    let (status, page) = send(&app, test_request("GET", "/api/leads?page=0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_results"], 3);
    assert_eq!(page["page"], 1);
    assert_eq!(page["page_size"], 100);
    assert_eq!(page["leads"].as_array().unwrap().len(), 3);

    let (_, page) = send(&app, test_request("GET", "/api/leads?status=new")).await;
    assert_eq!(page["total_results"], 2);
    assert!(page["leads"]
        .as_array()
        .unwrap()
        .iter()
        .all(|l| l["status"] == "new"));
}

#[tokio::test]
async fn test_list_leads_unknown_status_filter() {
    let (_dir, app) = setup_app().await;

    let (status, body) = send(&app, test_request("GET", "/api/leads?status=bogus")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_malformed_lead_id() {
    let (_dir, app) = setup_app().await;

    let (status, body) = send(&app, test_request("GET", "/api/leads/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = send(
        &app,
        json_request("PUT", "/api/leads/not-a-uuid/status", json!({ "status": "contacted" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

// =============================================================================
// Event stream
// =============================================================================

#[tokio::test]
async fn test_event_stream_sends_connection_status() {
    let (_dir, app) = setup_app().await;

    let response = app.oneshot(test_request("GET", "/api/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let mut stream = response.into_body().into_data_stream();
    let first = tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
        .await
        .expect("Should receive first event")
        .expect("Stream should not end")
        .expect("Should read chunk");
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("event: ConnectionStatus"));
    assert!(text.contains("data: connected"));
}

// =============================================================================
// Pipeline endpoints
// =============================================================================

#[tokio::test]
async fn test_pipeline_list_in_stage_order() {
    let (_dir, app) = setup_app().await;

    create_lead(&app, "proposal", 1.0).await;
    create_lead(&app, "new", 1.0).await;
    create_lead(&app, "new", 1.0).await;
    create_lead(&app, "contacted", 1.0).await;

    let (status, body) = send(&app, test_request("GET", "/api/pipeline")).await;
    assert_eq!(status, StatusCode::OK);

    let stages: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["stage"].as_str().unwrap())
        .collect();
    assert_eq!(stages, vec!["new", "contacted", "proposal"]);
    assert_eq!(body[0]["conversion_rate"], 50.0);
    assert_eq!(body[1]["conversion_rate"], 100.0);
}

#[tokio::test]
async fn test_get_stage_invalid_name() {
    let (_dir, app) = setup_app().await;

    let (status, _) = stage(&app, "archived").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recalculate_empty_store() {
    let (_dir, app) = setup_app().await;

    for uri in [
        "/pipeline/recalculate/conversion-rates",
        "/api/pipeline/recalculate/conversion-rates",
    ] {
        let (status, body) = send(&app, test_request("PUT", uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stages"], json!([]));
    }
}

#[tokio::test]
async fn test_recalculate_returns_rates() {
    let (_dir, app) = setup_app().await;

    for _ in 0..4 {
        create_lead(&app, "new", 1.0).await;
    }
    create_lead(&app, "contacted", 1.0).await;

    let (status, body) = send(
        &app,
        test_request("PUT", "/pipeline/recalculate/conversion-rates"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stages"][0]["stage"], "new");
    assert_eq!(body["stages"][0]["conversion_rate"], 25.0);
}

#[tokio::test]
async fn test_summary_shows_cumulative_and_current() {
    let (_dir, app) = setup_app().await;

    let lead = create_lead(&app, "new", 100.0).await;
    create_lead(&app, "new", 50.0).await;
    let id = lead["id"].as_str().unwrap();
    send(
        &app,
        json_request("PUT", &format!("/api/leads/{}/status", id), json!({ "status": "closed_lost" })),
    )
    .await;

    let (status, summary) = send(&app, test_request("GET", "/api/pipeline/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_stage_visits"], 3);
    assert_eq!(summary["current_leads"], 2);
    assert_eq!(summary["open_leads"], 1);
    assert_eq!(summary["lost_leads"], 1);
    assert_eq!(summary["win_rate"], 0.0);
    assert_eq!(summary["stages"].as_array().unwrap().len(), 7);
    assert_eq!(summary["stages"][0]["stage_visits"], 2);
    assert_eq!(summary["stages"][0]["current_leads"], 1);
}
