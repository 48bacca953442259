//! Integration tests for the `/api/v1/jobs` resource.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post, post_multipart, products_csv};

async fn import_job(app: &common::TestApp, rows: usize) -> i64 {
    let csv = products_csv(rows);
    let response = post_multipart(
        app,
        "/api/v1/imports",
        Some(("products.csv", csv.as_bytes())),
        &[],
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    body_json(response).await["data"]["job_id"].as_i64().unwrap()
}

// ---------------------------------------------------------------------------
// GET /jobs/{id}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_reports_progress_fields() {
    let app = build_test_app();
    let job_id = import_job(&app, 4).await;

    let response = get(&app, &format!("/api/v1/jobs/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let data = body_json(response).await["data"].clone();
    assert_eq!(data["job_id"], job_id);
    assert_eq!(data["kind"], "import");
    assert_eq!(data["status"], "succeeded");
    assert_eq!(data["processed"], 4);
    assert_eq!(data["total"], 4);
    assert_eq!(data["percent"], 100);
    assert!(data["error"].is_null());
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = build_test_app();

    let response = get(&app, "/api/v1/jobs/9999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Job with id 9999 not found");
}

// ---------------------------------------------------------------------------
// GET /jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_is_newest_first_and_filterable() {
    let app = build_test_app();
    let first = import_job(&app, 1).await;
    let second = import_job(&app, 2).await;
    app.catalog.seed(3);
    let delete = common::delete_json(
        &app,
        "/api/v1/products",
        serde_json::json!({ "confirm_phrase": "DELETE ALL PRODUCTS" }),
    )
    .await;
    assert_eq!(delete.status(), StatusCode::OK);

    let all = body_json(get(&app, "/api/v1/jobs").await).await["data"].clone();
    let ids: Vec<i64> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|job| job["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(&ids[1..], &[second, first]);

    let imports = body_json(get(&app, "/api/v1/jobs?kind=import&limit=1").await).await;
    let imports = imports["data"].as_array().unwrap().clone();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0]["id"], second);

    let deletes = body_json(get(&app, "/api/v1/jobs?kind=delete").await).await;
    assert_eq!(deletes["data"][0]["strategy"], "synchronous");
}

#[tokio::test]
async fn invalid_list_filter_is_rejected() {
    let app = build_test_app();

    let response = get(&app, "/api/v1/jobs?status=exploded").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// POST /jobs/{id}/cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelling_a_terminal_job_is_a_noop() {
    let app = build_test_app();
    let job_id = import_job(&app, 2).await;

    let response = post(&app, &format!("/api/v1/jobs/{job_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let data = body_json(response).await["data"].clone();
    assert_eq!(data["status"], "succeeded");
    assert_eq!(data["processed"], 2);

    let job = app.coordinator.get_status(job_id).await.unwrap();
    assert_eq!(job.status.as_str(), "succeeded");
}

#[tokio::test]
async fn cancelling_unknown_job_is_not_found() {
    let app = build_test_app();

    let response = post(&app, "/api/v1/jobs/4242/cancel").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
