use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use aggregator_core::store::Store;
use aggregator_core::transport::NoopTransport;
use aggregator_core::Service;
use aggregator_api::router::router;

fn service_with(db: PgPool) -> Service {
    Service::new(Store::from_pool(db), Arc::new(NoopTransport))
}

#[sqlx::test(migrations = "../migrations")]
async fn index_reports_the_service_name(db: PgPool) {
    let app = router(service_with(db), 100, false);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"event aggregator");
}

#[sqlx::test(migrations = "../migrations")]
async fn publish_sync_admits_and_reports_counts(db: PgPool) {
    let app = router(service_with(db), 100, false);

    let payload = r#"{"events": [
        {"topic":"orders","event_id":"e1","timestamp":"2024-01-01T00:00:00Z","source":"s","payload":{}},
        {"topic":"orders","event_id":"e1","timestamp":"2024-01-01T00:00:00Z","source":"s","payload":{}}
    ]}"#;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/publish?sync=true")
                .header("content-type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["received"], 2);
    assert_eq!(parsed["processed"], 1);
    assert_eq!(parsed["duplicates"], 1);
}

#[sqlx::test(migrations = "../migrations")]
async fn publish_accepts_a_bare_single_event(db: PgPool) {
    let app = router(service_with(db), 100, false);

    let payload =
        r#"{"topic":"orders","event_id":"e1","timestamp":"2024-01-01T00:00:00Z","source":"s","payload":{}}"#;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/publish?sync=true")
                .header("content-type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["received"], 1);
    assert_eq!(parsed["processed"], 1);
    assert_eq!(parsed["duplicates"], 0);
}

#[sqlx::test(migrations = "../migrations")]
async fn publish_async_reports_zero_counts_and_does_not_admit_immediately(db: PgPool) {
    let app = router(service_with(db.clone()), 100, false);

    let payload = r#"{"events": [
        {"topic":"orders","event_id":"e1","timestamp":"2024-01-01T00:00:00Z","source":"s","payload":{}}
    ]}"#;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/publish")
                .header("content-type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["received"], 1);
    assert_eq!(parsed["processed"], 0);
    assert_eq!(parsed["duplicates"], 0);

    // NoopTransport discards the publish, so the event never reaches the store.
    let store = Store::from_pool(db);
    assert_eq!(store.count_events(None).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../migrations")]
async fn publish_rejects_an_empty_batch(db: PgPool) {
    let app = router(service_with(db), 100, false);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/publish")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"events": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../migrations")]
async fn publish_rejects_a_bare_json_array(db: PgPool) {
    let app = router(service_with(db), 100, false);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/publish")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"[{"topic":"t","event_id":"e1","timestamp":"2024-01-01T00:00:00Z","source":"s"}]"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../migrations")]
async fn health_returns_ok_when_the_database_is_reachable(db: PgPool) {
    let app = router(service_with(db), 100, false);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
