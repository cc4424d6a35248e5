//! Recording CRUD endpoints

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use tower::ServiceExt;
use uuid::Uuid;

use common::{response_json, test_app};
use medscribe::build_router;
use medscribe::db::recordings::insert_recording;
use medscribe::models::{RecordingMetadata, RecordingRecord};

fn record(user: Option<&str>, age_secs: i64) -> RecordingRecord {
    RecordingRecord {
        id: Uuid::new_v4().to_string(),
        filename: "f.m4a".to_string(),
        path: "audio/f.m4a".to_string(),
        storage_url: "http://blob.test/audio/f.m4a".to_string(),
        size_bytes: 42,
        uploaded_at: Utc::now() - Duration::seconds(age_secs),
        transcript: Some("transcript".to_string()),
        report: Some("report".to_string()),
        user_id: user.map(str::to_string),
        metadata: RecordingMetadata {
            original_filename: "visit.m4a".to_string(),
            mime_type: "audio/mp4".to_string(),
            from_chunks: false,
            chunks: None,
        },
    }
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn list_is_newest_first_with_count_and_timestamp() {
    let app = test_app().await;
    let newer = record(Some("alice"), 0);
    let older = record(Some("alice"), 120);
    for r in [&older, &newer] {
        insert_recording(&app.state.db, r).await.unwrap();
    }
    let router = build_router(app.state.clone());

    let response = router.oneshot(request("GET", "/recordings")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);
    assert_eq!(body["recordings"][0]["id"], newer.id.as_str());
    assert_eq!(body["recordings"][1]["id"], older.id.as_str());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn list_filters_by_user() {
    let app = test_app().await;
    insert_recording(&app.state.db, &record(Some("alice"), 0))
        .await
        .unwrap();
    insert_recording(&app.state.db, &record(Some("bob"), 0))
        .await
        .unwrap();
    let router = build_router(app.state.clone());

    let response = router
        .oneshot(request("GET", "/recordings?userId=bob"))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["recordings"][0]["userId"], "bob");
}

#[tokio::test]
async fn get_unknown_recording_is_404() {
    let app = test_app().await;
    let router = build_router(app.state.clone());

    let response = router
        .oneshot(request("GET", "/recordings/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn delete_removes_exactly_one_recording() {
    let app = test_app().await;
    let keep = record(None, 0);
    let gone = record(None, 0);
    for r in [&keep, &gone] {
        insert_recording(&app.state.db, r).await.unwrap();
    }
    let router = build_router(app.state.clone());

    let response = router
        .clone()
        .oneshot(request("DELETE", &format!("/recordings/{}", gone.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Deleting it again is a 404
    let response = router
        .clone()
        .oneshot(request("DELETE", &format!("/recordings/{}", gone.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router.oneshot(request("GET", "/recordings")).await.unwrap();
    let body = response_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["recordings"][0]["id"], keep.id.as_str());
}

#[tokio::test]
async fn delete_all_is_routable_and_reports_the_count() {
    let app = test_app().await;
    for _ in 0..3 {
        insert_recording(&app.state.db, &record(Some("alice"), 0))
            .await
            .unwrap();
    }
    insert_recording(&app.state.db, &record(Some("bob"), 0))
        .await
        .unwrap();
    let router = build_router(app.state.clone());

    // Scoped to one user
    let response = router
        .clone()
        .oneshot(request("DELETE", "/recordings/all?userId=alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["deletedCount"], 3);

    // Unscoped removes the rest
    let response = router
        .clone()
        .oneshot(request("DELETE", "/recordings/all"))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["deletedCount"], 1);

    let response = router.oneshot(request("GET", "/recordings")).await.unwrap();
    let body = response_json(response).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn health_reports_module_identity() {
    let app = test_app().await;
    let router = build_router(app.state.clone());

    let response = router.oneshot(request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "medscribe");
    assert_eq!(body["active_sessions"], 0);
}
