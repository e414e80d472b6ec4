use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use mybus_api::{
    build_router,
    config::Config,
    models::{
        notification::{DataMap, PushQueueItem, QueueStatus},
        user::{CreateUserRequest, UserType},
    },
    services::{email::DryRunMail, push::DryRunPush, users::UserService},
    store::{DataSource, FixtureStore},
    AppState,
};

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    store: Arc<FixtureStore>,
}

async fn app() -> TestApp {
    app_over(FixtureStore::seeded().await).await
}

async fn app_over(store: FixtureStore) -> TestApp {
    let store = Arc::new(store);
    UserService::ensure_admin(store.as_ref(), "admin@mybus.com", "admin-pass")
        .await
        .unwrap();
    let state = AppState::start(
        Config::local(SECRET),
        store.clone(),
        Arc::new(DryRunPush::rejecting(["t2"])),
        Arc::new(DryRunMail::new()),
    )
    .await;
    TestApp {
        router: build_router(state),
        store,
    }
}

async fn wait_for_push(store: &FixtureStore, id: &str) -> PushQueueItem {
    for _ in 0..100 {
        let item = store.get_push_item(id).await.unwrap().unwrap();
        if item.status != QueueStatus::Queued {
            return item;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("push queue item {id} stayed queued");
}

async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn sign_in(router: &Router, path: &str, email: &str, password: &str) -> (StatusCode, Value) {
    call(
        router,
        json_request("POST", path, None, json!({ "email": email, "password": password })),
    )
    .await
}

async fn admin_token(router: &Router) -> String {
    let (status, body) = sign_in(router, "/auth/login", "admin@mybus.com", "admin-pass").await;
    assert_eq!(status, StatusCode::OK);
    body["accessToken"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = app().await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "fixture");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = app().await;
    let req = Request::builder().uri("/students").body(Body::empty()).unwrap();
    let (status, body) = call(&app.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "unauthenticated");
}

#[tokio::test]
async fn created_student_appears_in_parent_children() {
    let app = app().await;
    let token = admin_token(&app.router).await;

    let (status, body) = call(
        &app.router,
        json_request(
            "POST",
            "/students",
            Some(&token),
            json!({ "name": "ليان", "parentId": "parent_2", "grade": "الصف الأول" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let student_id = body["id"].as_str().unwrap().to_string();
    assert!(body["sync"]["failures"].as_array().unwrap().is_empty());

    let parent = app.store.get_user("parent_2").await.unwrap().unwrap();
    assert!(parent.child(&student_id).is_some());

    let (status, _) = call(
        &app.router,
        json_request("DELETE", &format!("/students/{student_id}"), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let parent = app.store.get_user("parent_2").await.unwrap().unwrap();
    assert!(parent.child(&student_id).is_none());
}

#[tokio::test]
async fn multicast_reports_per_token_outcomes() {
    let app = app().await;
    let token = admin_token(&app.router).await;

    let (status, body) = call(
        &app.router,
        json_request(
            "POST",
            "/push/batch",
            Some(&token),
            json!({ "deviceTokens": ["t1", "t2", "t3"], "title": "Test", "body": "Hello" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["successCount"], 2);
    assert_eq!(body["failureCount"], 1);
    assert!(body["responses"][1]["error"].is_string());

    let (status, body) = call(
        &app.router,
        json_request(
            "POST",
            "/push/batch",
            Some(&token),
            json!({ "deviceTokens": [], "title": "Test", "body": "Hello" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid-argument");

    let (status, _) = call(
        &app.router,
        json_request(
            "POST",
            "/push/batch",
            Some(&token),
            json!({ "deviceTokens": ["t1", ""], "title": "Test", "body": "Hello" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queued_push_reaches_a_terminal_state() {
    let app = app().await;
    let token = admin_token(&app.router).await;
    app.store.set_fcm_token("parent_1", "device-parent-1").await.unwrap();

    let (status, body) = call(
        &app.router,
        json_request(
            "POST",
            "/queue/push",
            Some(&token),
            json!({ "recipientId": "parent_1", "title": "وصل الباص", "body": "الباص أمام المنزل" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    let id = body["id"].as_str().unwrap().to_string();

    let item = wait_for_push(&app.store, &id).await;
    assert!(item.message_id.is_some());
}

#[tokio::test]
async fn items_queued_before_start_are_delivered() {
    let store = FixtureStore::seeded().await;
    store.set_fcm_token("parent_1", "device-parent-1").await.unwrap();
    let item = PushQueueItem {
        id: "left-over".into(),
        recipient_id: "parent_1".into(),
        title: "تذكير".into(),
        body: "الرحلة بعد 10 دقائق".into(),
        data: DataMap::new(),
        status: QueueStatus::Queued,
        created_at: chrono::Utc::now(),
        sent_at: None,
        failed_at: None,
        message_id: None,
        error: None,
    };
    store.insert_push_item(&item).await.unwrap();

    let app = app_over(store).await;
    let item = wait_for_push(&app.store, "left-over").await;
    assert_eq!(item.status, QueueStatus::Sent);
}

#[tokio::test]
async fn parent_registers_device_token_through_device_login() {
    let app = app().await;
    UserService::create(
        app.store.as_ref(),
        UserType::Parent,
        CreateUserRequest {
            name: "ولي أمر".into(),
            email: "app-parent@mybus.com".into(),
            phone: String::new(),
            password: Some("secret1".into()),
            permissions: None,
        },
    )
    .await
    .unwrap();

    let (status, _) = sign_in(&app.router, "/auth/login", "app-parent@mybus.com", "secret1").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = sign_in(&app.router, "/auth/device-login", "app-parent@mybus.com", "secret1").await;
    assert_eq!(status, StatusCode::OK);
    let token = body["accessToken"].as_str().unwrap().to_string();
    let parent_id = body["user"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app.router,
        json_request("POST", "/auth/push-token", Some(&token), json!({ "token": "phone-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let parent = app.store.get_user(&parent_id).await.unwrap().unwrap();
    assert_eq!(parent.fcm_token.as_deref(), Some("phone-1"));

    // Parent tokens stay out of admin routes.
    let (status, _) = call(&app.router, get("/stats", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn notifications_list_newest_first() {
    let app = app().await;
    let token = admin_token(&app.router).await;
    for title in ["أول", "ثاني"] {
        let (status, _) = call(
            &app.router,
            json_request(
                "POST",
                "/notifications",
                Some(&token),
                json!({ "recipientId": "parent_3", "title": title, "body": "نص" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let (status, body) = call(&app.router, get("/notifications?recipientId=parent_3&limit=1", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["title"], "ثاني");
}

#[tokio::test]
async fn settings_update_shows_in_full_export() {
    let app = app().await;
    let token = admin_token(&app.router).await;

    let (status, body) = call(
        &app.router,
        json_request("PUT", "/settings/general", Some(&token), json!({ "schoolName": "مدرسة النور" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schoolName"], "مدرسة النور");

    let (status, body) = call(&app.router, get("/export", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["students"].as_array().unwrap().len(), 6);
    assert_eq!(body["busRoutes"].as_array().unwrap().len(), 6);
    assert_eq!(body["settings"][0]["category"], "general");
    assert!(body["exportDate"].is_string());
}

#[tokio::test]
async fn complaint_export_is_csv() {
    let app = app().await;
    let token = admin_token(&app.router).await;

    let response = app
        .router
        .clone()
        .oneshot(get("/complaints/export", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/csv"));
}

#[tokio::test]
async fn dashboard_counts_seeded_data() {
    let app = app().await;
    let token = admin_token(&app.router).await;
    let (status, body) = call(&app.router, get("/stats", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["students"]["total"], 6);
    assert_eq!(body["complaints"]["urgent"], 1);
}
