//! End-to-end tests of the HTTP surface over in-memory collaborators

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{Harness, BIRTHDAY_PARTY, TEST_MODEL};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

use async_trait::async_trait;
use taskforge::api::{router, AppState};
use taskforge::auth::{AuthError, AuthProvider, SignIn};
use taskforge::llm::LlmGateway;
use taskforge::models::{AuthUser, TaskSource};
use tower::ServiceExt;

fn setup_test_app() -> (Harness, Router) {
    let harness = Harness::new();
    let app = router(harness.state.clone());
    (harness, app)
}

async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => Body::from(serde_json::to_vec(&value).unwrap()),
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn manual_task(title: &str, parent: Option<&str>) -> Value {
    json!({
        "title": title,
        "description": null,
        "parentTaskId": parent,
        "source": "manual",
        "generationId": null,
    })
}

async fn create(app: &Router, token: &str, body: Value) -> Value {
    let (status, created) = request_json(app, "POST", "/api/tasks", Some(token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", created);
    created
}

// --- Auth --- //

#[tokio::test]
async fn test_register_login_and_session() {
    let (_harness, app) = setup_test_app();

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "email": "ada@example.com",
            "password": "secret1",
            "confirmPassword": "secret1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "ada@example.com");

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "ada@example.com", "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["session"]["access_token"].as_str().unwrap().to_string();

    let (status, body) = request_json(&app, "GET", "/api/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ada@example.com");

    let (status, body) = request_json(&app, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, _) = request_json(&app, "GET", "/api/tasks", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejections() {
    let (harness, app) = setup_test_app();
    harness.sign_in("ada@example.com").await;

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "ada@example.com", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["statusCode"], 401);
    assert_eq!(body["message"], "Invalid login credentials");

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "not-an-email", "password": "123"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request data");
    assert!(body["data"]["email"].is_string());
    assert!(body["data"]["password"].is_string());
}

#[tokio::test]
async fn test_register_password_mismatch() {
    let (_harness, app) = setup_test_app();

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "email": "ada@example.com",
            "password": "secret1",
            "confirmPassword": "secret2",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["confirmPassword"], "Passwords do not match");
}

#[tokio::test]
async fn test_duplicate_registration_reports_provider_message() {
    let (harness, app) = setup_test_app();
    harness.sign_in("ada@example.com").await;

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "email": "ada@example.com",
            "password": "secret1",
            "confirmPassword": "secret1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User already registered");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (harness, app) = setup_test_app();
    harness.sign_in("ada@example.com").await;

    let (status, _) = request_json(
        &app,
        "POST",
        "/api/auth/forgot-password",
        None,
        Some(json!({"email": "ada@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reset_token = harness.auth.pending_reset_token("ada@example.com").unwrap();

    let (status, _) = request_json(
        &app,
        "POST",
        "/api/auth/reset-password",
        None,
        Some(json!({
            "token": reset_token,
            "newPassword": "brand-new",
            "confirmPassword": "brand-new",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "ada@example.com", "password": "brand-new"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_need_a_bearer_token() {
    let (_harness, app) = setup_test_app();

    for (method, uri) in [
        ("GET", "/api/tasks"),
        ("POST", "/api/tasks"),
        ("POST", "/api/generations"),
        ("PATCH", "/api/tasks/7b0c6d1e-5a7f-4f1e-9c53-3f7f2a1d9a10/complete"),
    ] {
        let (status, body) = request_json(&app, method, uri, None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(body["statusCode"], 401);
    }

    let (status, _) = request_json(&app, "GET", "/api/tasks", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// Auth backend that is down
struct UnreachableAuth;

#[async_trait]
impl AuthProvider for UnreachableAuth {
    async fn sign_up(&self, _email: &str, _password: &str) -> Result<AuthUser, AuthError> {
        Err(AuthError::Provider("status 503".into()))
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<SignIn, AuthError> {
        Err(AuthError::Provider("status 503".into()))
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
        Err(AuthError::Provider("status 503".into()))
    }

    async fn request_password_reset(&self, _email: &str) -> Result<(), AuthError> {
        Err(AuthError::Provider("status 503".into()))
    }

    async fn reset_password(&self, _token: &str, _new_password: &str) -> Result<(), AuthError> {
        Err(AuthError::Provider("status 503".into()))
    }

    async fn current_user(&self, _access_token: &str) -> Result<AuthUser, AuthError> {
        Err(AuthError::Provider("status 503 from auth backend".into()))
    }
}

#[tokio::test]
async fn test_auth_backend_failure_is_internal() {
    let harness = Harness::new();
    let state = AppState::new(
        Arc::new(harness.store.clone()),
        Arc::new(harness.store.clone()),
        Arc::new(UnreachableAuth),
        LlmGateway::new(harness.transport.clone(), TEST_MODEL),
    );
    let app = router(state);

    let (status, body) = request_json(&app, "GET", "/api/tasks", Some("some-token"), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["statusCode"], 500);
    assert_eq!(body["message"], "Internal server error");
}

// --- Tasks --- //

#[tokio::test]
async fn test_create_and_list_tasks() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;

    let parent = create(&app, &token, manual_task("Plan trip", None)).await;
    assert_eq!(parent["title"], "Plan trip");
    assert_eq!(parent["source"], "manual");
    let parent_id = parent["id"].as_str().unwrap();

    create(&app, &token, manual_task("Book flights", Some(parent_id))).await;

    let (status, body) = request_json(&app, "GET", "/api/tasks", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"], json!({"page": 1, "limit": 20, "total": 1}));
    assert_eq!(body["tasks"][0]["id"], parent_id);
    assert_eq!(body["tasks"][0]["subtasks"][0]["title"], "Book flights");

    let stored = harness.store.tasks().unwrap();
    let positions: Vec<i32> = stored.iter().map(|t| t.position).collect();
    assert!(positions.contains(&1));
    assert!(positions.contains(&2));
}

#[tokio::test]
async fn test_create_task_validation_errors() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/tasks",
        Some(&token),
        Some(json!({
            "title": "",
            "description": null,
            "parentTaskId": null,
            "source": "manual",
            "generationId": null,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["message"], "Invalid request data");
    assert!(body["data"]["title"].is_string());

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/tasks",
        Some(&token),
        Some(json!({
            "title": "Guessed",
            "description": null,
            "parentTaskId": null,
            "source": "ai_full",
            "generationId": null,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["data"]["generationId"],
        "generationId is required when source is ai_full or ai_edited"
    );
    assert!(harness.store.tasks().unwrap().is_empty());
}

#[tokio::test]
async fn test_third_level_is_rejected() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;

    let root = create(&app, &token, manual_task("Root", None)).await;
    let child = create(
        &app,
        &token,
        manual_task("Child", Some(root["id"].as_str().unwrap())),
    )
    .await;

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/tasks",
        Some(&token),
        Some(manual_task("Grandchild", Some(child["id"].as_str().unwrap()))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["message"], "Maximum nesting level exceeded (max 2 levels)");
    assert_eq!(harness.store.tasks().unwrap().len(), 2);
}

#[tokio::test]
async fn test_pagination_counts_top_level_tasks() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;

    for i in 0..25 {
        create(&app, &token, manual_task(&format!("Task {}", i), None)).await;
    }

    let (_, first) = request_json(&app, "GET", "/api/tasks?page=1&limit=20", Some(&token), None).await;
    assert_eq!(first["tasks"].as_array().unwrap().len(), 20);
    assert_eq!(first["pagination"]["total"], 25);
    assert_eq!(first["tasks"][0]["title"], "Task 24");

    let (_, second) = request_json(&app, "GET", "/api/tasks?page=2&limit=20", Some(&token), None).await;
    assert_eq!(second["tasks"].as_array().unwrap().len(), 5);
    assert_eq!(second["pagination"]["page"], 2);

    let (_, clamped) = request_json(&app, "GET", "/api/tasks?page=0&limit=500", Some(&token), None).await;
    assert_eq!(clamped["pagination"]["page"], 1);
    assert_eq!(clamped["pagination"]["limit"], 100);

    let (_, lenient) = request_json(&app, "GET", "/api/tasks?page=abc", Some(&token), None).await;
    assert_eq!(lenient["pagination"]["page"], 1);
}

#[tokio::test]
async fn test_update_task() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;
    let intruder = harness.sign_in("mallory@example.com").await;

    let task = create(&app, &token, manual_task("Draft", None)).await;
    let uri = format!("/api/tasks/{}", task["id"].as_str().unwrap());

    let (status, body) = request_json(
        &app,
        "PUT",
        &uri,
        Some(&token),
        Some(json!({"title": "Final", "description": "Send it"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Final");
    assert_eq!(body["description"], "Send it");
    assert!(body["updatedAt"].is_string());

    let (status, body) = request_json(
        &app,
        "PUT",
        &uri,
        Some(&intruder),
        Some(json!({"title": "Hijacked", "description": null})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["statusCode"], 404);
    assert_eq!(harness.store.tasks().unwrap()[0].title, "Final");
}

#[tokio::test]
async fn test_delete_cascades_to_subtasks() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;

    let root = create(&app, &token, manual_task("Root", None)).await;
    let root_id = root["id"].as_str().unwrap();
    create(&app, &token, manual_task("A", Some(root_id))).await;
    create(&app, &token, manual_task("B", Some(root_id))).await;
    create(&app, &token, manual_task("Other", None)).await;

    let (status, body) = request_json(
        &app,
        "DELETE",
        &format!("/api/tasks/{}", root_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Task deleted successfully");

    let remaining = harness.store.tasks().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].title, "Other");
}

#[tokio::test]
async fn test_complete_cascades_and_is_one_way() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;

    let root = create(&app, &token, manual_task("Root", None)).await;
    let root_id = root["id"].as_str().unwrap();
    create(&app, &token, manual_task("A", Some(root_id))).await;
    create(&app, &token, manual_task("B", Some(root_id))).await;

    let uri = format!("/api/tasks/{}/complete", root_id);
    let (status, body) = request_json(&app, "PATCH", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Task completion status updated successfully");
    assert!(harness.store.tasks().unwrap().iter().all(|t| t.completed));

    let (status, _) = request_json(&app, "PATCH", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let tasks = harness.store.tasks().unwrap();
    for task in &tasks {
        if task.is_top_level() {
            assert!(!task.completed, "root should be reopened");
        } else {
            assert!(task.completed, "subtasks stay completed");
        }
    }
}

#[tokio::test]
async fn test_malformed_task_id_is_not_found() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;

    let (status, body) =
        request_json(&app, "DELETE", "/api/tasks/not-a-uuid", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["statusCode"], 404);
}

// --- Generations --- //

#[tokio::test]
async fn test_generation_then_accept_a_proposal() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;
    harness.transport.reply_with(BIRTHDAY_PARTY);

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/generations",
        Some(&token),
        Some(json!({"description": "  Plan a birthday party  "})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["generated_count"], 3);
    assert_eq!(body["tasks"].as_array().unwrap().len(), 3);
    assert!(body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .all(|t| t["source"] == "ai_full"));

    let generations = harness.store.generations().unwrap();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0].generated_count, 3);
    assert_eq!(generations[0].model, TEST_MODEL);
    assert_eq!(body["generationId"], generations[0].id.to_string());

    let created = create(
        &app,
        &token,
        json!({
            "title": body["tasks"][0]["title"],
            "description": body["tasks"][0]["description"],
            "parentTaskId": null,
            "source": "ai_full",
            "generationId": body["generationId"],
        }),
    )
    .await;
    assert_eq!(created["source"], "ai_full");
    let stored = harness.store.tasks().unwrap();
    assert_eq!(stored[0].source, TaskSource::AiFull);
    assert_eq!(stored[0].generation_id, Some(generations[0].id));
}

#[tokio::test]
async fn test_generation_failure_is_logged() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;
    harness.transport.reply_with("Sure! Here are some tasks you could do.");

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/generations",
        Some(&token),
        Some(json!({"description": "Plan a birthday party"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to generate tasks");

    assert!(harness.store.generations().unwrap().is_empty());
    let logs = harness.store.error_logs().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].error_code, "LLM_UNPARSEABLE_RESPONSE");
}

#[tokio::test]
async fn test_blank_generation_description_is_rejected() {
    let (harness, app) = setup_test_app();
    let token = harness.sign_in("ada@example.com").await;

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/generations",
        Some(&token),
        Some(json!({"description": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["description"].is_string());
    assert!(harness.transport.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_foreign_generation_id_is_not_found() {
    let (harness, app) = setup_test_app();
    let owner = harness.sign_in("ada@example.com").await;
    let intruder = harness.sign_in("mallory@example.com").await;
    harness.transport.reply_with(BIRTHDAY_PARTY);

    let (_, generation) = request_json(
        &app,
        "POST",
        "/api/generations",
        Some(&owner),
        Some(json!({"description": "Plan a birthday party"})),
    )
    .await;

    let (status, _) = request_json(
        &app,
        "POST",
        "/api/tasks",
        Some(&intruder),
        Some(json!({
            "title": "Borrowed",
            "description": null,
            "parentTaskId": null,
            "source": "ai_full",
            "generationId": generation["generationId"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(harness.store.tasks().unwrap().is_empty());
}
