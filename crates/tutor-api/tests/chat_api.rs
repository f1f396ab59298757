//! Router-level tests for the chat endpoints.
//!
//! Each test builds the full router over an in-memory database and drives it
//! with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use tutor_api::{AppState, AppStateInner, router};
use tutor_db::Database;
use tutor_relay::{Dispatcher, HostedRelay, Publisher, RelaySettings};
use tutor_types::auth::issue_token;
use tutor_types::events::RelayEvent;
use tutor_types::models::Role;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    state: AppState,
}

fn test_app_with(publisher: Publisher) -> TestApp {
    let db = Database::open_in_memory().unwrap();
    db.upsert_user(5, "Sam Student", "student").unwrap();
    db.upsert_user(6, "Pat Parent", "parent").unwrap();
    db.upsert_user(7, "Other Student", "student").unwrap();
    db.upsert_user(9, "Ms. Rivera", "teacher").unwrap();
    db.upsert_user(10, "Mr. Chen", "teacher").unwrap();

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: SECRET.to_string(),
        publisher,
    });
    TestApp {
        router: router(state.clone()),
        state,
    }
}

fn test_app() -> TestApp {
    test_app_with(Publisher::local())
}

fn token(id: i64, role: Role) -> String {
    issue_token(SECRET, id, role, &format!("user-{id}"), chrono::Duration::hours(1)).unwrap()
}

fn student() -> String {
    token(5, Role::Student)
}

fn teacher() -> String {
    token(9, Role::Teacher)
}

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    send(app, request).await
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

async fn send_message(app: &TestApp, token: &str, body: Value) -> (StatusCode, Value) {
    call(app, Method::POST, "/api/chat/messages", Some(token), Some(body)).await
}

fn student_to_teacher(content: &str) -> Value {
    json!({
        "senderId": 5,
        "senderRole": "student",
        "recipientId": 9,
        "recipientRole": "teacher",
        "content": content,
    })
}

fn teacher_to_student(content: &str) -> Value {
    json!({
        "senderId": 9,
        "senderRole": "teacher",
        "recipientId": 5,
        "recipientRole": "student",
        "content": content,
    })
}

async fn history(app: &TestApp, token: &str) -> Vec<Value> {
    let (status, body) = call(
        app,
        Method::GET,
        "/api/chat/messages?studentId=5&teacherId=9",
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    body["messages"].as_array().unwrap().clone()
}

// -- Send & history --

#[tokio::test]
async fn sent_message_appears_once_in_history() {
    let app = test_app();

    let (status, body) = send_message(&app, &student(), student_to_teacher("hello")).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    let id = body["messageId"].as_i64().unwrap();
    assert_eq!(body["message"]["id"], id);
    assert_eq!(body["message"]["content"], "hello");
    assert_eq!(body["message"]["isRead"], false);

    let messages = history(&app, &teacher()).await;
    let matching: Vec<&Value> = messages.iter().filter(|m| m["id"] == id).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0]["senderRole"], "student");
    assert_eq!(matching[0]["senderName"], "Sam Student");
    assert_eq!(matching[0]["senderId"], 5);
    assert_eq!(matching[0]["recipientId"], 9);
    assert!(matching[0]["readAt"].is_null());
}

#[tokio::test]
async fn teacher_subscribed_to_channel_receives_new_message() {
    let app = test_app();
    let mut subscription = app
        .state
        .publisher
        .dispatcher()
        .subscribe_channel("private-conversation-5-9");

    let (status, _) = send_message(&app, &student(), student_to_teacher("hello")).await;
    assert_eq!(status, StatusCode::CREATED);

    let event = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("no event within timeout")
        .unwrap();
    match event {
        RelayEvent::NewMessage(message) => {
            assert_eq!(message.content, "hello");
            assert_eq!(message.sender_role, Role::Student);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn quick_successive_sends_are_distinct_and_ordered() {
    let app = test_app();

    let (_, first) = send_message(&app, &student(), student_to_teacher("first")).await;
    let (_, second) = send_message(&app, &student(), student_to_teacher("second")).await;
    let first_id = first["messageId"].as_i64().unwrap();
    let second_id = second["messageId"].as_i64().unwrap();
    assert_ne!(first_id, second_id);

    let ids: Vec<i64> = history(&app, &student())
        .await
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![first_id, second_id]);
}

#[tokio::test]
async fn history_is_shared_by_both_sides() {
    let app = test_app();
    send_message(&app, &student(), student_to_teacher("question")).await;
    send_message(&app, &teacher(), teacher_to_student("answer")).await;

    let from_student = history(&app, &student()).await;
    let from_teacher = history(&app, &teacher()).await;
    assert_eq!(from_student, from_teacher);
    assert_eq!(from_student.len(), 2);
    assert_eq!(from_student[1]["senderRole"], "teacher");
}

#[tokio::test]
async fn history_paginates_with_before_cursor() {
    let app = test_app();
    let mut ids = Vec::new();
    for i in 0..5 {
        let (_, body) = send_message(&app, &student(), student_to_teacher(&format!("m{i}"))).await;
        ids.push(body["messageId"].as_i64().unwrap());
    }

    let uri = format!("/api/chat/messages?studentId=5&teacherId=9&before={}&limit=2", ids[4]);
    let (status, body) = call(&app, Method::GET, &uri, Some(&teacher()), None).await;
    assert_eq!(status, StatusCode::OK);
    let page: Vec<i64> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(page, vec![ids[2], ids[3]]);
}

// -- Send validation --

#[tokio::test]
async fn send_rejects_invalid_requests() {
    let app = test_app();

    let (status, body) = send_message(&app, &student(), student_to_teacher("   ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let (status, body) = send_message(&app, &student(), json!({ "senderId": 5 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let too_long = "x".repeat(tutor_api::messages::MAX_CONTENT_CHARS + 1);
    let (status, _) = send_message(&app, &student(), student_to_teacher(&too_long)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Teacher to teacher is not a conversation
    let (status, _) = send_message(
        &app,
        &teacher(),
        json!({
            "senderId": 9,
            "senderRole": "teacher",
            "recipientId": 10,
            "recipientRole": "teacher",
            "content": "hi",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_requires_matching_identity() {
    let app = test_app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat/messages",
        None,
        Some(student_to_teacher("hi")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send_message(&app, "not-a-jwt", student_to_teacher("hi")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Another student trying to speak as student 5
    let (status, _) = send_message(&app, &token(7, Role::Student), student_to_teacher("hi")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn send_to_unknown_recipient_is_not_found() {
    let app = test_app();

    let mut body = student_to_teacher("hi");
    body["recipientId"] = json!(404);
    let (status, _) = send_message(&app, &student(), body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // User 6 exists but is a parent, not a teacher
    let mut body = student_to_teacher("hi");
    body["recipientId"] = json!(6);
    let (status, _) = send_message(&app, &student(), body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn send_from_unknown_sender_is_not_found() {
    let app = test_app();

    // Valid token, but user 77 was never provisioned
    let mut body = student_to_teacher("hi");
    body["senderId"] = json!(77);
    let (status, body) = send_message(&app, &token(77, Role::Student), body).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
    assert_eq!(body["success"], false);

    // User 6 is a parent; a token claiming student does not make them one
    let mut body = student_to_teacher("hi");
    body["senderId"] = json!(6);
    let (status, _) = send_message(&app, &token(6, Role::Student), body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(history(&app, &teacher()).await.is_empty());
}

#[tokio::test]
async fn session_cookie_is_accepted() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/chat/unread-count")
        .header(header::COOKIE, format!("token={}", teacher()))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unreadCount"], 0);
}

// -- History validation --

#[tokio::test]
async fn history_rejects_outsiders_and_bad_queries() {
    let app = test_app();

    let (status, _) = call(
        &app,
        Method::GET,
        "/api/chat/messages?studentId=5&teacherId=9",
        Some(&token(7, Role::Student)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::GET, "/api/chat/messages?studentId=5", Some(&student()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::GET,
        "/api/chat/messages?studentId=5&parentId=6&teacherId=9",
        Some(&student()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::GET,
        "/api/chat/messages?studentId=abc&teacherId=9",
        Some(&student()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -- Read receipts & unread counter --

#[tokio::test]
async fn mark_read_is_idempotent_and_recipient_only() {
    let app = test_app();
    let (_, body) = send_message(&app, &student(), student_to_teacher("hello")).await;
    let id = body["messageId"].as_i64().unwrap();

    // The sender is not the recipient
    let (status, body) = call(
        &app,
        Method::PATCH,
        "/api/chat/messages/read",
        Some(&student()),
        Some(json!({ "messageIds": [id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updatedCount"], 0);

    let (_, body) = call(
        &app,
        Method::PATCH,
        "/api/chat/messages/read",
        Some(&teacher()),
        Some(json!({ "messageIds": [id, id] })),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["updatedCount"], 1);

    let (_, body) = call(
        &app,
        Method::PATCH,
        "/api/chat/messages/read",
        Some(&teacher()),
        Some(json!({ "messageIds": [id] })),
    )
    .await;
    assert_eq!(body["updatedCount"], 0);

    let messages = history(&app, &student()).await;
    assert_eq!(messages[0]["isRead"], true);
    assert!(messages[0]["readAt"].is_string());
}

#[tokio::test]
async fn mark_read_publishes_receipt_to_the_conversation() {
    let app = test_app();
    let (_, body) = send_message(&app, &student(), student_to_teacher("hello")).await;
    let id = body["messageId"].as_i64().unwrap();

    let mut subscription = app
        .state
        .publisher
        .dispatcher()
        .subscribe_channel("private-conversation-5-9");

    call(
        &app,
        Method::PATCH,
        "/api/chat/messages/read",
        Some(&teacher()),
        Some(json!({ "messageIds": [id] })),
    )
    .await;

    let event = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        RelayEvent::MessagesRead { message_ids, reader_id, .. } => {
            assert_eq!(message_ids, vec![id]);
            assert_eq!(reader_id, 9);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn mark_read_rejects_empty_list() {
    let app = test_app();
    let (status, body) = call(
        &app,
        Method::PATCH,
        "/api/chat/messages/read",
        Some(&teacher()),
        Some(json!({ "messageIds": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unread_count_follows_reads() {
    let app = test_app();
    let mut ids = Vec::new();
    for i in 0..3 {
        let (_, body) = send_message(&app, &student(), student_to_teacher(&format!("m{i}"))).await;
        ids.push(body["messageId"].as_i64().unwrap());
    }

    let (status, body) = call(&app, Method::GET, "/api/chat/unread-count", Some(&teacher()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["unreadCount"], 3);

    call(
        &app,
        Method::PATCH,
        "/api/chat/messages/read",
        Some(&teacher()),
        Some(json!({ "messageIds": ids })),
    )
    .await;

    let (_, body) = call(&app, Method::GET, "/api/chat/unread-count", Some(&teacher()), None).await;
    assert_eq!(body["unreadCount"], 0);
}

// -- Conversations --

#[tokio::test]
async fn conversation_list_shows_peers_and_unread() {
    let app = test_app();
    send_message(&app, &student(), student_to_teacher("from student")).await;
    send_message(
        &app,
        &token(6, Role::Parent),
        json!({
            "senderId": 6,
            "senderRole": "parent",
            "recipientId": 9,
            "recipientRole": "teacher",
            "content": "from parent",
        }),
    )
    .await;

    let (status, body) = call(&app, Method::GET, "/api/chat/conversations", Some(&teacher()), None).await;
    assert_eq!(status, StatusCode::OK);
    let conversations = body["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0]["channelId"], "6-9");
    assert_eq!(conversations[0]["peerRole"], "parent");
    assert_eq!(conversations[0]["peerName"], "Pat Parent");
    assert_eq!(conversations[0]["lastMessage"]["content"], "from parent");
    assert_eq!(conversations[1]["unreadCount"], 1);
}

// -- Channel subscription auth --

async fn channel_auth(app: &TestApp, token: &str, form: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/chat/channel-auth")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    send(app, request).await
}

fn hosted_app() -> TestApp {
    let settings = RelaySettings {
        app_id: Some("1".into()),
        key: Some("relay-key".into()),
        secret: Some("relay-secret".into()),
        cluster: Some("eu".into()),
        host: None,
    };
    test_app_with(Publisher::new(
        Dispatcher::new(),
        Some(Arc::new(HostedRelay::new(settings))),
    ))
}

#[tokio::test]
async fn send_succeeds_when_hosted_relay_is_unreachable() {
    let settings = RelaySettings {
        app_id: Some("1".into()),
        key: Some("relay-key".into()),
        secret: Some("relay-secret".into()),
        cluster: None,
        host: Some("http://127.0.0.1:1".into()),
    };
    let app = test_app_with(Publisher::new(
        Dispatcher::new(),
        Some(Arc::new(HostedRelay::new(settings))),
    ));
    let mut subscription = app
        .state
        .publisher
        .dispatcher()
        .subscribe_channel("private-conversation-5-9");

    let (status, body) = send_message(&app, &student(), student_to_teacher("still here")).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);

    let messages = history(&app, &teacher()).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "still here");

    let event = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("no event within timeout")
        .unwrap();
    assert!(matches!(event, RelayEvent::NewMessage(m) if m.content == "still here"));
}

#[tokio::test]
async fn channel_auth_signs_for_participants() {
    let app = hosted_app();
    let (status, body) = channel_auth(
        &app,
        &teacher(),
        "socket_id=123.456&channel_name=private-conversation-5-9",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let auth = body["auth"].as_str().unwrap();
    let (key, signature) = auth.split_once(':').unwrap();
    assert_eq!(key, "relay-key");
    assert_eq!(signature.len(), 64);
}

#[tokio::test]
async fn channel_auth_refuses_outsiders() {
    let app = hosted_app();

    let (status, body) = channel_auth(
        &app,
        &token(7, Role::Student),
        "socket_id=123.456&channel_name=private-conversation-5-9",
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, _) = channel_auth(
        &app,
        &student(),
        "socket_id=123.456&channel_name=private-conversation-9-5",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = channel_auth(
        &app,
        &student(),
        "socket_id=bogus&channel_name=private-conversation-5-9",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn channel_auth_without_relay_config_fails_at_runtime() {
    let app = test_app();
    let (status, body) = channel_auth(
        &app,
        &student(),
        "socket_id=123.456&channel_name=private-conversation-5-9",
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app();
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
