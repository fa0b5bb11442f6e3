// Shared test helpers — not all items used by every test binary.
#![allow(unused)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zapdesk::cli::build_state;
use zapdesk::config::{ChatwootConfig, Config, StorageConfig, TwilioConfig};
use zapdesk::gateway::{AppState, build_router};

pub const USER: &str = "whatsapp:+5511999990000";

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub chatwoot: MockServer,
    pub twilio: MockServer,
    pub media_dir: std::path::PathBuf,
    pub db_path: std::path::PathBuf,
    _tmp: TempDir,
}

/// Build a full application wired to mock Chatwoot and Twilio servers, with
/// the database and media directory in a fresh temp dir.
pub async fn spawn_app() -> TestApp {
    let tmp = TempDir::new().expect("create temp dir");
    let chatwoot = MockServer::start().await;
    let twilio = MockServer::start().await;

    let media_dir = tmp.path().join("media");
    let db_path = tmp.path().join("zapdesk.db");
    let config = Config {
        twilio: TwilioConfig {
            account_sid: "AC123".into(),
            auth_token: "twilio-token".into(),
            whatsapp_number: "whatsapp:+14155238886".into(),
            api_base: twilio.uri(),
        },
        chatwoot: ChatwootConfig {
            base_url: chatwoot.uri(),
            account_id: "1".into(),
            inbox_id: 2,
            api_token: "cw-token".into(),
        },
        storage: StorageConfig {
            db_path: db_path.to_string_lossy().into_owned(),
            media_dir: media_dir.to_string_lossy().into_owned(),
            public_base_url: "http://localhost:8080/media".into(),
        },
        ..Config::default()
    };

    let state = build_state(&config).expect("build app state");
    let router = build_router(state.clone());
    TestApp {
        state,
        router,
        chatwoot,
        twilio,
        media_dir,
        db_path,
        _tmp: tmp,
    }
}

pub fn twilio_form(fields: &[(&str, &str)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Post an inbound user message to the Twilio webhook and return the TwiML.
pub async fn post_twilio(app: &TestApp, fields: &[(&str, &str)]) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/twilio")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(twilio_form(fields)))
        .expect("build request");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("twilio webhook response");

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(content_type, "text/xml", "twilio webhook must answer TwiML");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, String::from_utf8(bytes.to_vec()).expect("utf8 body"))
}

/// Shorthand for a plain text message from the default test user.
pub async fn send_user_text(app: &TestApp, body: &str) -> (StatusCode, String) {
    post_twilio(
        app,
        &[("From", USER), ("Body", body), ("MessageSid", "SM123")],
    )
    .await
}

/// Post an event to the Chatwoot webhook and return the parsed ack.
pub async fn post_chatwoot(
    app: &TestApp,
    payload: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/chatwoot")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build request");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("chatwoot webhook response");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = serde_json::from_slice(&bytes).expect("json ack body");
    (status, body)
}

/// Mount the Chatwoot endpoints for a successful handoff where no contact
/// exists yet: empty search, contact creation, conversation creation.
pub async fn mount_handoff_fresh_contact(server: &MockServer, contact_id: i64, remote_id: i64) {
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/contacts/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"payload": []})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/1/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "payload": {"contact": {"id": contact_id}}
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": remote_id})))
        .mount(server)
        .await;
}

/// Create a conversation already handed off to an agent.
pub fn seed_with_agent(app: &TestApp, number: &str, contact_id: i64, remote_id: i64) -> i64 {
    let (conversation, _) = app
        .state
        .store
        .find_or_create(number)
        .expect("seed conversation");
    app.state
        .store
        .record_handoff(conversation.id, contact_id, remote_id)
        .expect("seed handoff");
    conversation.id
}
