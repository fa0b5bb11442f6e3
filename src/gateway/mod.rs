use crate::chatwoot::ChatwootClient;
use crate::engine::{AGENT_MEDIA_PLACEHOLDER, ConversationEngine, InboundReply};
use crate::errors::ZapdeskResult;
use crate::media::MediaStore;
use crate::store::{ConversationStore, Direction};
use crate::twilio::{self, TwilioClient};
use anyhow::Result;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Dependencies shared by all handlers, constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
    pub store: Arc<ConversationStore>,
    pub twilio: Arc<TwilioClient>,
    pub chatwoot: Arc<ChatwootClient>,
    pub media: Arc<MediaStore>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/twilio", post(twilio_webhook))
        .route("/webhooks/chatwoot", post(chatwoot_webhook))
        .route("/media/{name}", get(media_file))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

/// POST /webhooks/twilio — end-user messages from the WhatsApp channel.
///
/// Always answers HTTP 200 with valid TwiML: Twilio renders this document to
/// the user, so internal failures degrade to an empty silent ack, never 5xx.
async fn twilio_webhook(State(state): State<AppState>, body: String) -> Response {
    let params: HashMap<String, String> = form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let msg = twilio::parse_inbound(&params);
    info!("webhook received from {}: {}", msg.from, msg.body);

    let reply = match state.engine.on_inbound_message(&msg).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("inbound processing failed for {}: {}", msg.from, e);
            InboundReply::Ack
        }
    };

    let twiml = match reply {
        InboundReply::Message(text) => twilio::messaging_response(Some(&text)),
        InboundReply::Ack => twilio::messaging_response(None),
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        twiml,
    )
        .into_response()
}

/// Webhook payload posted by Chatwoot on message events. Unknown fields are
/// ignored; everything here is optional because Chatwoot sends many event
/// shapes through the same hook.
#[derive(Debug, Default, Deserialize)]
pub struct ChatwootEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub conversation: Option<RemoteConversationRef>,
    #[serde(default)]
    pub attachments: Vec<AgentAttachment>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteConversationRef {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AgentAttachment {
    #[serde(default)]
    pub data_url: String,
}

/// Acknowledgment token returned to Chatwoot; one distinct value per
/// short-circuit in the filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAck {
    EventIgnored,
    PrivateNoteIgnored,
    EmptyMessageIgnored,
    ConversationNotFound,
    TwilioError,
    Success,
}

impl AgentAck {
    pub fn token(self) -> &'static str {
        match self {
            AgentAck::EventIgnored => "event_ignored",
            AgentAck::PrivateNoteIgnored => "private_note_ignored",
            AgentAck::EmptyMessageIgnored => "empty_message_ignored",
            AgentAck::ConversationNotFound => "conversation_not_found",
            AgentAck::TwilioError => "twilio_error",
            AgentAck::Success => "success",
        }
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            AgentAck::ConversationNotFound => StatusCode::NOT_FOUND,
            AgentAck::TwilioError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }
}

/// POST /webhooks/chatwoot — agent replies from the helpdesk.
///
/// No state-machine transition here: just the filter chain and a forwarding
/// rule with attachment relay.
async fn chatwoot_webhook(
    State(state): State<AppState>,
    Json(event): Json<ChatwootEvent>,
) -> Response {
    let ack = handle_agent_event(&state, &event).await;
    (
        ack.status_code(),
        Json(serde_json::json!({"status": ack.token()})),
    )
        .into_response()
}

pub async fn handle_agent_event(state: &AppState, event: &ChatwootEvent) -> AgentAck {
    if event.event != "message_created" || event.message_type != "outgoing" {
        return AgentAck::EventIgnored;
    }

    let content = event.content.as_deref().unwrap_or("");
    if content.starts_with("note:") || event.private.unwrap_or(false) {
        return AgentAck::PrivateNoteIgnored;
    }

    if content.is_empty() && event.attachments.is_empty() {
        return AgentAck::EmptyMessageIgnored;
    }

    let remote_id = event.conversation.as_ref().map(|c| c.id);
    let conversation = match remote_id.map(|id| state.store.find_by_remote_conversation(id)) {
        Some(Ok(Some(conversation))) => conversation,
        Some(Err(e)) => {
            error!("conversation lookup failed for {:?}: {}", remote_id, e);
            return AgentAck::TwilioError;
        }
        Some(Ok(None)) | None => {
            warn!(
                "received Chatwoot message for an unknown conversation: {:?}",
                remote_id
            );
            return AgentAck::ConversationNotFound;
        }
    };

    match relay_agent_message(state, &conversation.from_number, conversation.id, content, event)
        .await
    {
        Ok(()) => AgentAck::Success,
        Err(e) => {
            error!("failed to send agent message via Twilio: {}", e);
            AgentAck::TwilioError
        }
    }
}

/// Re-host the first attachment (if any), send via Twilio, persist the
/// outbound message row. Any failure maps to the `twilio_error` ack; nothing
/// is rolled back.
async fn relay_agent_message(
    state: &AppState,
    to: &str,
    conversation_id: i64,
    content: &str,
    event: &ChatwootEvent,
) -> ZapdeskResult<()> {
    let mut media_url = None;
    if let Some(attachment) = event.attachments.first() {
        let bytes = state.chatwoot.download_attachment(&attachment.data_url).await?;
        let url = state.media.save(&bytes, &attachment.data_url)?;
        info!("chatwoot file saved publicly for sending: {}", url);
        media_url = Some(url);
    }

    match &media_url {
        Some(url) => state.twilio.send_media(to, content, url).await?,
        None => state.twilio.send_text(to, content).await?,
    }
    info!("agent's message sent to {}", to);

    let stored_body = if content.is_empty() {
        AGENT_MEDIA_PLACEHOLDER
    } else {
        content
    };
    state
        .store
        .append_message(conversation_id, stored_body, Direction::Outbound, None)?;
    Ok(())
}

/// GET /media/{name} — serve a re-hosted agent attachment.
async fn media_file(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Some(path) = state.media.resolve(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!("failed to read media file {}: {}", path.display(), e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// GET /api/health — health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("zapdesk listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_tokens_match_contract() {
        assert_eq!(AgentAck::EventIgnored.token(), "event_ignored");
        assert_eq!(AgentAck::PrivateNoteIgnored.token(), "private_note_ignored");
        assert_eq!(AgentAck::EmptyMessageIgnored.token(), "empty_message_ignored");
        assert_eq!(AgentAck::ConversationNotFound.token(), "conversation_not_found");
        assert_eq!(AgentAck::TwilioError.token(), "twilio_error");
        assert_eq!(AgentAck::Success.token(), "success");
    }

    #[test]
    fn ack_status_codes_match_contract() {
        assert_eq!(AgentAck::EventIgnored.status_code(), StatusCode::OK);
        assert_eq!(AgentAck::Success.status_code(), StatusCode::OK);
        assert_eq!(
            AgentAck::ConversationNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AgentAck::TwilioError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn chatwoot_event_tolerates_sparse_payloads() {
        let event: ChatwootEvent = serde_json::from_str(r#"{"event":"conversation_updated"}"#)
            .unwrap();
        assert_eq!(event.event, "conversation_updated");
        assert!(event.content.is_none());
        assert!(event.attachments.is_empty());
        assert!(event.conversation.is_none());
    }

    #[test]
    fn chatwoot_event_parses_nested_conversation() {
        let event: ChatwootEvent = serde_json::from_value(serde_json::json!({
            "event": "message_created",
            "message_type": "outgoing",
            "content": "posso ajudar?",
            "private": false,
            "conversation": {"id": 900, "status": "open"},
            "attachments": [{"data_url": "https://cw/x.jpg", "file_type": "image"}]
        }))
        .unwrap();
        assert_eq!(event.conversation.unwrap().id, 900);
        assert_eq!(event.attachments[0].data_url, "https://cw/x.jpg");
    }
}
