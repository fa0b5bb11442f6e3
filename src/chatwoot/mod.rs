use crate::config::ChatwootConfig;
use crate::errors::{ZapdeskError, ZapdeskResult};
use crate::utils::http::{DEFAULT_MAX_BODY_BYTES, default_http_client, limited_body};
use serde_json::{Value, json};
use tracing::{debug, info};

/// Header Chatwoot expects for agent-API authentication.
const API_TOKEN_HEADER: &str = "api_access_token";

/// Client for the Chatwoot agent API.
///
/// Pure request/response mapping; every non-success status surfaces as a
/// single [`ZapdeskError::Chatwoot`] carrying the response body, and the
/// engine decides what that means for the conversation.
pub struct ChatwootClient {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    inbox_id: i64,
    api_token: String,
}

impl ChatwootClient {
    pub fn new(config: &ChatwootConfig) -> Self {
        Self {
            http: default_http_client(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            inbox_id: config.inbox_id,
            api_token: config.api_token.clone(),
        }
    }

    fn account_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/v1/accounts/{}/{}",
            self.base_url, self.account_id, suffix
        )
    }

    fn remote_error(op: &str, detail: impl std::fmt::Display) -> ZapdeskError {
        ZapdeskError::Chatwoot {
            message: format!("{}: {}", op, detail),
        }
    }

    /// Search for a contact by phone number. A failed search (non-success
    /// status or empty result list) is treated as "no contact" so the caller
    /// can fall through to creation.
    pub async fn search_contact(&self, phone_number: &str) -> ZapdeskResult<Option<i64>> {
        let response = self
            .http
            .get(self.account_url("contacts/search"))
            .header(API_TOKEN_HEADER, &self.api_token)
            .query(&[("q", phone_number)])
            .send()
            .await
            .map_err(|e| Self::remote_error("contact search failed", e))?;

        if !response.status().is_success() {
            debug!(
                "chatwoot contact search returned {}, treating as not found",
                response.status()
            );
            return Ok(None);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Self::remote_error("contact search returned invalid JSON", e))?;
        let contact_id = body.pointer("/payload/0/id").and_then(Value::as_i64);
        if let Some(id) = contact_id {
            info!("contact found on Chatwoot with id {}", id);
        }
        Ok(contact_id)
    }

    /// Create a contact with a display name derived from the number's last
    /// four digits.
    pub async fn create_contact(&self, phone_number: &str) -> ZapdeskResult<i64> {
        let payload = json!({
            "inbox_id": self.inbox_id,
            "name": display_name(phone_number),
            "phone_number": phone_number,
        });
        let response = self
            .http
            .post(self.account_url("contacts"))
            .header(API_TOKEN_HEADER, &self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::remote_error("contact creation failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::remote_error(
                "contact creation failed",
                format!("HTTP {}: {}", status, body),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Self::remote_error("contact creation returned invalid JSON", e))?;
        let contact_id = body
            .pointer("/payload/contact/id")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Self::remote_error("contact creation returned no id", body.to_string())
            })?;
        info!("contact created in Chatwoot with id {}", contact_id);
        Ok(contact_id)
    }

    /// Create a fresh conversation for a contact. Every handoff gets its own
    /// remote conversation; prior ids are never reused.
    pub async fn create_conversation(&self, contact_id: i64) -> ZapdeskResult<i64> {
        let payload = json!({
            "inbox_id": self.inbox_id,
            "contact_id": contact_id,
            "source_id": "api",
        });
        let response = self
            .http
            .post(self.account_url("conversations"))
            .header(API_TOKEN_HEADER, &self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::remote_error("conversation creation failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::remote_error(
                "conversation creation failed",
                format!("HTTP {}: {}", status, body),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Self::remote_error("conversation creation returned invalid JSON", e))?;
        body.get("id").and_then(Value::as_i64).ok_or_else(|| {
            Self::remote_error("conversation creation returned no id", body.to_string())
        })
    }

    /// Post a plain user message into an existing conversation.
    pub async fn forward_message(&self, conversation_id: i64, body: &str) -> ZapdeskResult<()> {
        let payload = json!({
            "content": body,
            "message_type": "incoming",
        });
        self.post_message(conversation_id, &payload).await
    }

    /// Post a user message that carries an attachment. The Twilio-hosted
    /// media URL is passed through as-is; Chatwoot fetches it on its side.
    pub async fn forward_attachment(
        &self,
        conversation_id: i64,
        media_url: &str,
        content_type: &str,
        caption: &str,
    ) -> ZapdeskResult<()> {
        let payload = json!({
            "content": caption,
            "message_type": "incoming",
            "attachments": [{
                "data_url": media_url,
                "content_type": content_type,
            }],
        });
        self.post_message(conversation_id, &payload).await
    }

    async fn post_message(&self, conversation_id: i64, payload: &Value) -> ZapdeskResult<()> {
        let response = self
            .http
            .post(self.account_url(&format!("conversations/{}/messages", conversation_id)))
            .header(API_TOKEN_HEADER, &self.api_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| Self::remote_error("message forward failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::remote_error(
                "message forward failed",
                format!("HTTP {}: {}", status, body),
            ));
        }
        Ok(())
    }

    /// Fetch attachment bytes from a Chatwoot-hosted URL using the API token.
    pub async fn download_attachment(&self, url: &str) -> ZapdeskResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .header(API_TOKEN_HEADER, &self.api_token)
            .send()
            .await
            .map_err(|e| Self::remote_error("attachment download failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::remote_error(
                "attachment download failed",
                format!("HTTP {}", status),
            ));
        }
        limited_body(response, DEFAULT_MAX_BODY_BYTES)
            .await
            .map_err(|e| Self::remote_error("attachment download failed", e))
    }
}

/// Display name for a new contact: "Cliente WhatsApp " + last 4 characters
/// of the number (the whole number when shorter).
pub fn display_name(phone_number: &str) -> String {
    let tail = phone_number
        .char_indices()
        .nth_back(3)
        .map_or(phone_number, |(i, _)| &phone_number[i..]);
    format!("Cliente WhatsApp {}", tail)
}
