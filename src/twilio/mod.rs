use crate::config::TwilioConfig;
use crate::errors::{ZapdeskError, ZapdeskResult};
use crate::utils::http::default_http_client;
use std::collections::HashMap;

/// One media item attached to an inbound WhatsApp message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMedia {
    pub url: String,
    pub content_type: String,
}

/// Normalized inbound webhook payload.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
    pub message_sid: Option<String>,
    pub media: Vec<InboundMedia>,
}

/// Parse the form-encoded fields Twilio posts to the inbound webhook.
///
/// `NumMedia` drives how many `MediaUrl{i}`/`MediaContentType{i}` pairs are
/// read; entries with a missing URL are skipped.
pub fn parse_inbound(params: &HashMap<String, String>) -> InboundMessage {
    let from = params.get("From").cloned().unwrap_or_default();
    let body = params
        .get("Body")
        .map(|b| b.trim().to_string())
        .unwrap_or_default();
    let message_sid = params.get("MessageSid").cloned();

    let num_media: usize = params
        .get("NumMedia")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    let mut media = Vec::new();
    for i in 0..num_media {
        let Some(url) = params.get(&format!("MediaUrl{}", i)) else {
            continue;
        };
        let content_type = params
            .get(&format!("MediaContentType{}", i))
            .cloned()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        media.push(InboundMedia {
            url: url.clone(),
            content_type,
        });
    }

    InboundMessage {
        from,
        body,
        message_sid,
        media,
    }
}

/// Render a TwiML messaging response with zero or one reply message.
/// An empty `<Response/>` document is a silent ack.
pub fn messaging_response(message: Option<&str>) -> String {
    match message {
        Some(text) => {
            let escaped = html_escape::encode_text(text);
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response><Message>{}</Message></Response>",
                escaped
            )
        }
        None => {
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response></Response>".to_string()
        }
    }
}

/// Client for Twilio's messaging API. Fire-and-forget sends; delivery
/// receipts are not checked.
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
}

impl TwilioClient {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            http: default_http_client(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.whatsapp_number.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    pub async fn send_text(&self, to: &str, body: &str) -> ZapdeskResult<()> {
        self.send_message(to, body, None).await
    }

    pub async fn send_media(&self, to: &str, body: &str, media_url: &str) -> ZapdeskResult<()> {
        self.send_message(to, body, Some(media_url)).await
    }

    async fn send_message(
        &self,
        to: &str,
        body: &str,
        media_url: Option<&str>,
    ) -> ZapdeskResult<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        let mut form = vec![
            ("From", self.from_number.as_str()),
            ("To", to),
            ("Body", body),
        ];
        if let Some(media) = media_url {
            form.push(("MediaUrl", media));
        }

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| ZapdeskError::Twilio {
                message: format!("send failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(ZapdeskError::Twilio {
                message: format!("HTTP {}: {}", status, body),
            });
        }
        Ok(())
    }
}
