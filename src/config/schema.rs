use crate::errors::{ZapdeskError, ZapdeskResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default, rename = "accountSid")]
    pub account_sid: String,
    #[serde(default, rename = "authToken")]
    pub auth_token: String,
    /// Sending address, e.g. "whatsapp:+14155238886".
    #[serde(default, rename = "whatsappNumber")]
    pub whatsapp_number: String,
    #[serde(default = "default_twilio_api_base", rename = "apiBase")]
    pub api_base: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            whatsapp_number: String::new(),
            api_base: default_twilio_api_base(),
        }
    }
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatwootConfig {
    #[serde(default, rename = "baseUrl")]
    pub base_url: String,
    #[serde(default, rename = "accountId")]
    pub account_id: String,
    #[serde(default, rename = "inboxId")]
    pub inbox_id: i64,
    #[serde(default, rename = "apiToken")]
    pub api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path", rename = "dbPath")]
    pub db_path: String,
    /// Directory where re-hosted agent media is written.
    #[serde(default = "default_media_dir", rename = "mediaDir")]
    pub media_dir: String,
    /// Public prefix under which the media directory is reachable,
    /// e.g. "https://bridge.example.com/media".
    #[serde(default = "default_public_base_url", rename = "publicBaseUrl")]
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            media_dir: default_media_dir(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_db_path() -> String {
    "~/.zapdesk/zapdesk.db".to_string()
}

fn default_media_dir() -> String {
    "~/.zapdesk/media".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080/media".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub chatwoot: ChatwootConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Check that everything `serve` needs is present before binding a port.
    pub fn validate(&self) -> ZapdeskResult<()> {
        if self.twilio.account_sid.is_empty() {
            return Err(ZapdeskError::Config("twilio.accountSid is required".into()));
        }
        if self.twilio.auth_token.is_empty() {
            return Err(ZapdeskError::Config("twilio.authToken is required".into()));
        }
        if self.twilio.whatsapp_number.is_empty() {
            return Err(ZapdeskError::Config(
                "twilio.whatsappNumber is required".into(),
            ));
        }
        if self.chatwoot.base_url.is_empty() {
            return Err(ZapdeskError::Config("chatwoot.baseUrl is required".into()));
        }
        if url::Url::parse(&self.chatwoot.base_url).is_err() {
            return Err(ZapdeskError::Config(format!(
                "chatwoot.baseUrl is not a valid URL: {}",
                self.chatwoot.base_url
            )));
        }
        if self.chatwoot.account_id.is_empty() {
            return Err(ZapdeskError::Config("chatwoot.accountId is required".into()));
        }
        if self.chatwoot.api_token.is_empty() {
            return Err(ZapdeskError::Config("chatwoot.apiToken is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_config() -> Config {
        Config {
            twilio: TwilioConfig {
                account_sid: "AC123".into(),
                auth_token: "token".into(),
                whatsapp_number: "whatsapp:+14155238886".into(),
                ..TwilioConfig::default()
            },
            chatwoot: ChatwootConfig {
                base_url: "https://chatwoot.example.com".into(),
                account_id: "1".into(),
                inbox_id: 2,
                api_token: "cw-token".into(),
            },
            ..Config::default()
        }
    }

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.twilio.api_base, "https://api.twilio.com");
        assert!(config.storage.db_path.ends_with("zapdesk.db"));
    }

    #[test]
    fn validate_accepts_filled_config() {
        assert!(filled_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_twilio_sid() {
        let mut config = filled_config();
        config.twilio.account_sid = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("accountSid"));
    }

    #[test]
    fn validate_rejects_bad_chatwoot_url() {
        let mut config = filled_config();
        config.chatwoot.base_url = "not a url".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("baseUrl"));
    }

    #[test]
    fn camel_case_keys_roundtrip() {
        let json = serde_json::json!({
            "twilio": {"accountSid": "AC9", "authToken": "t", "whatsappNumber": "whatsapp:+1"},
            "chatwoot": {"baseUrl": "https://cw", "accountId": "3", "inboxId": 7, "apiToken": "k"}
        });
        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.twilio.account_sid, "AC9");
        assert_eq!(config.chatwoot.inbox_id, 7);

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["chatwoot"]["inboxId"], 7);
        assert_eq!(back["twilio"]["accountSid"], "AC9");
    }
}
