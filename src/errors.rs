use thiserror::Error;

/// Typed error hierarchy for zapdesk.
///
/// Use at module boundaries (remote API calls, config validation, webhook
/// workflows). Internal/leaf functions can continue using `anyhow::Result` —
/// the `Internal` variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum ZapdeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chatwoot API error: {message}")]
    Chatwoot { message: String },

    #[error("Twilio API error: {message}")]
    Twilio { message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using ZapdeskError.
pub type ZapdeskResult<T> = std::result::Result<T, ZapdeskError>;
