//! Error types shared by every layer of the bot.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Exchange error ({status}): {message}")]
    Exchange { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Order failed: {0}")]
    Order(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed closed: {0}")]
    FeedClosed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Errors worth retrying after a delay: connection drops, timeouts,
    /// rate limits and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::Network(_)
            | BotError::RateLimited(_)
            | BotError::FeedClosed(_)
            | BotError::WebSocket(_)
            | BotError::Io(_) => true,
            BotError::Exchange { status, .. } => *status == 429 || *status >= 500,
            BotError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Errors that must stop trading until an operator intervenes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::Auth(_) | BotError::Config(_))
    }

    /// Classify a non-success HTTP status into the matching variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => BotError::Auth(message),
            429 => BotError::RateLimited(message),
            _ => BotError::Exchange { status, message },
        }
    }
}
