//! Error types for the TradingView client

use kline_core::KlineError;
use thiserror::Error;

/// Errors raised while talking to TradingView
#[derive(Debug, Error)]
pub enum TradingViewError {
    /// WebSocket transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP request failed (auth token lookup)
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Session id rejected or auth token missing
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server closed the socket
    #[error("Connection closed")]
    Closed,

    /// Server reported an error for a request
    #[error("{0}")]
    Server(String),

    /// Malformed frame or message
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TradingViewError> for KlineError {
    fn from(err: TradingViewError) -> Self {
        match err {
            TradingViewError::WebSocket(_)
            | TradingViewError::Http(_)
            | TradingViewError::Closed
            | TradingViewError::InvalidUrl(_) => KlineError::connection(err.to_string()),
            TradingViewError::Auth(msg) => KlineError::Auth(msg),
            TradingViewError::Server(msg) => KlineError::Data(msg),
            TradingViewError::Protocol(_) | TradingViewError::Json(_) => {
                KlineError::protocol(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_into_kline_error() {
        assert!(matches!(
            KlineError::from(TradingViewError::Closed),
            KlineError::Connection(_)
        ));
        assert!(matches!(
            KlineError::from(TradingViewError::Auth("expired".into())),
            KlineError::Auth(msg) if msg == "expired"
        ));
        assert!(matches!(
            KlineError::from(TradingViewError::Server("invalid symbol".into())),
            KlineError::Data(msg) if msg == "invalid symbol"
        ));
    }
}
