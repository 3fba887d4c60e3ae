//! Error types for the terminal

use thiserror::Error;

/// Terminal-wide error type
#[derive(Error, Debug)]
pub enum KlineError {
    /// No market-data client could be resolved at startup
    #[error("Market data client unavailable: {0}")]
    ModuleUnavailable(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// A single candle request failed (bad symbol, rejected series, ...)
    #[error("Data error: {0}")]
    Data(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("No active connection. Please connect first.")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KlineError {
    pub fn module_unavailable(msg: impl Into<String>) -> Self {
        KlineError::ModuleUnavailable(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        KlineError::Connection(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        KlineError::Auth(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        KlineError::Data(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        KlineError::Protocol(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        KlineError::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        KlineError::Config(msg.into())
    }

    /// Whether the user can reasonably retry after this error
    /// (connection-level failures, as opposed to a missing client module)
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, KlineError::ModuleUnavailable(_))
    }
}

/// Result type alias for terminal operations
pub type KlineResult<T> = Result<T, KlineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_connected_message() {
        assert_eq!(
            KlineError::NotConnected.to_string(),
            "No active connection. Please connect first."
        );
    }

    #[test]
    fn test_invalid_input_is_bare_message() {
        let err = KlineError::invalid_input("Please enter at least one symbol");
        assert_eq!(err.to_string(), "Please enter at least one symbol");
    }

    #[test]
    fn test_recoverable() {
        assert!(KlineError::connection("refused").is_recoverable());
        assert!(KlineError::auth("expired").is_recoverable());
        assert!(!KlineError::module_unavailable("none").is_recoverable());
    }
}
