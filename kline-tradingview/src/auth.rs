//! Auth token lookup
//!
//! Anonymous connections use the fixed `unauthorized_user_token`. With a
//! session id, the token embedded in the home page (served with the
//! `sessionid` cookie) is used instead.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::TradingViewError;

/// Token accepted for public (unauthenticated) data
pub const UNAUTHORIZED_TOKEN: &str = "unauthorized_user_token";

const HOME_URL: &str = "https://www.tradingview.com/";

static AUTH_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""auth_token":"([^"]+)""#).expect("auth token regex"));

/// Pull `"auth_token":"..."` out of a page body
pub fn extract_auth_token(body: &str) -> Option<String> {
    AUTH_TOKEN_PATTERN
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Resolve the auth token for a session id
#[instrument(skip_all)]
pub async fn fetch_auth_token(http: &Client, session_id: &str) -> Result<String, TradingViewError> {
    let body = http
        .get(HOME_URL)
        .header(COOKIE, format!("sessionid={}", session_id))
        .header(USER_AGENT, "Mozilla/5.0 (kline-terminal)")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    debug!("Fetched home page ({} bytes) for token lookup", body.len());

    extract_auth_token(&body)
        .ok_or_else(|| TradingViewError::Auth("Session ID expired or invalid".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_auth_token() {
        let body = r#"<script>window.user = {"username":"x","auth_token":"eyJhbGci.abc","is_pro":true};</script>"#;
        assert_eq!(extract_auth_token(body), Some("eyJhbGci.abc".to_string()));
    }

    #[test]
    fn test_extract_auth_token_missing() {
        assert_eq!(extract_auth_token("<html>logged out</html>"), None);
    }
}
