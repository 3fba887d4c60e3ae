//! TradingView market-data client
//!
//! Resolves the endpoint URL and auth token, then opens a
//! [`TradingViewConnection`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;
use url::Url;

use kline_core::{ConnectOptions, Connection, Endpoint, KlineResult, MarketDataClient};

use crate::auth::{fetch_auth_token, UNAUTHORIZED_TOKEN};
use crate::error::TradingViewError;
use crate::websocket::TradingViewConnection;

/// TradingView client
#[derive(Clone, Debug)]
pub struct TradingViewClient {
    http: Client,
}

impl TradingViewClient {
    /// Create a new client. Fails only if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TradingViewError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { http })
    }

    /// Socket URL for an endpoint
    pub fn endpoint_url(endpoint: Endpoint) -> Result<Url, TradingViewError> {
        Ok(Url::parse(&format!(
            "wss://{}.tradingview.com/socket.io/websocket",
            endpoint.name()
        ))?)
    }
}

#[async_trait]
impl MarketDataClient for TradingViewClient {
    fn name(&self) -> &str {
        "tradingview"
    }

    async fn connect(&self, options: ConnectOptions) -> KlineResult<Arc<dyn Connection>> {
        let url = Self::endpoint_url(options.endpoint)?;

        let token = match options.session_id.as_deref() {
            Some(session_id) => {
                info!("[TradingView WS] Resolving auth token for session");
                fetch_auth_token(&self.http, session_id).await?
            }
            None => UNAUTHORIZED_TOKEN.to_string(),
        };

        let connection = TradingViewConnection::open(&url, options.endpoint, &token).await?;
        Ok(Arc::new(connection))
    }
}
