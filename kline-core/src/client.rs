//! Market-data client abstraction
//!
//! The terminal never speaks a wire protocol itself. It connects through a
//! [`MarketDataClient`], then fetches candles and listens for events on the
//! returned [`Connection`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CandleSeries, Endpoint, EventSubscription, KlineResult};

/// Options for opening a connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    pub endpoint: Endpoint,
    /// Session credential for authenticated (premium) access
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ConnectOptions {
    /// Unauthenticated connection to the given endpoint
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            session_id: None,
        }
    }

    /// Attach a session id; blank ids are treated as absent
    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_id.is_some()
    }
}

/// A candle request as the client understands it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleRequest {
    pub symbols: Vec<String>,
    /// Number of candles to request per symbol
    pub amount: u32,
    /// Timeframe in the client's own format (e.g. `"60"`, `"1D"`)
    pub timeframe: String,
}

/// Entry point of a market-data client library
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Short name for logs ("tradingview", "replay", ...)
    fn name(&self) -> &str;

    /// Open a connection. Fails with a connection error when the transport
    /// cannot be established, or an auth error when the session is rejected.
    async fn connect(&self, options: ConnectOptions) -> KlineResult<Arc<dyn Connection>>;
}

/// An open connection to a market-data server
#[async_trait]
pub trait Connection: Send + Sync {
    /// Fetch one candle series per requested symbol, in request order.
    async fn get_candles(&self, request: CandleRequest) -> KlineResult<Vec<CandleSeries>>;

    /// Subscribe to the live event stream of this connection
    fn subscribe(&self) -> EventSubscription;

    /// Open the requested series and keep them streaming. Updates arrive on
    /// the returned subscription until it is dropped or unsubscribed, which
    /// releases the series on the server.
    async fn watch_series(&self, request: CandleRequest) -> KlineResult<EventSubscription>;

    /// Close the connection. Outstanding subscriptions end.
    async fn close(&self);
}
