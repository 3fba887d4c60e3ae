//! Terminal session
//!
//! Holds the resolved client, the active connection, the log level, and the
//! realtime logging task. A session starts disconnected.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Level};

use kline_core::{
    CandleRequest, ConnectOptions, Connection, Endpoint, EventSubscription, KlineError,
    KlineResult, LogLevel, MarketDataClient,
};

use crate::batch::{BatchReport, BatchRunner, KlineQuery};
use crate::normalize::{to_api_timeframe, TimeframeRequest};

/// Event emitted on every partial series update; noisy at `info`
const DATA_UPDATE_EVENT: &str = "du";

/// Level at which a realtime event is logged under the given log level, if at all
pub fn realtime_event_level(level: LogLevel, event: &str) -> Option<Level> {
    match level {
        LogLevel::Trace | LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Info if event != DATA_UPDATE_EVENT => Some(Level::INFO),
        _ => None,
    }
}

struct ActiveConnection {
    connection: Arc<dyn Connection>,
    options: ConnectOptions,
}

pub struct ClientSession {
    client: Arc<dyn MarketDataClient>,
    runner: BatchRunner,
    active: Option<ActiveConnection>,
    log_level: Arc<RwLock<LogLevel>>,
    realtime: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("client", &self.client.name())
            .field("endpoint", &self.endpoint())
            .field("log_level", &self.log_level())
            .field("realtime", &self.realtime_enabled())
            .finish()
    }
}

impl ClientSession {
    pub fn new(client: Arc<dyn MarketDataClient>) -> Self {
        Self::with_runner(client, BatchRunner::new())
    }

    pub fn with_runner(client: Arc<dyn MarketDataClient>, runner: BatchRunner) -> Self {
        Self {
            client,
            runner,
            active: None,
            log_level: Arc::new(RwLock::new(LogLevel::default())),
            realtime: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.active.as_ref().map(|a| a.options.endpoint)
    }

    pub fn is_authenticated(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.options.is_authenticated())
    }

    pub fn log_level(&self) -> LogLevel {
        *self.log_level.read()
    }

    pub fn realtime_enabled(&self) -> bool {
        self.realtime.is_some()
    }

    /// Connect to the `data` endpoint without authentication
    pub async fn quick_connect(&mut self) -> KlineResult<()> {
        info!("=== Quick Connect Started ===");
        info!("Using: data endpoint (most reliable)");
        info!("Authentication: DISABLED");

        match self.open(ConnectOptions::new(Endpoint::Data)).await {
            Ok(()) => {
                info!("Quick connect successful!");
                info!("You can now load data");
                Ok(())
            }
            Err(e) => {
                error!("Quick connect failed: {}", e);
                warn!("This might indicate:");
                warn!("  1. Network connectivity issues");
                warn!("  2. TradingView servers are down");
                warn!("  3. Firewall blocking WebSocket connections");
                Err(e)
            }
        }
    }

    /// Connect to an endpoint, authenticated when a non-blank session id is given
    pub async fn connect(&mut self, endpoint: Endpoint, session_id: Option<String>) -> KlineResult<()> {
        let options = ConnectOptions::new(endpoint).with_session_id(session_id);

        info!("=== Connection Test Started ===");
        info!(endpoint = %endpoint, "Endpoint: {}", endpoint);
        if options.is_authenticated() {
            info!("Authentication: ENABLED (using session ID)");
        } else {
            warn!("Authentication: DISABLED (public data only)");
        }

        let authenticated = options.is_authenticated();
        match self.open(options).await {
            Ok(()) => {
                info!("Connection test successful!");
                if authenticated {
                    info!("Authenticated connection established");
                } else {
                    warn!("Connected without authentication - using public data");
                }
                Ok(())
            }
            Err(e) => {
                error!("Connection failed: {}", e);
                if authenticated {
                    warn!("Troubleshooting:");
                    warn!("  1. Check if your session ID is correct and not expired");
                    warn!("  2. Try logging out and back into TradingView");
                    warn!("  3. Try without session ID for public data");
                } else {
                    warn!("Troubleshooting:");
                    warn!("  1. Try a different endpoint (data is most reliable)");
                    warn!("  2. Check your network connection");
                    warn!("  3. Use Quick Connect for the simplest setup");
                }
                Err(e)
            }
        }
    }

    async fn open(&mut self, options: ConnectOptions) -> KlineResult<()> {
        if self.active.is_some() {
            self.disconnect().await;
        }

        info!("Creating {} client connection...", self.client.name());
        let connection = self.client.connect(options.clone()).await?;
        self.active = Some(ActiveConnection {
            connection,
            options,
        });
        Ok(())
    }

    /// Fetch every (symbol, timeframe) pair of the query
    pub async fn load_data(&mut self, query: &KlineQuery) -> KlineResult<BatchReport> {
        let active = self.active.as_ref().ok_or(KlineError::NotConnected)?;
        let connection = Arc::clone(&active.connection);
        self.runner.run(connection.as_ref(), query).await
    }

    /// Open a live series for `symbol`. Updates stream on the returned
    /// subscription until it is dropped or unsubscribed.
    pub async fn watch_series(
        &self,
        symbol: &str,
        timeframe: &TimeframeRequest,
    ) -> KlineResult<EventSubscription> {
        let active = self.active.as_ref().ok_or(KlineError::NotConnected)?;
        let request = CandleRequest {
            symbols: vec![symbol.to_string()],
            amount: timeframe.amount,
            timeframe: to_api_timeframe(&timeframe.label).to_string(),
        };

        info!(
            symbol,
            timeframe = %timeframe.label,
            "Watching {} {} ({} candles)",
            symbol, timeframe.label, timeframe.amount
        );
        active.connection.watch_series(request).await
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        *self.log_level.write() = level;
        info!(log_level = %level.as_str(), "Log level changed to: {}", level.as_str().to_uppercase());
    }

    /// Start logging realtime events. No-op without a connection or when
    /// already enabled.
    pub fn enable_realtime_logging(&mut self) {
        if self.realtime.is_some() {
            return;
        }
        let Some(active) = &self.active else {
            return;
        };

        let mut events = active.connection.subscribe();
        let log_level = Arc::clone(&self.log_level);

        self.realtime = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let current = *log_level.read();
                let Some(level) = realtime_event_level(current, &event.name) else {
                    continue;
                };
                if level == Level::DEBUG {
                    debug!(event = %event.name, params = ?event.params, "Real-time event: {}", event.name);
                } else {
                    info!(event = %event.name, "Real-time event: {}", event.name);
                }
            }
            debug!(skipped = events.skipped(), "Realtime event stream ended");
        }));
        info!("Real-time logging enabled");
    }

    pub fn disable_realtime_logging(&mut self) {
        if let Some(task) = self.realtime.take() {
            task.abort();
            info!("Real-time logging disabled");
        }
    }

    /// Flip realtime logging; returns whether it is now enabled
    pub fn toggle_realtime_logging(&mut self) -> bool {
        if self.realtime_enabled() {
            self.disable_realtime_logging();
        } else {
            self.enable_realtime_logging();
        }
        self.realtime_enabled()
    }

    /// Stop realtime logging and close the connection
    pub async fn disconnect(&mut self) {
        self.disable_realtime_logging();
        if let Some(active) = self.active.take() {
            active.connection.close().await;
            info!(endpoint = %active.options.endpoint, "Disconnected");
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if let Some(task) = self.realtime.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_level_policy() {
        assert_eq!(realtime_event_level(LogLevel::Debug, "du"), Some(Level::DEBUG));
        assert_eq!(realtime_event_level(LogLevel::Trace, "qsd"), Some(Level::DEBUG));
        assert_eq!(realtime_event_level(LogLevel::Info, "du"), None);
        assert_eq!(
            realtime_event_level(LogLevel::Info, "timescale_update"),
            Some(Level::INFO)
        );
        assert_eq!(realtime_event_level(LogLevel::Warn, "timescale_update"), None);
        assert_eq!(realtime_event_level(LogLevel::Fatal, "critical_error"), None);
    }
}
