//! Offline market-data client
//!
//! Serves candles from JSON fixtures instead of a live server. A fixture
//! directory holds one file per symbol and timeframe, named
//! `<SYMBOL>_<timeframe>.json` with every non-alphanumeric character of the
//! symbol replaced by `_` (`BINANCE:BTCUSDT` + `60` -> `BINANCE_BTCUSDT_60.json`).
//! A file contains either a candle array or `{"error": "<message>"}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;

use kline_core::{
    CandleRequest, CandleSeries, ConnectOptions, Connection, EventSubscription, KlineError,
    KlineResult, MarketDataClient, RealtimeEvent,
};

const EVENT_CAPACITY: usize = 256;

/// What a fixture resolves to
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplayEntry {
    Candles(CandleSeries),
    Error { error: String },
}

/// Explicit entries, backed by an optional fixture directory
#[derive(Debug, Clone, Default)]
struct ReplaySource {
    dir: Option<PathBuf>,
    entries: HashMap<(String, String), ReplayEntry>,
}

impl ReplaySource {
    async fn lookup(&self, symbol: &str, timeframe: &str) -> KlineResult<Option<ReplayEntry>> {
        if let Some(entry) = self
            .entries
            .get(&(symbol.to_string(), timeframe.to_string()))
        {
            return Ok(Some(entry.clone()));
        }

        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let path = dir.join(fixture_file_name(symbol, timeframe));
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => serde_json::from_str(&body).map(Some).map_err(|e| {
                KlineError::data(format!("Invalid fixture {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// File name of the fixture for a symbol and client timeframe
pub fn fixture_file_name(symbol: &str, timeframe: &str) -> String {
    let symbol: String = symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}.json", symbol, timeframe)
}

/// Client that replays recorded candles
#[derive(Debug, Clone)]
pub struct ReplayClient {
    source: Arc<ReplaySource>,
    refuse_with: Option<String>,
}

impl ReplayClient {
    /// Replay fixtures from a directory. Fails when the directory is missing.
    pub fn from_dir(dir: impl AsRef<Path>) -> KlineResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(KlineError::config(format!(
                "Fixture directory not found: {}",
                dir.display()
            )));
        }

        Ok(Self {
            source: Arc::new(ReplaySource {
                dir: Some(dir.to_path_buf()),
                entries: HashMap::new(),
            }),
            refuse_with: None,
        })
    }

    /// Start an empty in-memory replay
    pub fn in_memory() -> Self {
        Self {
            source: Arc::new(ReplaySource::default()),
            refuse_with: None,
        }
    }

    /// Add a series for a symbol and client timeframe; takes precedence over
    /// a fixture file
    pub fn with_series(self, symbol: &str, timeframe: &str, candles: CandleSeries) -> Self {
        self.with_entry(symbol, timeframe, ReplayEntry::Candles(candles))
    }

    /// Make requests for a symbol and client timeframe fail
    pub fn with_error(self, symbol: &str, timeframe: &str, message: &str) -> Self {
        self.with_entry(
            symbol,
            timeframe,
            ReplayEntry::Error {
                error: message.to_string(),
            },
        )
    }

    /// Refuse every connection attempt with a connection error
    pub fn refuse_connections(mut self, message: &str) -> Self {
        self.refuse_with = Some(message.to_string());
        self
    }

    fn with_entry(mut self, symbol: &str, timeframe: &str, entry: ReplayEntry) -> Self {
        // Connections already handed out keep the entries they were opened with
        Arc::make_mut(&mut self.source)
            .entries
            .insert((symbol.to_string(), timeframe.to_string()), entry);
        self
    }
}

#[async_trait]
impl MarketDataClient for ReplayClient {
    fn name(&self) -> &str {
        "replay"
    }

    async fn connect(&self, options: ConnectOptions) -> KlineResult<Arc<dyn Connection>> {
        if let Some(message) = &self.refuse_with {
            return Err(KlineError::connection(message.clone()));
        }

        debug!(endpoint = %options.endpoint, "Opening replay connection");
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new(ReplayConnection {
            source: Arc::clone(&self.source),
            events,
        }))
    }
}

/// Connection handed out by [`ReplayClient`]
#[derive(Debug)]
pub struct ReplayConnection {
    source: Arc<ReplaySource>,
    events: broadcast::Sender<RealtimeEvent>,
}

impl ReplayConnection {
    fn emit(&self, name: &str, symbol: &str) {
        // No subscribers is fine
        let _ = self.events.send(RealtimeEvent::new(name, vec![json!(symbol)]));
    }

    /// Replay one series, emitting the events a live server would send
    async fn replay(&self, symbol: &str, request: &CandleRequest) -> KlineResult<CandleSeries> {
        match self.source.lookup(symbol, &request.timeframe).await? {
            Some(ReplayEntry::Candles(mut candles)) => {
                let amount = request.amount as usize;
                if candles.len() > amount {
                    candles.drain(..candles.len() - amount);
                }
                self.emit("timescale_update", symbol);
                self.emit("series_completed", symbol);
                Ok(candles)
            }
            Some(ReplayEntry::Error { error }) => {
                self.emit("symbol_error", symbol);
                Err(KlineError::data(error))
            }
            None => {
                self.emit("series_completed", symbol);
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl Connection for ReplayConnection {
    async fn get_candles(&self, request: CandleRequest) -> KlineResult<Vec<CandleSeries>> {
        let mut result = Vec::with_capacity(request.symbols.len());
        for symbol in &request.symbols {
            result.push(self.replay(symbol, &request).await?);
        }
        Ok(result)
    }

    /// Recorded series never update, so the stream carries the initial
    /// replay and then stays quiet until dropped
    async fn watch_series(&self, request: CandleRequest) -> KlineResult<EventSubscription> {
        let subscription = self.subscribe();
        for symbol in &request.symbols {
            self.replay(symbol, &request).await?;
        }
        Ok(subscription)
    }

    fn subscribe(&self) -> EventSubscription {
        EventSubscription::new(self.events.subscribe())
    }

    async fn close(&self) {
        debug!("Replay connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kline_core::{Candle, Endpoint};

    fn series(n: i64) -> CandleSeries {
        (0..n)
            .map(|i| Candle {
                timestamp: i * 3600,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0.0,
            })
            .collect()
    }

    fn request(symbol: &str, timeframe: &str, amount: u32) -> CandleRequest {
        CandleRequest {
            symbols: vec![symbol.to_string()],
            amount,
            timeframe: timeframe.to_string(),
        }
    }

    #[test]
    fn test_fixture_file_name() {
        assert_eq!(
            fixture_file_name("BINANCE:BTCUSDT.P", "60"),
            "BINANCE_BTCUSDT_P_60.json"
        );
        assert_eq!(fixture_file_name("FX:EURUSD", "1D"), "FX_EURUSD_1D.json");
    }

    #[tokio::test]
    async fn test_in_memory_keeps_latest_candles() {
        let client = ReplayClient::in_memory().with_series("FX:EURUSD", "60", series(10));
        let conn = client.connect(ConnectOptions::new(Endpoint::Data)).await.unwrap();

        let result = conn.get_candles(request("FX:EURUSD", "60", 4)).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 4);
        assert_eq!(result[0][0].timestamp, 6 * 3600);
    }

    #[tokio::test]
    async fn test_missing_series_is_empty() {
        let client = ReplayClient::in_memory();
        let conn = client.connect(ConnectOptions::default()).await.unwrap();

        let result = conn.get_candles(request("NOPE", "60", 4)).await.unwrap();
        assert_eq!(result, vec![Vec::<Candle>::new()]);
    }

    #[tokio::test]
    async fn test_error_entry_and_events() {
        let client = ReplayClient::in_memory().with_error("BAD:SYM", "1D", "invalid symbol");
        let conn = client.connect(ConnectOptions::default()).await.unwrap();
        let mut events = conn.subscribe();

        let err = conn.get_candles(request("BAD:SYM", "1D", 5)).await.unwrap_err();
        assert!(matches!(err, KlineError::Data(ref m) if m == "invalid symbol"));

        let event = events.next().await.unwrap();
        assert_eq!(event.name, "symbol_error");
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let client = ReplayClient::in_memory().refuse_connections("offline");
        let err = client
            .connect(ConnectOptions::default())
            .await
            .err()
            .expect("connection should be refused");
        assert!(matches!(err, KlineError::Connection(_)));
    }

    #[tokio::test]
    async fn test_directory_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("NASDAQ_AAPL_1D.json"),
            serde_json::to_string(&series(3)).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("NASDAQ_XXXX_1D.json"),
            r#"{"error": "Symbol error: invalid symbol"}"#,
        )
        .unwrap();

        let client = ReplayClient::from_dir(dir.path()).unwrap();
        let conn = client.connect(ConnectOptions::default()).await.unwrap();

        let ok = conn.get_candles(request("NASDAQ:AAPL", "1D", 30)).await.unwrap();
        assert_eq!(ok[0].len(), 3);

        let err = conn.get_candles(request("NASDAQ:XXXX", "1D", 30)).await.unwrap_err();
        assert_eq!(err.to_string(), "Data error: Symbol error: invalid symbol");

        let missing = conn.get_candles(request("NYSE:IBM", "1D", 30)).await.unwrap();
        assert!(missing[0].is_empty());
    }

    #[tokio::test]
    async fn test_entries_added_after_clone() {
        let client = ReplayClient::in_memory();
        let _shared = client.clone();

        let client = client.with_series("FX:EURUSD", "60", series(2));
        let conn = client.connect(ConnectOptions::default()).await.unwrap();
        let result = conn.get_candles(request("FX:EURUSD", "60", 10)).await.unwrap();
        assert_eq!(result[0].len(), 2);
    }

    #[tokio::test]
    async fn test_entries_override_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("NASDAQ_AAPL_1D.json"),
            serde_json::to_string(&series(3)).unwrap(),
        )
        .unwrap();

        let client = ReplayClient::from_dir(dir.path())
            .unwrap()
            .with_error("NASDAQ:AAPL", "1D", "halted")
            .with_series("NASDAQ:MSFT", "1D", series(5));
        let conn = client.connect(ConnectOptions::default()).await.unwrap();

        let err = conn.get_candles(request("NASDAQ:AAPL", "1D", 30)).await.unwrap_err();
        assert_eq!(err.to_string(), "Data error: halted");
        let ok = conn.get_candles(request("NASDAQ:MSFT", "1D", 30)).await.unwrap();
        assert_eq!(ok[0].len(), 5);
    }

    #[tokio::test]
    async fn test_watch_series_replays_initial_events() {
        let client = ReplayClient::in_memory()
            .with_series("FX:EURUSD", "60", series(3))
            .with_error("BAD:SYM", "60", "invalid symbol");
        let conn = client.connect(ConnectOptions::default()).await.unwrap();

        let mut watch = conn.watch_series(request("FX:EURUSD", "60", 10)).await.unwrap();
        assert_eq!(watch.next().await.unwrap().name, "timescale_update");
        assert_eq!(watch.next().await.unwrap().name, "series_completed");

        let err = conn.watch_series(request("BAD:SYM", "60", 10)).await.unwrap_err();
        assert!(matches!(err, KlineError::Data(_)));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReplayClient::from_dir(dir.path().join("absent")).is_err());
    }
}
