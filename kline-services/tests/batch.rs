use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use kline_core::{
    Candle, CandleRequest, CandleSeries, Connection, Endpoint, EventSubscription, KlineError,
    KlineResult, RealtimeEvent,
};
use kline_services::{
    BatchRunner, FailureKind, KlineQuery, OutcomeStatus, TimeframeRequest, NO_DATA_MESSAGE,
};

/// Connection that answers from a fixed script and records every request
struct ScriptedConnection {
    responses: HashMap<String, Result<CandleSeries, String>>,
    requests: Mutex<Vec<CandleRequest>>,
    events: broadcast::Sender<RealtimeEvent>,
}

impl ScriptedConnection {
    fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            responses: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            events,
        }
    }

    fn candles(mut self, symbol: &str, count: usize) -> Self {
        let series = (0..count)
            .map(|i| Candle {
                timestamp: 1_700_000_000 + i as i64 * 3600,
                open: 10.0,
                high: 12.0,
                low: 9.0,
                close: 11.0,
                volume: 5.0,
            })
            .collect();
        self.responses.insert(symbol.to_string(), Ok(series));
        self
    }

    fn fails(mut self, symbol: &str, message: &str) -> Self {
        self.responses
            .insert(symbol.to_string(), Err(message.to_string()));
        self
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn get_candles(&self, request: CandleRequest) -> KlineResult<Vec<CandleSeries>> {
        let symbol = request.symbols[0].clone();
        self.requests.lock().push(request);
        match self.responses.get(&symbol) {
            Some(Ok(series)) => Ok(vec![series.clone()]),
            Some(Err(message)) => Err(KlineError::data(message.clone())),
            None => Ok(vec![]),
        }
    }

    async fn watch_series(&self, request: CandleRequest) -> KlineResult<EventSubscription> {
        self.requests.lock().push(request);
        Ok(self.subscribe())
    }

    fn subscribe(&self) -> EventSubscription {
        EventSubscription::new(self.events.subscribe())
    }

    async fn close(&self) {}
}

fn weekday_noon() -> BatchRunner {
    BatchRunner::with_clock(|| {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    })
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let connection = ScriptedConnection::new()
        .candles("FX:EURUSD", 4)
        .fails("BAD:SYM", "Symbol error: invalid symbol");

    let query = KlineQuery::new(
        vec!["FX:EURUSD".into(), "BAD:SYM".into(), "EMPTY:SYM".into()],
        vec![TimeframeRequest::new("1h", 50), TimeframeRequest::new("1D", 5)],
        Endpoint::Data,
    );

    let report = weekday_noon().run(&connection, &query).await.unwrap();
    let summary = &report.summary;

    assert_eq!(summary.total_requests, 6);
    assert_eq!(summary.completed, 6);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 4);
    assert_eq!(summary.completed, summary.successful + summary.failed);
    assert_eq!(summary.total_candles, 8);
    assert_eq!(summary.latency.samples, 6);

    let kinds: Vec<_> = summary.errors.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            FailureKind::Error,
            FailureKind::Error,
            FailureKind::NoData,
            FailureKind::NoData
        ]
    );
    assert_eq!(summary.errors[2].message, NO_DATA_MESSAGE);

    assert!(matches!(report.outcomes[0].status, OutcomeStatus::Success { .. }));
    assert_eq!(report.by_symbol().len(), 3);
}

#[tokio::test]
async fn test_requests_use_api_timeframes_in_order() {
    let connection = ScriptedConnection::new().candles("A", 1).candles("B", 1);
    let query = KlineQuery::new(
        vec!["A".into(), "B".into()],
        vec![
            TimeframeRequest::new("4h", 10),
            TimeframeRequest::new("1M", 3),
            TimeframeRequest::new("7x", 2),
        ],
        Endpoint::ProData,
    );

    weekday_noon().run(&connection, &query).await.unwrap();

    let requests = connection.requests.lock();
    let seen: Vec<_> = requests
        .iter()
        .map(|r| (r.symbols[0].as_str(), r.timeframe.as_str(), r.amount))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("A", "240", 10),
            ("A", "1M", 3),
            ("A", "7x", 2),
            ("B", "240", 10),
            ("B", "1M", 3),
            ("B", "7x", 2),
        ]
    );
}

#[tokio::test]
async fn test_invalid_query_sends_nothing() {
    let connection = Arc::new(ScriptedConnection::new());
    let query = KlineQuery::new(vec![], vec![TimeframeRequest::new("1h", 1)], Endpoint::Data);

    let err = weekday_noon()
        .run(connection.as_ref(), &query)
        .await
        .unwrap_err();
    assert!(matches!(err, KlineError::InvalidInput(_)));
    assert!(connection.requests.lock().is_empty());
}

#[tokio::test]
async fn test_report_serializes() {
    let connection = ScriptedConnection::new().candles("A", 2);
    let query = KlineQuery::new(vec!["A".into()], vec![TimeframeRequest::new("1h", 2)], Endpoint::Data);

    let report = weekday_noon().run(&connection, &query).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["query"]["endpoint"], "data");
    assert_eq!(json["outcomes"][0]["status"], "success");
    assert_eq!(json["summary"]["per_symbol"]["A"]["requests"], 1);
}
