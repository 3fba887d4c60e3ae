//! TradingView WebSocket connection
//!
//! One background task owns the socket: it answers heartbeats, forwards
//! outgoing messages from a command channel, and broadcasts every named server
//! message as a [`RealtimeEvent`]. Candle requests and realtime subscribers are
//! both consumers of that broadcast.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use kline_core::{
    Candle, CandleRequest, CandleSeries, Connection, Endpoint, EventSubscription, KlineResult,
    RealtimeEvent,
};

use crate::error::TradingViewError;
use crate::protocol::{
    chart_session_id, decode_frames, encode_frame, error_reason, series_candles, ClientMessage,
    Packet, SERIES_ID,
};

/// Origin header the server insists on
const ORIGIN: &str = "https://www.tradingview.com";

const EVENT_CHANNEL_CAPACITY: usize = 1024;

const COMMAND_CHANNEL_CAPACITY: usize = 100;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Event sender shared with subscribers; cleared when the socket task exits so
/// every receiver observes the close.
type SharedEventSender = Arc<Mutex<Option<broadcast::Sender<RealtimeEvent>>>>;

/// Commands sent to the socket task
#[derive(Debug)]
enum ConnectionCommand {
    Send(ClientMessage),
    Close,
}

/// An open TradingView socket
pub struct TradingViewConnection {
    endpoint: Endpoint,
    command_tx: mpsc::Sender<ConnectionCommand>,
    event_tx: SharedEventSender,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TradingViewConnection {
    /// Connect, wait for the server hello, and authenticate with `auth_token`
    pub async fn open(
        url: &Url,
        endpoint: Endpoint,
        auth_token: &str,
    ) -> Result<Self, TradingViewError> {
        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_static(ORIGIN));

        info!("[TradingView WS] Connecting to {}", url);
        let (ws_stream, _) = connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        Self::await_hello(&mut write, &mut read).await?;
        info!("[TradingView WS] Connected to {} endpoint", endpoint);

        let auth = ClientMessage::set_auth_token(auth_token).to_frame()?;
        write.send(Message::Text(auth.into())).await?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared: SharedEventSender = Arc::new(Mutex::new(Some(event_tx.clone())));

        let task = tokio::spawn(Self::connection_loop(
            write,
            read,
            command_rx,
            event_tx,
            Arc::clone(&shared),
        ));

        Ok(Self {
            endpoint,
            command_tx,
            event_tx: shared,
            task: Mutex::new(Some(task)),
        })
    }

    /// Whether the socket task is still running
    pub fn is_open(&self) -> bool {
        self.event_tx.lock().is_some()
    }

    /// Wait for the first non-heartbeat frame, echoing heartbeats meanwhile
    async fn await_hello(write: &mut WsSink, read: &mut WsSource) -> Result<(), TradingViewError> {
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let mut greeted = false;
                    for packet in decode_frames(text.as_str()) {
                        match packet {
                            Packet::Heartbeat(beat) => {
                                write.send(Message::Text(encode_frame(&beat).into())).await?;
                            }
                            Packet::Hello(info) => {
                                debug!("[TradingView WS] Server hello: {}", info);
                                greeted = true;
                            }
                            Packet::Message(_) => greeted = true,
                            Packet::Unknown(raw) => {
                                return Err(TradingViewError::Protocol(format!(
                                    "unexpected greeting: {}",
                                    raw
                                )));
                            }
                        }
                    }
                    if greeted {
                        return Ok(());
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Err(TradingViewError::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Socket task: runs until the server closes, a send fails, or a close
    /// command arrives
    async fn connection_loop(
        mut write: WsSink,
        mut read: WsSource,
        mut command_rx: mpsc::Receiver<ConnectionCommand>,
        event_tx: broadcast::Sender<RealtimeEvent>,
        shared: SharedEventSender,
    ) {
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let mut alive = true;
                            for packet in decode_frames(text.as_str()) {
                                match packet {
                                    Packet::Heartbeat(beat) => {
                                        trace!("[TradingView WS] Heartbeat {}", beat);
                                        if let Err(e) = write.send(Message::Text(encode_frame(&beat).into())).await {
                                            warn!("[TradingView WS] Failed to echo heartbeat: {}", e);
                                            alive = false;
                                            break;
                                        }
                                    }
                                    Packet::Message(message) => {
                                        trace!("[TradingView WS] <- {}", message.m);
                                        // No subscribers is fine
                                        let _ = event_tx.send(message.into());
                                    }
                                    Packet::Hello(_) => {}
                                    Packet::Unknown(raw) => {
                                        debug!("[TradingView WS] Failed to parse frame: {}", raw);
                                    }
                                }
                            }
                            if !alive {
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!("[TradingView WS] Failed to send pong: {}", e);
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("[TradingView WS] Connection closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[TradingView WS] Error: {}", e);
                            break;
                        }
                        None => {
                            info!("[TradingView WS] Stream ended");
                            break;
                        }
                        _ => {}
                    }
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(ConnectionCommand::Send(message)) => {
                            let frame = match message.to_frame() {
                                Ok(frame) => frame,
                                Err(e) => {
                                    warn!("[TradingView WS] Failed to encode {}: {}", message.m, e);
                                    continue;
                                }
                            };
                            trace!("[TradingView WS] -> {}", message.m);
                            if let Err(e) = write.send(Message::Text(frame.into())).await {
                                warn!("[TradingView WS] Failed to send {}: {}", message.m, e);
                                break;
                            }
                        }
                        Some(ConnectionCommand::Close) | None => {
                            info!("[TradingView WS] Closing connection");
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
            }
        }

        shared.lock().take();
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TradingViewError> {
        self.command_tx
            .send(ConnectionCommand::Send(message))
            .await
            .map_err(|_| TradingViewError::Closed)
    }

    /// Request one series in a throwaway chart session
    async fn fetch_series(
        &self,
        symbol: &str,
        timeframe: &str,
        amount: u32,
    ) -> Result<CandleSeries, TradingViewError> {
        // Subscribe before sending so no reply can slip past
        let mut events = self.subscribe();
        let chart_session = chart_session_id();

        debug!(
            "[TradingView WS] {} requesting {} x {} in {}",
            symbol, amount, timeframe, chart_session
        );

        self.send(ClientMessage::chart_create_session(&chart_session)).await?;
        self.send(ClientMessage::resolve_symbol(&chart_session, symbol)).await?;
        self.send(ClientMessage::create_series(&chart_session, timeframe, amount))
            .await?;

        let result = collect_series(&mut events, &chart_session).await;
        events.unsubscribe();

        if let Err(e) = self
            .send(ClientMessage::chart_delete_session(&chart_session))
            .await
        {
            debug!("[TradingView WS] Could not delete {}: {}", chart_session, e);
        }

        result
    }

    /// Open a chart session per symbol and leave them streaming. The returned
    /// subscription deletes the sessions when it ends.
    async fn open_watch(&self, request: &CandleRequest) -> Result<EventSubscription, TradingViewError> {
        // Subscribe before sending so the initial burst is captured
        let rx = self.event_tx.lock().as_ref().map(|tx| tx.subscribe());
        let Some(rx) = rx else {
            return Err(TradingViewError::Closed);
        };

        let mut chart_sessions = Vec::with_capacity(request.symbols.len());
        for symbol in &request.symbols {
            let chart_session = chart_session_id();
            info!(
                "[TradingView WS] Watching {} ({}) in {}",
                symbol, request.timeframe, chart_session
            );
            self.send(ClientMessage::chart_create_session(&chart_session)).await?;
            self.send(ClientMessage::resolve_symbol(&chart_session, symbol)).await?;
            self.send(ClientMessage::create_series(
                &chart_session,
                &request.timeframe,
                request.amount,
            ))
            .await?;
            chart_sessions.push(chart_session);
        }

        let command_tx = self.command_tx.clone();
        Ok(EventSubscription::with_release(rx, move || {
            for chart_session in chart_sessions {
                debug!("[TradingView WS] Releasing {}", chart_session);
                // Fails only once the socket task is gone, which drops the sessions anyway
                let _ = command_tx.try_send(ConnectionCommand::Send(
                    ClientMessage::chart_delete_session(&chart_session),
                ));
            }
        }))
    }
}

/// Gather series points for `chart_session` until the series completes
async fn collect_series(
    events: &mut EventSubscription,
    chart_session: &str,
) -> Result<CandleSeries, TradingViewError> {
    let mut candles: BTreeMap<i64, Candle> = BTreeMap::new();

    while let Some(event) = events.next().await {
        // Connection-wide failures carry no chart session
        if matches!(event.name.as_str(), "critical_error" | "protocol_error") {
            let reason = event
                .params
                .iter()
                .filter_map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(": ");
            return Err(TradingViewError::Server(format!("{}: {}", event.name, reason)));
        }

        if event.session_id() != Some(chart_session) {
            continue;
        }

        match event.name.as_str() {
            "timescale_update" | "du" => {
                for candle in series_candles(&event.params, SERIES_ID) {
                    candles.insert(candle.timestamp, candle);
                }
            }
            "series_completed" => {
                let missed = events.skipped();
                if missed > 0 {
                    return Err(TradingViewError::Protocol(format!(
                        "missed {} series updates",
                        missed
                    )));
                }
                return Ok(candles.into_values().collect());
            }
            "symbol_error" => {
                return Err(TradingViewError::Server(format!(
                    "Symbol error: {}",
                    error_reason(&event.params)
                )));
            }
            "series_error" => {
                return Err(TradingViewError::Server(format!(
                    "Series error: {}",
                    error_reason(&event.params)
                )));
            }
            _ => {}
        }
    }

    Err(TradingViewError::Closed)
}

#[async_trait]
impl Connection for TradingViewConnection {
    async fn get_candles(&self, request: CandleRequest) -> KlineResult<Vec<CandleSeries>> {
        let mut all = Vec::with_capacity(request.symbols.len());
        for symbol in &request.symbols {
            let series = self
                .fetch_series(symbol, &request.timeframe, request.amount)
                .await?;
            all.push(series);
        }
        Ok(all)
    }

    async fn watch_series(&self, request: CandleRequest) -> KlineResult<EventSubscription> {
        Ok(self.open_watch(&request).await?)
    }

    fn subscribe(&self) -> EventSubscription {
        match self.event_tx.lock().as_ref() {
            Some(tx) => EventSubscription::new(tx.subscribe()),
            None => {
                // Already closed: hand out a subscription that ends immediately
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                EventSubscription::new(rx)
            }
        }
    }

    async fn close(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Close).await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("[TradingView WS] Socket task ended abnormally: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for TradingViewConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingViewConnection")
            .field("endpoint", &self.endpoint)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, params: Vec<serde_json::Value>) -> RealtimeEvent {
        RealtimeEvent::new(name, params)
    }

    #[tokio::test]
    async fn test_collect_series_until_completed() {
        let (tx, rx) = broadcast::channel(16);
        let mut events = EventSubscription::new(rx);

        let points = json!({"sds_1": {"s": [
            {"i": 1, "v": [120.0, 2.0, 3.0, 1.0, 2.5, 10.0]},
            {"i": 0, "v": [60.0, 1.0, 2.0, 0.5, 1.5, 5.0]}
        ]}});
        tx.send(event("timescale_update", vec![json!("cs_other"), points.clone()]))
            .unwrap();
        tx.send(event("timescale_update", vec![json!("cs_mine"), points]))
            .unwrap();
        tx.send(event("series_completed", vec![json!("cs_mine"), json!("sds_1")]))
            .unwrap();

        let candles = collect_series(&mut events, "cs_mine").await.unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 60);
        assert_eq!(candles[1].timestamp, 120);
    }

    #[tokio::test]
    async fn test_collect_series_symbol_error() {
        let (tx, rx) = broadcast::channel(16);
        let mut events = EventSubscription::new(rx);
        tx.send(event(
            "symbol_error",
            vec![json!("cs_mine"), json!("sds_sym_1"), json!("invalid symbol")],
        ))
        .unwrap();

        let err = collect_series(&mut events, "cs_mine").await.unwrap_err();
        assert_eq!(err.to_string(), "Symbol error: invalid symbol");
    }

    #[tokio::test]
    async fn test_collect_series_closed() {
        let (tx, rx) = broadcast::channel::<RealtimeEvent>(16);
        let mut events = EventSubscription::new(rx);
        drop(tx);

        let err = collect_series(&mut events, "cs_mine").await.unwrap_err();
        assert!(matches!(err, TradingViewError::Closed));
    }

    #[tokio::test]
    async fn test_collect_series_critical_error() {
        let (tx, rx) = broadcast::channel(16);
        let mut events = EventSubscription::new(rx);
        tx.send(event("critical_error", vec![json!("wrong data")]))
            .unwrap();

        let err = collect_series(&mut events, "cs_mine").await.unwrap_err();
        assert_eq!(err.to_string(), "critical_error: wrong data");
    }

    #[tokio::test]
    async fn test_collect_series_rejects_lagged_stream() {
        let (tx, rx) = broadcast::channel(2);
        let mut events = EventSubscription::new(rx);

        for i in 0..4 {
            let points = json!({"sds_1": {"s": [
                {"i": i, "v": [60.0 * (i + 1) as f64, 1.0, 2.0, 0.5, 1.5, 5.0]}
            ]}});
            tx.send(event("timescale_update", vec![json!("cs_mine"), points]))
                .unwrap();
        }
        tx.send(event("series_completed", vec![json!("cs_mine"), json!("sds_1")]))
            .unwrap();

        let err = collect_series(&mut events, "cs_mine").await.unwrap_err();
        assert!(matches!(err, TradingViewError::Protocol(_)));
        assert_eq!(err.to_string(), "Protocol error: missed 3 series updates");
    }

    /// Connection without a socket task; commands land in the returned receiver
    fn detached() -> (
        TradingViewConnection,
        mpsc::Receiver<ConnectionCommand>,
        broadcast::Sender<RealtimeEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(16);
        let connection = TradingViewConnection {
            endpoint: Endpoint::Data,
            command_tx,
            event_tx: Arc::new(Mutex::new(Some(event_tx.clone()))),
            task: Mutex::new(None),
        };
        (connection, command_rx, event_tx)
    }

    fn sent(commands: &mut mpsc::Receiver<ConnectionCommand>) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(cmd) = commands.try_recv() {
            if let ConnectionCommand::Send(message) = cmd {
                messages.push(message);
            }
        }
        messages
    }

    #[tokio::test]
    async fn test_watch_series_holds_chart_session_until_unsubscribed() {
        let (connection, mut commands, events_tx) = detached();
        let request = CandleRequest {
            symbols: vec!["BINANCE:BTCUSDT".to_string()],
            amount: 10,
            timeframe: "1".to_string(),
        };

        let mut watch = connection.watch_series(request).await.unwrap();
        let opened = sent(&mut commands);
        let methods: Vec<&str> = opened.iter().map(|m| m.m.as_str()).collect();
        assert_eq!(methods, ["chart_create_session", "resolve_symbol", "create_series"]);
        let chart_session = opened[0].p[0].clone();

        // updates keep flowing and nothing is torn down while the watch is held
        events_tx
            .send(event("du", vec![chart_session.clone()]))
            .unwrap();
        assert_eq!(watch.next().await.unwrap().name, "du");
        assert!(sent(&mut commands).is_empty());

        watch.unsubscribe();
        let released = sent(&mut commands);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].m, "chart_delete_session");
        assert_eq!(released[0].p[0], chart_session);
    }

    #[tokio::test]
    async fn test_watch_series_on_closed_connection() {
        let (connection, _commands, _events_tx) = detached();
        connection.event_tx.lock().take();

        let request = CandleRequest {
            symbols: vec!["FX:EURUSD".to_string()],
            amount: 10,
            timeframe: "1D".to_string(),
        };
        assert!(connection.watch_series(request).await.is_err());
    }
}
