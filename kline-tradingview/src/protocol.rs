//! TradingView socket framing and message types
//!
//! Every socket text message carries one or more frames of the form
//! `~m~<len>~m~<payload>`. A payload is either a heartbeat (`~h~<n>`), which
//! must be echoed back, or a JSON object. Server messages look like
//! `{"m": "<name>", "p": [...]}`; the very first frame after connecting is a
//! server-info object without an `m` field.

use std::sync::LazyLock;

use kline_core::{Candle, RealtimeEvent};
use rand::distr::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

static FRAME_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~m~\d+~m~").expect("frame separator regex"));

const HEARTBEAT_PREFIX: &str = "~h~";

/// Series id used for every chart session we create (one series per session)
pub const SERIES_ID: &str = "sds_1";

/// Symbol alias resolved inside a chart session
pub const SYMBOL_ALIAS: &str = "sds_sym_1";

// ============================================================================
// Framing
// ============================================================================

/// Wrap a payload in a frame. The length is counted in UTF-16 units, which is
/// what the server expects.
pub fn encode_frame(payload: &str) -> String {
    format!("~m~{}~m~{}", payload.encode_utf16().count(), payload)
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Heartbeat payload (`~h~<n>`), to be echoed back verbatim
    Heartbeat(String),
    /// Named server message
    Message(ServerMessage),
    /// Server-info object sent right after connecting
    Hello(Value),
    /// Anything that did not parse
    Unknown(String),
}

/// Split a raw socket message into its frames
pub fn decode_frames(raw: &str) -> Vec<Packet> {
    FRAME_SEPARATOR
        .split(raw)
        .filter(|payload| !payload.is_empty())
        .map(decode_payload)
        .collect()
}

fn decode_payload(payload: &str) -> Packet {
    if payload.starts_with(HEARTBEAT_PREFIX) {
        return Packet::Heartbeat(payload.to_string());
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) if value.get("m").is_some() => match serde_json::from_value(value) {
            Ok(message) => Packet::Message(message),
            Err(_) => Packet::Unknown(payload.to_string()),
        },
        Ok(value) => Packet::Hello(value),
        Err(_) => Packet::Unknown(payload.to_string()),
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Message sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientMessage {
    pub m: String,
    pub p: Vec<Value>,
}

impl ClientMessage {
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self {
            m: method.to_string(),
            p: params,
        }
    }

    pub fn set_auth_token(token: &str) -> Self {
        Self::new("set_auth_token", vec![json!(token)])
    }

    pub fn chart_create_session(chart_session: &str) -> Self {
        Self::new("chart_create_session", vec![json!(chart_session), json!("")])
    }

    pub fn chart_delete_session(chart_session: &str) -> Self {
        Self::new("chart_delete_session", vec![json!(chart_session)])
    }

    pub fn resolve_symbol(chart_session: &str, symbol: &str) -> Self {
        let descriptor = json!({ "symbol": symbol, "adjustment": "splits" });
        Self::new(
            "resolve_symbol",
            vec![
                json!(chart_session),
                json!(SYMBOL_ALIAS),
                json!(format!("={}", descriptor)),
            ],
        )
    }

    pub fn create_series(chart_session: &str, timeframe: &str, amount: u32) -> Self {
        Self::new(
            "create_series",
            vec![
                json!(chart_session),
                json!(SERIES_ID),
                json!("s1"),
                json!(SYMBOL_ALIAS),
                json!(timeframe),
                json!(amount),
                json!(""),
            ],
        )
    }

    /// Serialize and frame the message
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        Ok(encode_frame(&serde_json::to_string(self)?))
    }
}

/// Named message sent from server to client
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerMessage {
    pub m: String,
    #[serde(default)]
    pub p: Vec<Value>,
}

impl From<ServerMessage> for RealtimeEvent {
    fn from(msg: ServerMessage) -> Self {
        RealtimeEvent::new(msg.m, msg.p)
    }
}

/// Generate a fresh chart session id (`cs_` + 12 random lowercase alphanumerics)
pub fn chart_session_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("cs_{}", suffix)
}

// ============================================================================
// Series payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct SeriesPoint {
    v: Vec<Value>,
}

/// Extract the candles carried by a `timescale_update` (or `du`) event for our
/// series. Points with fewer than five values are skipped; a missing volume
/// is treated as zero.
pub fn series_candles(params: &[Value], series_id: &str) -> Vec<Candle> {
    let points = params
        .get(1)
        .and_then(|body| body.get(series_id))
        .and_then(|series| series.get("s"))
        .cloned()
        .and_then(|s| serde_json::from_value::<Vec<SeriesPoint>>(s).ok())
        .unwrap_or_default();

    points
        .iter()
        .filter_map(|point| {
            let num = |i: usize| point.v.get(i).and_then(Value::as_f64);
            Some(Candle {
                timestamp: num(0)? as i64,
                open: num(1)?,
                high: num(2)?,
                low: num(3)?,
                close: num(4)?,
                volume: num(5).unwrap_or(0.0),
            })
        })
        .collect()
}

/// Human-readable reason from an error event's params (everything after the
/// session id and series ids that is a string)
pub fn error_reason(params: &[Value]) -> String {
    let reason = params
        .iter()
        .skip(1)
        .filter_map(Value::as_str)
        .filter(|s| !s.starts_with("sds_") && *s != "s1")
        .collect::<Vec<_>>()
        .join(": ");

    if reason.is_empty() {
        "unknown error".to_string()
    } else {
        reason
    }
}
