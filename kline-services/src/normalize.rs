//! Timeframe and symbol normalization
//!
//! Maps user-facing timeframe labels to the client's format, parses free-text
//! symbol lists, and produces advisory warnings for combinations that often
//! come back empty.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use kline_core::Endpoint;

/// Amount used when a label has no known default
pub const FALLBACK_AMOUNT: u32 = 100;

/// A supported timeframe label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeframeSpec {
    /// Label as typed by the user ("1h", "1D")
    pub label: &'static str,
    /// Value the client expects ("60", "1D")
    pub api: &'static str,
    /// Readable text ("1 Hour")
    pub text: &'static str,
    /// Candles requested when no amount is given
    pub default_amount: u32,
}

const fn spec(label: &'static str, api: &'static str, text: &'static str, default_amount: u32) -> TimeframeSpec {
    TimeframeSpec {
        label,
        api,
        text,
        default_amount,
    }
}

/// Labels are case-sensitive: "1m" is one minute, "1M" one month
pub const TIMEFRAMES: &[TimeframeSpec] = &[
    spec("1m", "1", "1 Minute", 1000),
    spec("3m", "3", "3 Minutes", 1000),
    spec("5m", "5", "5 Minutes", 1000),
    spec("15m", "15", "15 Minutes", 1000),
    spec("30m", "30", "30 Minutes", 1000),
    spec("45m", "45", "45 Minutes", 1000),
    spec("1h", "60", "1 Hour", 200),
    spec("2h", "120", "2 Hours", 200),
    spec("3h", "180", "3 Hours", 200),
    spec("4h", "240", "4 Hours", 200),
    spec("1D", "1D", "1 Day", 30),
    spec("1W", "1W", "1 Week", 30),
    spec("1M", "1M", "1 Month", 30),
];

/// Intraday labels that free endpoints often refuse for crypto
const INTRADAY_LABELS: &[&str] = &["1m", "3m", "5m", "15m", "30m", "45m"];

fn lookup(label: &str) -> Option<&'static TimeframeSpec> {
    TIMEFRAMES.iter().find(|s| s.label == label)
}

/// Convert a label to the client's timeframe format; unknown labels pass through
pub fn to_api_timeframe(label: &str) -> &str {
    lookup(label).map(|s| s.api).unwrap_or(label)
}

/// Readable text for a label; unknown labels pass through
pub fn timeframe_text(label: &str) -> &str {
    lookup(label).map(|s| s.text).unwrap_or(label)
}

pub fn default_amount(label: &str) -> u32 {
    lookup(label)
        .map(|s| s.default_amount)
        .unwrap_or(FALLBACK_AMOUNT)
}

/// A selected timeframe with its candle amount
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeframeRequest {
    pub label: String,
    pub amount: u32,
}

impl TimeframeRequest {
    pub fn new(label: impl Into<String>, amount: u32) -> Self {
        Self {
            label: label.into(),
            amount,
        }
    }

    /// Request with the label's default amount
    pub fn with_default_amount(label: impl Into<String>) -> Self {
        let label = label.into();
        let amount = default_amount(&label);
        Self { label, amount }
    }

    pub fn api_timeframe(&self) -> &str {
        to_api_timeframe(&self.label)
    }
}

impl std::fmt::Display for TimeframeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} candles)", self.label, self.amount)
    }
}

impl std::str::FromStr for TimeframeRequest {
    type Err = String;

    /// Parses `"1h"` or `"1h:200"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, amount) = match s.split_once(':') {
            Some((label, amount)) => (label.trim(), Some(amount.trim())),
            None => (s.trim(), None),
        };

        if label.is_empty() {
            return Err(format!("Missing timeframe label in '{}'", s));
        }

        match amount {
            None => Ok(Self::with_default_amount(label)),
            Some(raw) => match raw.parse::<u32>() {
                Ok(amount) if amount > 0 => Ok(Self::new(label, amount)),
                _ => Err(format!("Invalid candle amount '{}' for {}", raw, label)),
            },
        }
    }
}

/// Parse newline-separated symbols: trimmed, blank lines dropped, duplicates
/// removed keeping the first occurrence
pub fn parse_symbols(text: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for line in text.split('\n') {
        let symbol = line.trim();
        if !symbol.is_empty() && !symbols.iter().any(|s| s == symbol) {
            symbols.push(symbol.to_string());
        }
    }
    symbols
}

/// Advisory warnings for a symbol/timeframe combination. Never blocks a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Advisory {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check a combination against known problem cases.
///
/// `local_now` is the user's wall-clock time; market-hours checks use it.
pub fn advise(symbol: &str, timeframe: &str, endpoint: Endpoint, local_now: NaiveDateTime) -> Advisory {
    let mut advisory = Advisory::default();

    let is_crypto = symbol.contains("BINANCE:") || symbol.contains("CRYPTO:");
    if is_crypto && INTRADAY_LABELS.contains(&timeframe) && endpoint == Endpoint::Data {
        advisory
            .issues
            .push("Crypto intraday data may not be available on free endpoint".to_string());
        advisory
            .suggestions
            .push("Try timeframe: 1h, 4h, or 1D".to_string());
        advisory
            .suggestions
            .push("Or try endpoint: prodata (requires premium)".to_string());
    }

    let is_stock = symbol.contains("NASDAQ:") || symbol.contains("NYSE:");
    if is_stock {
        let weekend = matches!(local_now.weekday(), Weekday::Sat | Weekday::Sun);
        let hour = local_now.hour();

        if weekend {
            advisory
                .issues
                .push("Stock markets are closed on weekends".to_string());
            advisory
                .suggestions
                .push("Try during market hours (Mon-Fri, 9:30 AM - 4:00 PM EST)".to_string());
        } else if hour < 10 || hour > 16 {
            advisory
                .issues
                .push("Stock markets may be closed (outside 9:30 AM - 4:00 PM EST)".to_string());
            advisory
                .suggestions
                .push("Try during market hours or use daily timeframe (1D)".to_string());
        }
    }

    advisory
}
