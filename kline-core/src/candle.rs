//! Candle (K-line) data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Start time of the candle (unix seconds)
    pub timestamp: i64,
    /// Opening price
    pub open: f64,
    /// Highest price during the period
    pub high: f64,
    /// Lowest price during the period
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Trading volume during the period
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    /// Start time as a UTC datetime
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Ordered candles for one symbol, oldest first
pub type CandleSeries = Vec<Candle>;

/// Summary statistics over a candle series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    /// Close of the first candle
    pub first: f64,
    /// Close of the last candle
    pub last: f64,
    /// Percentage change from first to last close
    pub change_pct: f64,
    /// Highest high
    pub high: f64,
    /// Lowest low
    pub low: f64,
    /// Sum of volumes
    pub volume: f64,
}

impl SeriesSummary {
    /// Summarize a series. Returns `None` for an empty series.
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let first = candles.first()?.close;
        let last = candles.last()?.close;

        let change_pct = if first != 0.0 {
            (last - first) / first * 100.0
        } else {
            0.0
        };

        let high = candles
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let volume = candles.iter().map(|c| c.volume).sum();

        Some(Self {
            first,
            last,
            change_pct,
            high,
            low,
            volume,
        })
    }

    pub fn is_positive(&self) -> bool {
        self.change_pct >= 0.0
    }
}
