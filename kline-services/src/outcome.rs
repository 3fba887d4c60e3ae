//! Result of a single (symbol, timeframe) request

use kline_core::{Candle, CandleSeries, KlineError, SeriesSummary};
use serde::Serialize;

/// Message recorded when a request succeeds but returns no candles
pub const NO_DATA_MESSAGE: &str = "No data received";

/// How a request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The client answered with an empty series
    NoData,
    /// The client raised an error
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success {
        candles: CandleSeries,
        /// Size of the JSON-serialized series
        bytes: u64,
    },
    NoData,
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOutcome {
    pub symbol: String,
    pub timeframe: String,
    pub amount: u32,
    /// Wall-clock time spent in the client call
    pub latency_ms: f64,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl RequestOutcome {
    /// Classify a client response for one symbol.
    ///
    /// The first returned series belongs to the symbol; an empty or missing
    /// series is `NoData`.
    pub fn from_response(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        amount: u32,
        latency_ms: f64,
        response: Result<Vec<CandleSeries>, KlineError>,
    ) -> Self {
        let status = match response {
            Ok(series) => match series.into_iter().next() {
                Some(candles) if !candles.is_empty() => {
                    let bytes = serde_json::to_vec(&candles)
                        .map(|b| b.len() as u64)
                        .unwrap_or_default();
                    OutcomeStatus::Success { candles, bytes }
                }
                _ => OutcomeStatus::NoData,
            },
            Err(e) => OutcomeStatus::Failed {
                message: e.to_string(),
            },
        };

        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            amount,
            latency_ms,
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    pub fn candles(&self) -> &[Candle] {
        match &self.status {
            OutcomeStatus::Success { candles, .. } => candles,
            _ => &[],
        }
    }

    pub fn candle_count(&self) -> usize {
        self.candles().len()
    }

    pub fn bytes(&self) -> u64 {
        match &self.status {
            OutcomeStatus::Success { bytes, .. } => *bytes,
            _ => 0,
        }
    }

    /// Error message for failed and empty requests
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Success { .. } => None,
            OutcomeStatus::NoData => Some(NO_DATA_MESSAGE),
            OutcomeStatus::Failed { message } => Some(message),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            OutcomeStatus::Success { .. } => None,
            OutcomeStatus::NoData => Some(FailureKind::NoData),
            OutcomeStatus::Failed { .. } => Some(FailureKind::Error),
        }
    }

    pub fn summary(&self) -> Option<SeriesSummary> {
        SeriesSummary::from_candles(self.candles())
    }
}
