//! Batch candle fetching
//!
//! Runs every (symbol, timeframe) pair of a query against an open connection,
//! one request at a time, and collects outcomes and performance figures.

use std::time::Instant;

use chrono::{Local, NaiveDateTime};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{error, info, warn};

use kline_core::{CandleRequest, Connection, Endpoint, KlineError, KlineResult};

use crate::normalize::{advise, timeframe_text, to_api_timeframe, TimeframeRequest};
use crate::outcome::{OutcomeStatus, RequestOutcome};
use crate::performance::{PerformanceSummary, PerformanceTracker};

/// What to fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KlineQuery {
    pub symbols: Vec<String>,
    pub timeframes: Vec<TimeframeRequest>,
    pub endpoint: Endpoint,
}

impl KlineQuery {
    pub fn new(symbols: Vec<String>, timeframes: Vec<TimeframeRequest>, endpoint: Endpoint) -> Self {
        Self {
            symbols,
            timeframes,
            endpoint,
        }
    }

    pub fn validate(&self) -> KlineResult<()> {
        if self.symbols.is_empty() {
            return Err(KlineError::invalid_input("Please enter at least one symbol"));
        }
        if self.timeframes.is_empty() {
            return Err(KlineError::invalid_input("Please select at least one timeframe"));
        }
        Ok(())
    }

    pub fn total_requests(&self) -> usize {
        self.symbols.len() * self.timeframes.len()
    }

    fn timeframe_labels(&self) -> Vec<&str> {
        self.timeframes.iter().map(|t| t.label.as_str()).collect()
    }
}

/// Everything a finished batch produced
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub query: KlineQuery,
    pub outcomes: Vec<RequestOutcome>,
    pub summary: PerformanceSummary,
}

impl BatchReport {
    /// Outcomes grouped by symbol, in first-seen order
    pub fn by_symbol(&self) -> IndexMap<&str, Vec<&RequestOutcome>> {
        let mut grouped: IndexMap<&str, Vec<&RequestOutcome>> = IndexMap::new();
        for outcome in &self.outcomes {
            grouped.entry(outcome.symbol.as_str()).or_default().push(outcome);
        }
        grouped
    }
}

type LocalClock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Sequential batch executor
pub struct BatchRunner {
    local_now: LocalClock,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner").finish_non_exhaustive()
    }
}

impl BatchRunner {
    pub fn new() -> Self {
        Self {
            local_now: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Use a fixed wall clock for advisories
    pub fn with_clock(clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        Self {
            local_now: Box::new(clock),
        }
    }

    /// Run the whole query. Fails only on validation; request failures are
    /// recorded in the report.
    pub async fn run(&self, connection: &dyn Connection, query: &KlineQuery) -> KlineResult<BatchReport> {
        query.validate()?;

        info!("=== Data Fetch Started ===");
        info!(symbols = %query.symbols.join(", "), "Symbols: {}", query.symbols.join(", "));
        info!(
            "Timeframes: {}",
            query
                .timeframes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        info!(endpoint = %query.endpoint, "Endpoint: {}", query.endpoint);
        info!("Total requests: {}", query.total_requests());

        let mut tracker = PerformanceTracker::new(query.symbols.as_slice(), query.timeframe_labels().as_slice());
        let mut outcomes = Vec::with_capacity(query.total_requests());

        for symbol in &query.symbols {
            for timeframe in &query.timeframes {
                let outcome = self.fetch_one(connection, symbol, timeframe, query.endpoint).await;
                tracker.record(&outcome);
                outcomes.push(outcome);
            }
        }

        let summary = tracker.finalize();
        info!("=== Data Fetch Completed ===");
        info!(
            successful = summary.successful,
            failed = summary.failed,
            "Successful: {}, Failed: {}",
            summary.successful,
            summary.failed
        );
        info!("Total execution time: {:.0}ms", summary.elapsed_ms);

        Ok(BatchReport {
            query: query.clone(),
            outcomes,
            summary,
        })
    }

    async fn fetch_one(
        &self,
        connection: &dyn Connection,
        symbol: &str,
        timeframe: &TimeframeRequest,
        endpoint: Endpoint,
    ) -> RequestOutcome {
        let advisory = advise(symbol, &timeframe.label, endpoint, (self.local_now)());
        if !advisory.is_empty() {
            warn!(symbol, timeframe = %timeframe.label, "Potential issues for {} {}:", symbol, timeframe.label);
            for issue in &advisory.issues {
                warn!("  - {}", issue);
            }
            for suggestion in &advisory.suggestions {
                info!("  Suggestion: {}", suggestion);
            }
        }

        let api_timeframe = to_api_timeframe(&timeframe.label);
        info!(
            symbol,
            timeframe = %timeframe.label,
            "Fetching {} {} ({}) - {} candles...",
            symbol,
            timeframe_text(&timeframe.label),
            api_timeframe,
            timeframe.amount
        );

        let request = CandleRequest {
            symbols: vec![symbol.to_string()],
            amount: timeframe.amount,
            timeframe: api_timeframe.to_string(),
        };

        let started = Instant::now();
        let response = connection.get_candles(request).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let outcome = RequestOutcome::from_response(symbol, &timeframe.label, timeframe.amount, latency_ms, response);
        log_outcome(&outcome);
        outcome
    }
}

fn log_outcome(outcome: &RequestOutcome) {
    let symbol = outcome.symbol.as_str();
    let timeframe = outcome.timeframe.as_str();
    let latency_ms = outcome.latency_ms;

    match &outcome.status {
        OutcomeStatus::Success { candles, .. } => {
            info!(
                symbol,
                timeframe,
                latency_ms,
                "{} {}: {} candles ({:.0}ms)",
                symbol,
                timeframe,
                candles.len(),
                latency_ms
            );
            if let Some(summary) = outcome.summary() {
                let line = format!(
                    "  Last: {:.5} | Change: {:.2}% | High: {:.5} | Low: {:.5}",
                    summary.last, summary.change_pct, summary.high, summary.low
                );
                if summary.is_positive() {
                    info!("{}", line);
                } else {
                    warn!("{}", line);
                }
            }
        }
        OutcomeStatus::NoData => {
            warn!(symbol, timeframe, latency_ms, "{} {}: No data received", symbol, timeframe);
        }
        OutcomeStatus::Failed { message } => {
            error!(
                symbol,
                timeframe,
                latency_ms,
                "{} {}: {} ({:.0}ms)",
                symbol,
                timeframe,
                message,
                latency_ms
            );
        }
    }
}
