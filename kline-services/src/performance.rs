//! Performance tracking for a batch of candle requests
//!
//! Counts outcomes globally and per symbol / per timeframe, keeps every
//! latency sample, and derives throughput figures once the batch settles.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;

use crate::outcome::{FailureKind, RequestOutcome};

/// Counters for one symbol or one timeframe
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketStats {
    pub requests: u32,
    pub successful: u32,
    pub failed: u32,
    pub total_candles: u64,
    pub total_time_ms: f64,
}

impl BucketStats {
    /// Mean latency over this bucket's requests (0 when empty)
    pub fn average_time_ms(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_time_ms / self.requests as f64
        }
    }

    fn record(&mut self, outcome: &RequestOutcome) {
        self.requests += 1;
        self.total_time_ms += outcome.latency_ms;
        if outcome.is_success() {
            self.successful += 1;
            self.total_candles += outcome.candle_count() as u64;
        } else {
            self.failed += 1;
        }
    }
}

/// A failed or empty request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub symbol: String,
    pub timeframe: String,
    pub message: String,
    pub kind: FailureKind,
    pub latency_ms: f64,
}

/// Mutable accumulator for one batch. Requests are recorded one at a time.
#[derive(Debug)]
pub struct PerformanceTracker {
    started: Instant,
    total_requests: usize,
    completed: usize,
    successful: usize,
    failed: usize,
    total_candles: u64,
    total_bytes: u64,
    latencies: Vec<f64>,
    per_symbol: IndexMap<String, BucketStats>,
    per_timeframe: IndexMap<String, BucketStats>,
    errors: Vec<ErrorEntry>,
}

impl PerformanceTracker {
    /// Start tracking `symbols.len() * timeframes.len()` requests
    pub fn new<S, T>(symbols: &[S], timeframes: &[T]) -> Self
    where
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let per_symbol = symbols
            .iter()
            .map(|s| (s.as_ref().to_string(), BucketStats::default()))
            .collect();
        let per_timeframe = timeframes
            .iter()
            .map(|t| (t.as_ref().to_string(), BucketStats::default()))
            .collect();

        Self {
            started: Instant::now(),
            total_requests: symbols.len() * timeframes.len(),
            completed: 0,
            successful: 0,
            failed: 0,
            total_candles: 0,
            total_bytes: 0,
            latencies: Vec::new(),
            per_symbol,
            per_timeframe,
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.completed += 1;
        self.latencies.push(outcome.latency_ms);

        self.per_symbol
            .entry(outcome.symbol.clone())
            .or_default()
            .record(outcome);
        self.per_timeframe
            .entry(outcome.timeframe.clone())
            .or_default()
            .record(outcome);

        match (outcome.failure_kind(), outcome.error_message()) {
            (Some(kind), Some(message)) => {
                self.failed += 1;
                self.errors.push(ErrorEntry {
                    symbol: outcome.symbol.clone(),
                    timeframe: outcome.timeframe.clone(),
                    message: message.to_string(),
                    kind,
                    latency_ms: outcome.latency_ms,
                });
            }
            _ => {
                self.successful += 1;
                self.total_candles += outcome.candle_count() as u64;
                self.total_bytes += outcome.bytes();
            }
        }
    }

    pub fn total_requests(&self) -> usize {
        self.total_requests
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn successful(&self) -> usize {
        self.successful
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn bucket_for_symbol(&self, symbol: &str) -> Option<&BucketStats> {
        self.per_symbol.get(symbol)
    }

    pub fn bucket_for_timeframe(&self, timeframe: &str) -> Option<&BucketStats> {
        self.per_timeframe.get(timeframe)
    }

    /// Close the batch using the time elapsed since [`PerformanceTracker::new`]
    pub fn finalize(self) -> PerformanceSummary {
        let elapsed = self.started.elapsed();
        self.finalize_with_elapsed(elapsed)
    }

    pub fn finalize_with_elapsed(self, elapsed: Duration) -> PerformanceSummary {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let per_sec = |count: f64| {
            if elapsed_ms > 0.0 {
                count / (elapsed_ms / 1000.0)
            } else {
                0.0
            }
        };

        let success_rate = if self.total_requests > 0 {
            self.successful as f64 / self.total_requests as f64 * 100.0
        } else {
            0.0
        };

        PerformanceSummary {
            total_requests: self.total_requests,
            completed: self.completed,
            successful: self.successful,
            failed: self.failed,
            total_candles: self.total_candles,
            total_bytes: self.total_bytes,
            elapsed_ms,
            requests_per_sec: per_sec(self.completed as f64),
            candles_per_sec: per_sec(self.total_candles as f64),
            bytes_per_sec: per_sec(self.total_bytes as f64),
            success_rate,
            latency: LatencyStats::from_samples(&self.latencies),
            per_symbol: summarize_buckets(self.per_symbol),
            per_timeframe: summarize_buckets(self.per_timeframe),
            errors: self.errors,
        }
    }
}

fn summarize_buckets(buckets: IndexMap<String, BucketStats>) -> IndexMap<String, BucketSummary> {
    buckets
        .into_iter()
        .map(|(key, stats)| {
            let average_time_ms = stats.average_time_ms();
            (
                key,
                BucketSummary {
                    stats,
                    average_time_ms,
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    #[serde(flatten)]
    pub stats: BucketStats,
    pub average_time_ms: f64,
}

/// Latency figures over all samples (all zero when there are none)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl LatencyStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let total: f64 = samples.iter().sum();
        Self {
            samples: samples.len(),
            average_ms: total / samples.len() as f64,
            min_ms: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Immutable figures for a finished batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_requests: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_candles: u64,
    pub total_bytes: u64,
    pub elapsed_ms: f64,
    pub requests_per_sec: f64,
    pub candles_per_sec: f64,
    pub bytes_per_sec: f64,
    /// Percentage of successful requests
    pub success_rate: f64,
    pub latency: LatencyStats,
    pub per_symbol: IndexMap<String, BucketSummary>,
    pub per_timeframe: IndexMap<String, BucketSummary>,
    pub errors: Vec<ErrorEntry>,
}
