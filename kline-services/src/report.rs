//! Plain-text rendering of batch results and performance

use std::fmt::Write;

use kline_core::Candle;

use crate::batch::BatchReport;
use crate::normalize::timeframe_text;
use crate::outcome::OutcomeStatus;
use crate::performance::PerformanceSummary;

const PREVIEW_CANDLES: usize = 3;
const ERROR_DETAILS: usize = 5;

/// Human-readable byte size (B, KB, MB with one decimal)
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Integer volume with thousands separators
fn format_volume(volume: f64) -> String {
    let digits = format!("{:.0}", volume.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if volume < 0.0 {
        grouped.insert(0, '-');
    }
    grouped
}

fn candle_line(candle: &Candle) -> String {
    let date = candle
        .datetime()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| candle.timestamp.to_string());
    format!(
        "{}: O:{:.3} H:{:.3} L:{:.3} C:{:.3} V:{}",
        date,
        candle.open,
        candle.high,
        candle.low,
        candle.close,
        format_volume(candle.volume)
    )
}

/// Render the results of a batch, grouped by symbol
pub fn render_results(report: &BatchReport) -> String {
    let mut out = String::new();
    let query = &report.query;

    let _ = writeln!(
        out,
        "{} symbols × {} timeframes = {} total requests | {} successful | {} failed | Endpoint: {}",
        query.symbols.len(),
        query.timeframes.len(),
        query.total_requests(),
        report.summary.successful,
        report.summary.failed,
        query.endpoint
    );

    for (symbol, outcomes) in report.by_symbol() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", symbol);

        for outcome in outcomes {
            let text = timeframe_text(&outcome.timeframe);
            match &outcome.status {
                OutcomeStatus::Success { candles, .. } => {
                    let _ = writeln!(out, "  {} - {} candles", text, candles.len());
                    if let Some(summary) = outcome.summary() {
                        let _ = writeln!(
                            out,
                            "    Last: {:.5} | Change: {}{:.2}% | High: {:.5} | Low: {:.5} | Volume: {}",
                            summary.last,
                            if summary.is_positive() { "+" } else { "" },
                            summary.change_pct,
                            summary.high,
                            summary.low,
                            format_volume(summary.volume)
                        );
                    }
                    for candle in candles.iter().take(PREVIEW_CANDLES) {
                        let _ = writeln!(out, "    {}", candle_line(candle));
                    }
                    if candles.len() > PREVIEW_CANDLES {
                        let _ = writeln!(out, "    ... {} more candles", candles.len() - PREVIEW_CANDLES);
                    }
                }
                OutcomeStatus::NoData | OutcomeStatus::Failed { .. } => {
                    let _ = writeln!(out, "  {} - Failed", text);
                    let _ = writeln!(out, "    Error: {}", outcome.error_message().unwrap_or_default());
                }
            }
        }
    }

    out
}

/// Render the performance breakdown of a batch
pub fn render_performance(summary: &PerformanceSummary) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Performance Overview");
    let _ = writeln!(out, "  Total Time:        {:.0}ms", summary.elapsed_ms);
    let _ = writeln!(out, "  Success Rate:      {:.1}%", summary.success_rate);
    let _ = writeln!(out, "  Requests/sec:      {:.2}", summary.requests_per_sec);
    let _ = writeln!(out, "  Candles/sec:       {:.2}", summary.candles_per_sec);
    let _ = writeln!(out, "  Data Received:     {}", format_bytes(summary.total_bytes));
    let _ = writeln!(out, "  Avg Response:      {:.0}ms", summary.latency.average_ms);

    let _ = writeln!(out);
    let _ = writeln!(out, "Timing Statistics");
    let _ = writeln!(out, "  Fastest:           {:.0}ms", summary.latency.min_ms);
    let _ = writeln!(out, "  Slowest:           {:.0}ms", summary.latency.max_ms);
    let _ = writeln!(out, "  Average:           {:.0}ms", summary.latency.average_ms);
    let _ = writeln!(out, "  Total Requests:    {}", summary.total_requests);

    let _ = writeln!(out);
    let _ = writeln!(out, "Symbol Performance");
    for (symbol, bucket) in &summary.per_symbol {
        let _ = writeln!(
            out,
            "  {:<24} {}/{} ok | {:.0}ms avg | {} candles",
            symbol,
            bucket.stats.successful,
            bucket.stats.requests,
            bucket.average_time_ms,
            bucket.stats.total_candles
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Timeframe Performance");
    for (timeframe, bucket) in &summary.per_timeframe {
        let _ = writeln!(
            out,
            "  {:<24} {}/{} ok | {:.0}ms avg | {} candles",
            timeframe_text(timeframe),
            bucket.stats.successful,
            bucket.stats.requests,
            bucket.average_time_ms,
            bucket.stats.total_candles
        );
    }

    if !summary.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Error Details");
        for entry in summary.errors.iter().take(ERROR_DETAILS) {
            let _ = writeln!(
                out,
                "  {} {}: {} ({:.0}ms)",
                entry.symbol, entry.timeframe, entry.message, entry.latency_ms
            );
        }
        if summary.errors.len() > ERROR_DETAILS {
            let _ = writeln!(out, "  ... {} more errors", summary.errors.len() - ERROR_DETAILS);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::KlineQuery;
    use crate::normalize::TimeframeRequest;
    use crate::outcome::RequestOutcome;
    use crate::performance::PerformanceTracker;
    use kline_core::{Endpoint, KlineError};
    use std::time::Duration;

    #[test]
    fn test_format_bytes_boundaries() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_format_volume() {
        assert_eq!(format_volume(0.0), "0");
        assert_eq!(format_volume(999.0), "999");
        assert_eq!(format_volume(1234567.4), "1,234,567");
    }

    fn report() -> BatchReport {
        let candles: Vec<Candle> = (0..5)
            .map(|i| Candle {
                timestamp: 1_704_067_200 + i * 86_400,
                open: 100.0,
                high: 110.0,
                low: 90.0,
                close: 100.0 + i as f64,
                volume: 1500.0,
            })
            .collect();

        let outcomes = vec![
            RequestOutcome::from_response("NASDAQ:AAPL", "1D", 5, 12.0, Ok(vec![candles])),
            RequestOutcome::from_response(
                "NASDAQ:AAPL",
                "1h",
                5,
                8.0,
                Err(KlineError::data("Series error: no permission")),
            ),
        ];

        let mut tracker = PerformanceTracker::new(&["NASDAQ:AAPL"], &["1D", "1h"]);
        for outcome in &outcomes {
            tracker.record(outcome);
        }

        BatchReport {
            query: KlineQuery::new(
                vec!["NASDAQ:AAPL".into()],
                vec![TimeframeRequest::new("1D", 5), TimeframeRequest::new("1h", 5)],
                Endpoint::Data,
            ),
            outcomes,
            summary: tracker.finalize_with_elapsed(Duration::from_millis(20)),
        }
    }

    #[test]
    fn test_render_results() {
        let text = render_results(&report());
        assert!(text.starts_with(
            "1 symbols × 2 timeframes = 2 total requests | 1 successful | 1 failed | Endpoint: data"
        ));
        assert!(text.contains("  1 Day - 5 candles"));
        assert!(text.contains("Change: +4.00%"));
        assert!(text.contains("2024-01-01: O:100.000 H:110.000 L:90.000 C:100.000 V:1,500"));
        assert!(text.contains("... 2 more candles"));
        assert!(text.contains("  1 Hour - Failed"));
        assert!(text.contains("Error: Data error: Series error: no permission"));
    }

    #[test]
    fn test_render_performance() {
        let text = render_performance(&report().summary);
        assert!(text.contains("Success Rate:      50.0%"));
        assert!(text.contains("Fastest:           8ms"));
        assert!(text.contains("Slowest:           12ms"));
        assert!(text.contains("Error Details"));
        assert!(text.contains("  NASDAQ:AAPL 1h: Data error: Series error: no permission (8ms)"));
        assert!(!text.contains("more errors"));
    }
}
