//! Service layer for the K-line Terminal
//!
//! Turns a list of symbols and timeframes into sequential candle requests
//! against a market-data connection, tracks how each request performed, and
//! renders the results.

pub mod batch;
pub mod normalize;
pub mod outcome;
pub mod performance;
pub mod provider;
pub mod replay;
pub mod report;
pub mod session;

pub use batch::{BatchReport, BatchRunner, KlineQuery};
pub use normalize::{
    advise, default_amount, parse_symbols, timeframe_text, to_api_timeframe, Advisory,
    TimeframeRequest, TimeframeSpec, TIMEFRAMES,
};
pub use outcome::{FailureKind, OutcomeStatus, RequestOutcome, NO_DATA_MESSAGE};
pub use performance::{
    BucketStats, BucketSummary, ErrorEntry, LatencyStats, PerformanceSummary, PerformanceTracker,
};
pub use provider::{resolve_client, ClientModule, ClientSource};
pub use replay::{fixture_file_name, ReplayClient, ReplayConnection, ReplayEntry};
pub use report::{format_bytes, render_performance, render_results};
pub use session::{realtime_event_level, ClientSession};
