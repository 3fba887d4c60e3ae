//! Core types for the K-line Terminal
//!
//! This crate defines the shared data structures used across the terminal,
//! including candles, endpoints, realtime events, and the market-data client
//! abstraction that concrete clients implement.

pub mod candle;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod level;

pub use candle::{Candle, CandleSeries, SeriesSummary};
pub use client::{CandleRequest, ConnectOptions, Connection, MarketDataClient};
pub use endpoint::Endpoint;
pub use error::{KlineError, KlineResult};
pub use event::{EventSubscription, RealtimeEvent};
pub use level::LogLevel;
