//! TradingView integration for the K-line Terminal
//!
//! This crate provides a [`kline_core::MarketDataClient`] backed by the
//! TradingView chart socket. Public data needs no credentials; pass a
//! session id in [`kline_core::ConnectOptions`] for premium endpoints.

pub mod auth;
pub mod client;
pub mod error;
pub mod protocol;
pub mod websocket;

pub use client::TradingViewClient;
pub use error::TradingViewError;
pub use websocket::TradingViewConnection;
