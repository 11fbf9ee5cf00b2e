//! WebSocket client for the KuCoin Futures real-time streams.
//!
//! This module implements the connection/session engine behind
//! [`KucoinFuturesWsClient`]: one authenticated, heartbeated socket
//! multiplexing many logical topic subscriptions, with automatic
//! reconnection and subscription replay.
//!
//! # Architecture
//!
//! - [`codec`] parses and serializes the JSON wire envelopes.
//! - [`registry`] tracks desired subscriptions independently of any
//!   physical connection, so they survive reconnects.
//! - The heartbeat monitor keeps one session alive and declares it dead
//!   when the exchange stays silent past the pong deadline.
//! - The event router classifies decoded frames, tracks per-symbol ticker
//!   sequences and fans events out to the typed handlers in
//!   [`StreamHandlers`].
//! - The session owns exactly one socket generation; the supervisor inside
//!   the client replaces failed sessions after the configured delay.
//!
//! # Usage
//!
//! ## Market data streams
//!
//! ```no_run
//! use kucoin_futures_connector_rs::types::{FuturesMarket, KucoinWebsocketConfig};
//! use kucoin_futures_connector_rs::websocket::{KucoinFuturesWsClient, StreamHandlers};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handlers = StreamHandlers::new()
//!         .on_welcome(|| println!("session established"))
//!         .on_symbol_ticker(|ticker| {
//!             println!("{} last={} seq={}", ticker.symbol, ticker.price, ticker.sequence);
//!         });
//!
//!     let client = KucoinFuturesWsClient::connect(
//!         KucoinWebsocketConfig::market_stream(FuturesMarket::Coinm),
//!         handlers,
//!     )
//!     .await
//!     .expect("Failed to connect");
//!
//!     client
//!         .subscribe_symbol_ticker(&["XBTUSDM"])
//!         .await
//!         .expect("Failed to subscribe");
//!
//!     // Keep alive until Ctrl+C
//!     tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
//!     client.close().await;
//! }
//! ```
//!
//! ## User data streams
//!
//! ```no_run
//! use kucoin_futures_connector_rs::types::{FuturesMarket, KucoinWebsocketConfig};
//! use kucoin_futures_connector_rs::websocket::{KucoinFuturesWsClient, StreamHandlers};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = KucoinWebsocketConfig::user_stream(
//!         FuturesMarket::Usdm,
//!         "your_api_key",
//!         "your_api_secret",
//!         "your_api_passphrase",
//!     );
//!     let handlers = StreamHandlers::new()
//!         .on_order_update(|order| println!("order {} -> {}", order.order_id, order.status))
//!         .on_position_change(|pos| println!("{} qty={}", pos.symbol, pos.current_qty));
//!
//!     let client = KucoinFuturesWsClient::connect(config, handlers)
//!         .await
//!         .expect("Failed to connect");
//!     client.subscribe_trade_orders().await.expect("Failed to subscribe");
//!     client.subscribe_positions("XBTUSDTM").await.expect("Failed to subscribe");
//!
//!     tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
//!     client.close().await;
//! }
//! ```
//!
//! # Reconnection behavior
//!
//! - A fresh endpoint (and token) is resolved for every attempt.
//! - The delay between attempts is the flat `reconnect_period`; retries are
//!   unbounded unless `max_reconnect_attempts` is configured.
//! - All active subscriptions are replayed into each new session in
//!   insertion order; subscribe/unsubscribe calls made while reconnecting
//!   take effect on the next replay.
//! - A reconnect is a hard ordering boundary: ticker sequence baselines are
//!   reset, so the first message of a new session never reports a gap.
//!
//! # Diagnostics
//!
//! Sequence gaps, dropped frames, missing subscribe receipts and server
//! error envelopes are reported through the `on_diagnostic` handler
//! alongside normal event flow; none of them interrupt delivery.

pub mod codec;
pub mod registry;
pub mod router;

mod client;
mod heartbeat;
mod session;

// Re-export the client surface for easier access
pub use client::{EndpointResolver, KucoinFuturesWsClient};
pub use registry::Subscription;
pub use router::StreamHandlers;
