use crate::error::{KucoinError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

// --- Enums ---

/// Contract family served by the futures API.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FuturesMarket {
    /// USDT-margined contracts (e.g. XBTUSDTM).
    Usdm,
    /// Coin-margined contracts (e.g. XBTUSDM).
    Coinm,
}

/// Which of the two stream families a client instance serves.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Private, authenticated user data (positions, balances, orders).
    User,
    /// Public market data (symbol tickers).
    Market,
}

/// Overall client connection state as observed by the caller.
///
/// Transitions are totally ordered per client lifetime:
/// `Initial -> Connecting -> Connected -> {Reconnecting | Closing} -> Closed`,
/// where `Reconnecting` loops back to `Connected` through a fresh session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Initial,
    Connecting,
    Connected,
    Reconnecting,
    Closing,
    Closed,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

// --- Configuration ---

/// Configuration for a [`crate::websocket::KucoinFuturesWsClient`].
///
/// Heartbeat and reconnect settings are immutable for the life of a client
/// instance and are reused identically across reconnects.
#[derive(Debug, Clone)]
pub struct KucoinWebsocketConfig {
    /// Contract family variant.
    pub market: FuturesMarket,
    /// Whether the stream is a user or a market stream.
    pub stream_type: StreamKind,
    /// Public user api key. Required for user streams.
    pub api_key: Option<String>,
    /// Private user api secret. Required for user streams.
    pub api_secret: Option<String>,
    /// User api passphrase. Required for user streams.
    pub api_passphrase: Option<String>,
    /// Whether to resolve the sandbox endpoint instead of production.
    pub is_test: bool,
    /// Delay applied before each reconnect attempt.
    pub reconnect_period: Duration,
    /// Interval at which keep-alive pings are sent.
    pub ping_interval: Duration,
    /// How long after a ping the connection may stay silent before it is
    /// declared dead.
    pub pong_timeout: Duration,
    /// Maximum consecutive failed reconnect attempts. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// How long to wait for a subscribe receipt when `response: true` was
    /// requested.
    pub ack_timeout: Duration,
}

impl KucoinWebsocketConfig {
    /// Configuration for a public market-data stream.
    pub fn market_stream(market: FuturesMarket) -> Self {
        Self {
            market,
            stream_type: StreamKind::Market,
            api_key: None,
            api_secret: None,
            api_passphrase: None,
            is_test: false,
            reconnect_period: Duration::from_secs(5),
            ping_interval: Duration::from_secs(18),
            pong_timeout: Duration::from_secs(10),
            max_reconnect_attempts: None,
            ack_timeout: Duration::from_secs(5),
        }
    }

    /// Configuration for a private user-data stream.
    pub fn user_stream(
        market: FuturesMarket,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        api_passphrase: impl Into<String>,
    ) -> Self {
        Self {
            stream_type: StreamKind::User,
            api_key: Some(api_key.into()),
            api_secret: Some(api_secret.into()),
            api_passphrase: Some(api_passphrase.into()),
            ..Self::market_stream(market)
        }
    }

    /// Validates the configuration, returning the missing parameter on error.
    ///
    /// User streams require the full credential triple; a client must refuse
    /// to start without it rather than attempt a doomed handshake repeatedly.
    pub fn validate(&self) -> Result<()> {
        if self.stream_type == StreamKind::User {
            for (param, value) in [
                ("api_key", &self.api_key),
                ("api_secret", &self.api_secret),
                ("api_passphrase", &self.api_passphrase),
            ] {
                match value {
                    Some(v) if !v.is_empty() => {}
                    _ => {
                        return Err(KucoinError::ParameterRequiredError {
                            param: param.to_string(),
                        })
                    }
                }
            }
        }
        Ok(())
    }
}

// --- Deserialization helpers ---

/// The published schema marks a handful of fields with types inconsistent
/// with the wire data (numbers where strings are documented and vice versa).
/// These helpers accept either representation, treating the wire as the
/// source of truth.
pub(crate) mod de {
    use serde::{Deserialize, Deserializer};

    pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Num(serde_json::Number),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Num(n) => n.to_string(),
        })
    }

    pub fn f64_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(f64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(n),
            Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}

// --- Market stream events ---

/// Real-time symbol ticker pushed on `/contractMarket/ticker:<symbol>`.
///
/// `sequence` is a per-symbol monotonic counter used to judge the
/// continuity of pushed messages.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymbolTickerEvent {
    pub symbol: String,
    pub sequence: u64,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub trade_id: String,
    pub best_bid_size: f64,
    pub best_bid_price: f64,
    pub best_ask_price: f64,
    pub best_ask_size: f64,
    /// Filled time, nanoseconds.
    pub ts: u64,
}

// --- User stream events ---

/// Order lifecycle update pushed on `/contractMarket/tradeOrders`.
///
/// Size and price fields are transmitted as decimal strings and are kept
/// as strings; downstream consumers own the numeric interpretation.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdateEvent {
    pub order_id: String,
    pub symbol: String,
    /// Message type: "open", "match", "filled", "canceled", "update".
    #[serde(rename = "type")]
    pub update_type: String,
    /// Order status: "match", "open", "done".
    pub status: String,
    /// Match size, present when `update_type` is "match".
    #[serde(default)]
    pub match_size: String,
    /// Match price, present when `update_type` is "match".
    #[serde(default)]
    pub match_price: String,
    pub order_type: String,
    pub side: OrderSide,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub remain_size: String,
    #[serde(default)]
    pub filled_size: String,
    #[serde(default)]
    pub canceled_size: String,
    /// Trade id, present when `update_type` is "match".
    #[serde(default)]
    pub trade_id: String,
    #[serde(default)]
    pub client_oid: String,
    pub order_time: u64,
    /// Size before the update, present when `update_type` is "update".
    #[serde(default)]
    pub old_size: String,
    /// Taker liquidity side, "maker" or "taker".
    #[serde(default)]
    pub liquidity: String,
    pub ts: u64,
}

/// Order margin change on `/contractAccount/wallet`, subject `orderMargin.change`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderMarginChangeEvent {
    pub order_margin: f64,
    #[serde(deserialize_with = "de::string_or_number")]
    pub currency: String,
    pub timestamp: u64,
}

/// Available balance change on `/contractAccount/wallet`, subject
/// `availableBalance.change`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableBalanceChangeEvent {
    pub available_balance: f64,
    #[serde(deserialize_with = "de::f64_or_string")]
    pub hold_balance: f64,
    #[serde(deserialize_with = "de::string_or_number")]
    pub currency: String,
    pub timestamp: u64,
}

/// The two wallet subjects united under one emitter category.
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceUpdateEvent {
    OrderMargin(OrderMarginChangeEvent),
    AvailableBalance(AvailableBalanceChangeEvent),
}

/// Position change pushed on `/contract/position:<symbol>`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionChangeEvent {
    /// Accumulated realised profit and loss, decimal string on the wire.
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub realised_gross_pnl: String,
    #[serde(deserialize_with = "de::string_or_number")]
    pub symbol: String,
    pub cross_mode: bool,
    pub liquidation_price: f64,
    /// Manually added margin amount.
    pub pos_loss: f64,
    pub avg_entry_price: f64,
    pub unrealised_pnl: f64,
    pub mark_price: f64,
    pub pos_margin: f64,
    pub auto_deposit: bool,
    pub risk_limit: f64,
    pub unrealised_cost: f64,
    /// Bankruptcy cost.
    pub pos_comm: f64,
    /// Maintenance margin.
    pub pos_maint: f64,
    /// Position value.
    pub pos_cost: f64,
    /// Maintenance margin rate.
    pub maint_margin_req: f64,
    pub bankrupt_price: f64,
    pub realised_cost: f64,
    pub mark_value: f64,
    pub pos_init: f64,
    pub realised_pnl: f64,
    pub maint_margin: f64,
    pub real_leverage: f64,
    /// One of marginChange, positionChange, liquidation,
    /// autoAppendMarginStatusChange, adl.
    pub change_reason: String,
    pub current_cost: f64,
    pub opening_timestamp: u64,
    pub current_qty: f64,
    /// ADL ranking percentile.
    pub delev_percentage: f64,
    pub current_comm: f64,
    pub realised_gross_cost: f64,
    pub is_open: bool,
    /// Manually added margin.
    pub pos_cross: f64,
    pub current_timestamp: u64,
    /// Rate of return on investment.
    pub unrealised_roe_pcnt: f64,
    /// Position profit and loss ratio.
    pub unrealised_pnl_pcnt: f64,
    #[serde(deserialize_with = "de::string_or_number")]
    pub settle_currency: String,
}

// --- Diagnostics ---

/// Side-channel anomalies reported alongside normal event flow.
///
/// None of these block delivery or tear down the connection; consumers
/// decide whether to resync.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDiagnostic {
    /// A ticker sequence was not exactly `last + 1`. The event carrying
    /// `got` is still forwarded and becomes the new baseline.
    SequenceGap {
        topic: String,
        symbol: String,
        expected: u64,
        got: u64,
    },
    /// A single inbound frame failed to decode and was dropped.
    DecodeError { detail: String, raw: String },
    /// A subscribe receipt requested with `response: true` did not arrive
    /// within the configured bound. The subscription remains registered
    /// and is retried on the next replay.
    SubscriptionAckTimeout { id: u64, topic: String },
    /// The server pushed an error envelope.
    ProtocolError { code: i64, message: String },
}

/// Raw passthrough frame for unknown `topic`/`subject` combinations.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessageEvent {
    pub topic: String,
    pub subject: String,
    pub payload: Value,
}
