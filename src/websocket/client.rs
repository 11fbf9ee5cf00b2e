use crate::error::{KucoinError, Result};
use crate::rest::BulletClient;
use crate::types::{ConnectionState, KucoinWebsocketConfig, StreamKind};
use crate::websocket::codec;
use crate::websocket::registry::{SharedRegistry, Subscription, SubscriptionRegistry};
use crate::websocket::router::{AckTable, EventRouter, SharedAcks, StreamHandlers};
use crate::websocket::session::{self, CloseReason, SessionConfig, SessionContext, SharedSender};
use futures_util::future::BoxFuture;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const TICKER_TOPIC_PREFIX: &str = "/contractMarket/ticker:";
const TRADE_ORDERS_TOPIC: &str = "/contractMarket/tradeOrders";
const WALLET_TOPIC: &str = "/contractAccount/wallet";
const POSITION_TOPIC_PREFIX: &str = "/contract/position:";

/// Resolves a connectable websocket URL (token included) for one connect
/// attempt. Called once per attempt so a stale token never outlives a
/// session generation.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self) -> BoxFuture<'_, Result<Url>>;
}

/// A resilient streaming client for the futures websocket feed.
///
/// The client owns a supervisor task that creates one session per
/// connection generation, replays the subscription registry into every new
/// session, and applies the configured flat delay between reconnect
/// attempts. Transient network failures surface only as a brief
/// `Reconnecting` state; typed events keep flowing once the next session is
/// established.
#[derive(Debug)]
pub struct KucoinFuturesWsClient {
    stream_type: StreamKind,
    // Shared sender to allow sending messages while the supervisor runs/reconnects
    shared_tx: SharedSender,
    // Desired-subscription state, replayed into every new session
    registry: SharedRegistry,
    acks: SharedAcks,
    ack_timeout: Duration,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    // Handle to the supervisor task; taken by the first close() call
    manager_handle: Mutex<Option<JoinHandle<()>>>,
}

impl KucoinFuturesWsClient {
    /// Connects using the production endpoint resolver (the REST "bullet"
    /// handshake selected by `config.is_test`).
    ///
    /// Fails synchronously on configuration errors: a user stream without
    /// the full credential triple refuses to start.
    pub async fn connect(
        config: KucoinWebsocketConfig,
        handlers: StreamHandlers,
    ) -> Result<Self> {
        config.validate()?;
        let resolver = BulletClient::from_config(&config)?;
        Self::connect_with_resolver(config, handlers, resolver).await
    }

    /// Connects with a caller-provided endpoint resolver.
    ///
    /// The resolver is consulted once per connect attempt; tests and
    /// embedded deployments can point the client at an arbitrary server.
    pub async fn connect_with_resolver(
        config: KucoinWebsocketConfig,
        handlers: StreamHandlers,
        resolver: Arc<dyn EndpointResolver>,
    ) -> Result<Self> {
        config.validate()?;

        let shared_tx: SharedSender = Arc::new(Mutex::new(None));
        let registry: SharedRegistry = Arc::new(Mutex::new(SubscriptionRegistry::new()));
        let acks: SharedAcks = Arc::new(std::sync::Mutex::new(AckTable::default()));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Initial);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let manager_handle = tokio::spawn(supervise(
            config.clone(),
            EventRouter::new(handlers, Arc::clone(&acks)),
            resolver,
            SessionContext {
                registry: Arc::clone(&registry),
                acks: Arc::clone(&acks),
                shared_tx: Arc::clone(&shared_tx),
                shutdown: shutdown_rx,
            },
            state_tx,
        ));

        Ok(Self {
            stream_type: config.stream_type,
            shared_tx,
            registry,
            acks,
            ack_timeout: config.ack_timeout,
            state_rx,
            shutdown_tx,
            manager_handle: Mutex::new(Some(manager_handle)),
        })
    }

    /// The current overall connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A watch receiver over connection state transitions.
    pub fn state_stream(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    // --- Subscription Methods ---

    /// Subscribes to the real-time ticker of one or more symbols.
    ///
    /// Multiple symbols are joined into a single divisional topic with the
    /// `,` delimiter and tracked as one subscription.
    pub async fn subscribe_symbol_ticker(&self, symbols: &[&str]) -> Result<Subscription> {
        self.require_stream(StreamKind::Market)?;
        if symbols.is_empty() {
            return Err(KucoinError::ParameterRequiredError {
                param: "symbols".to_string(),
            });
        }
        let topic = format!("{}{}", TICKER_TOPIC_PREFIX, symbols.join(","));
        self.subscribe_topic(topic, false, false).await
    }

    /// Subscribes to order lifecycle updates for the authenticated user.
    pub async fn subscribe_trade_orders(&self) -> Result<Subscription> {
        self.subscribe_topic(TRADE_ORDERS_TOPIC, true, false).await
    }

    /// Subscribes to wallet balance events for the authenticated user.
    pub async fn subscribe_balance(&self) -> Result<Subscription> {
        self.subscribe_topic(WALLET_TOPIC, true, false).await
    }

    /// Subscribes to position changes of one symbol for the authenticated user.
    pub async fn subscribe_positions(&self, symbol: &str) -> Result<Subscription> {
        let topic = format!("{}{}", POSITION_TOPIC_PREFIX, symbol);
        self.subscribe_topic(topic, true, false).await
    }

    /// Registers a subscription for an arbitrary topic and sends it when a
    /// session is live.
    ///
    /// The subscription is durable either way: when no session is active
    /// this returns [`KucoinError::NotConnected`], but the topic stays in
    /// the registry and is replayed into the next session.
    pub async fn subscribe_topic(
        &self,
        topic: impl Into<String>,
        is_private: bool,
        wants_ack: bool,
    ) -> Result<Subscription> {
        if is_private {
            self.require_stream(StreamKind::User)?;
        }
        let sub = self
            .registry
            .lock()
            .await
            .add(topic, is_private, wants_ack);
        self.send_subscribe(&sub).await?;
        Ok(sub)
    }

    /// Removes a subscription by id.
    ///
    /// Removal from the registry is durable even while disconnected (the
    /// topic will not be replayed); [`KucoinError::NotConnected`] only
    /// means no unsubscribe envelope could be sent now.
    pub async fn unsubscribe(&self, id: u64) -> Result<()> {
        let removed = self.registry.lock().await.remove(id);
        let Some(sub) = removed else {
            return Ok(());
        };
        let guard = self.shared_tx.lock().await;
        let tx = guard.as_ref().ok_or(KucoinError::NotConnected)?;
        tx.send(Message::Text(codec::unsubscribe_frame(
            sub.id,
            &sub.topic,
            sub.is_private,
        )))
        .await
        .map_err(|e| KucoinError::WebsocketError(format!("Failed to send message: {}", e)))
    }

    /// Shuts the client down.
    ///
    /// Cancels any in-flight connect attempt or reconnect delay, performs
    /// the close handshake when a session is live, and resolves once the
    /// supervisor has reached `Closed`. Idempotent: repeated calls have no
    /// additional effect.
    pub async fn close(&self) {
        info!("Stopping WebSocket client...");
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.manager_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    fn require_stream(&self, required: StreamKind) -> Result<()> {
        if self.stream_type == required {
            return Ok(());
        }
        let name = |kind| match kind {
            StreamKind::User => "user",
            StreamKind::Market => "market",
        };
        Err(KucoinError::ParameterValueError {
            param: "stream_type".to_string(),
            value: name(self.stream_type).to_string(),
            allowed: vec![name(required).to_string()],
        })
    }

    async fn send_subscribe(&self, sub: &Subscription) -> Result<()> {
        let guard = self.shared_tx.lock().await;
        let tx = guard.as_ref().ok_or(KucoinError::NotConnected)?;
        if sub.wants_ack {
            self.acks.lock().unwrap().expect(
                sub.id,
                sub.topic.clone(),
                Instant::now() + self.ack_timeout,
            );
        }
        tx.send(Message::Text(codec::subscribe_frame(sub)))
            .await
            .map_err(|e| KucoinError::WebsocketError(format!("Failed to send message: {}", e)))
    }
}

/// The reconnect supervisor: owns the session across its lifetime.
///
/// Holds at most one live session at a time; a failed session is replaced,
/// never reused. Resolution, connect and the reconnect delay are all
/// cancelled promptly by the shutdown signal.
async fn supervise(
    config: KucoinWebsocketConfig,
    mut router: EventRouter,
    resolver: Arc<dyn EndpointResolver>,
    ctx: SessionContext,
    state_tx: watch::Sender<ConnectionState>,
) {
    let session_config = SessionConfig {
        connect_timeout: CONNECT_TIMEOUT,
        ping_interval: config.ping_interval,
        pong_timeout: config.pong_timeout,
        ack_timeout: config.ack_timeout,
    };
    let mut shutdown = ctx.shutdown.clone();
    let mut attempt: u32 = 0;

    let _ = state_tx.send(ConnectionState::Connecting);
    loop {
        if *shutdown.borrow() {
            break;
        }

        // A fresh endpoint (and token) for every attempt.
        let resolved = tokio::select! {
            resolved = resolver.resolve() => resolved,
            _ = shutdown.wait_for(|closing| *closing) => break,
        };
        match resolved {
            Ok(url) => {
                let established = tokio::select! {
                    established = session::establish(&url, session_config.connect_timeout) => established,
                    _ = shutdown.wait_for(|closing| *closing) => break,
                };
                match established {
                    Ok(est) => {
                        attempt = 0;
                        // A reconnect is a hard ordering boundary.
                        router.reset_sequences();
                        let _ = state_tx.send(ConnectionState::Connected);
                        let reason = session::run(est, &session_config, &ctx, &mut router).await;
                        info!("[Manager] Session ended: {:?}", reason);
                        if reason == CloseReason::LocalClose {
                            break;
                        }
                    }
                    Err(e) => error!("[Manager] Failed to establish connection: {}", e),
                }
            }
            Err(e) => error!("[Manager] Failed to resolve endpoint: {}", e),
        }

        if *shutdown.borrow() {
            break;
        }
        attempt += 1;
        if let Some(max) = config.max_reconnect_attempts {
            if attempt > max {
                error!(
                    "[Manager] Max reconnect attempts ({}) reached. Stopping connection attempts.",
                    max
                );
                break;
            }
        }
        let _ = state_tx.send(ConnectionState::Reconnecting);
        info!(
            "[Manager] Disconnected. Retrying in {:?} (attempt {}).",
            config.reconnect_period, attempt
        );
        tokio::select! {
            _ = sleep(config.reconnect_period) => {}
            _ = shutdown.wait_for(|closing| *closing) => break,
        }
    }

    let _ = state_tx.send(ConnectionState::Closing);
    let _ = state_tx.send(ConnectionState::Closed);
    info!("[Manager] Task finished.");
}
