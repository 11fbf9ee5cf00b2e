//! One physical socket generation.
//!
//! A session is created by the supervisor, lives exactly one connection
//! lifetime, and is never reused: any terminal condition ends the session
//! and the supervisor decides whether a fresh one replaces it. Teardown is
//! a barrier — the heartbeat monitor and the writer task are both stopped
//! before the terminal cause is returned.

use crate::error::{KucoinError, Result};
use crate::websocket::codec::{self, InboundFrame};
use crate::websocket::heartbeat::{ActivityTracker, HeartbeatMonitor};
use crate::websocket::registry::SharedRegistry;
use crate::websocket::router::{EventRouter, SharedAcks};
use futures_util::{SinkExt, StreamExt};
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use url::Url;

// Type alias for the WebSocket stream
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
// Type alias for the shared sender channel; populated only while a session
// is live, cleared before the session reports its terminal cause.
pub(crate) type SharedSender = Arc<Mutex<Option<mpsc::Sender<Message>>>>;

/// Why a session ended. Reported exactly once per session instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// Transport-level failure: read/write error or stream end.
    Transport(String),
    /// The heartbeat deadline elapsed without inbound traffic.
    HeartbeatTimeout,
    /// The server initiated the close handshake.
    RemoteClose,
    /// Caller-initiated shutdown. Not a failure; no reconnect follows.
    LocalClose,
}

#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub ack_timeout: Duration,
}

/// Shared state a session needs from the client that outlives it.
pub(crate) struct SessionContext {
    pub registry: SharedRegistry,
    pub acks: SharedAcks,
    pub shared_tx: SharedSender,
    pub shutdown: watch::Receiver<bool>,
}

/// A transport that completed the connect handshake: the socket is open and
/// the server's welcome envelope has arrived.
pub(crate) struct EstablishedSession {
    stream: WsStream,
    welcome: InboundFrame,
}

/// Endpoint URLs carry the connection token in the query string; log only
/// the location.
fn display_url(url: &Url) -> String {
    format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or("<unknown-host>"),
        url.path()
    )
}

/// Opens the transport and waits for the welcome envelope.
///
/// Both steps share `connect_timeout`; a server that accepts the socket but
/// never greets is treated the same as one that refuses the connection.
pub(crate) async fn establish(url: &Url, connect_timeout: Duration) -> Result<EstablishedSession> {
    info!("[Session] Connecting to WebSocket: {}", display_url(url));
    let (mut stream, response) = timeout(connect_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| KucoinError::ConnectError("Timed out opening transport".to_string()))?
        .map_err(|e| KucoinError::ConnectError(format!("WebSocket connection failed: {}", e)))?;
    debug!(
        "[Session] Transport open (status {:?}), awaiting welcome.",
        response.status()
    );

    let deadline = Instant::now() + connect_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let next = timeout(remaining, stream.next())
            .await
            .map_err(|_| KucoinError::ConnectError("Timed out awaiting welcome".to_string()))?;
        match next {
            Some(Ok(Message::Text(text))) => match codec::decode(&text) {
                Ok(welcome @ InboundFrame::Welcome { .. }) => {
                    info!("[Session] Welcome received, session established.");
                    return Ok(EstablishedSession { stream, welcome });
                }
                Ok(other) => trace!("[Session] Pre-welcome frame ignored: {:?}", other),
                Err(e) => warn!("[Session] Undecodable pre-welcome frame: {}", e),
            },
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                return Err(KucoinError::ConnectError(format!(
                    "Transport failed during handshake: {}",
                    e
                )))
            }
            None => {
                return Err(KucoinError::ConnectError(
                    "Connection closed during handshake".to_string(),
                ))
            }
        }
    }
}

/// Runs an established session to its terminal state.
///
/// Inbound frames are processed strictly in arrival order; the heartbeat
/// monitor and the caller's shutdown signal are the only other inputs to
/// the control loop.
pub(crate) async fn run(
    established: EstablishedSession,
    config: &SessionConfig,
    ctx: &SessionContext,
    router: &mut EventRouter,
) -> CloseReason {
    let (write, mut read) = established.stream.split();

    // Channel for sending outbound messages to the writer task.
    let (tx, mut rx) = mpsc::channel::<Message>(32);

    // --- Writer Task ---
    // Reads messages from the channel and sends them to the WebSocket sink.
    let writer_handle = tokio::spawn(async move {
        let mut write = write;
        while let Some(message) = rx.recv().await {
            trace!("[Session] Sending WS message: {:?}", message);
            if let Err(e) = write.send(message).await {
                error!("[Session] WebSocket send error: {}. Stopping writer task.", e);
                break;
            }
        }
        let _ = write.close().await;
        trace!("[Session] Writer task finished.");
    });

    // Make the sender available to the caller for subscribe/unsubscribe.
    *ctx.shared_tx.lock().await = Some(tx.clone());

    let activity = ActivityTracker::new();
    activity.touch(); // the welcome frame counts as traffic

    router.route(established.welcome);

    let (hb_timeout_tx, mut hb_timeout_rx) = mpsc::channel::<()>(1);
    let heartbeat = HeartbeatMonitor::spawn(
        config.ping_interval,
        config.pong_timeout,
        tx.clone(),
        activity.clone(),
        hb_timeout_tx,
    );

    let mut shutdown = ctx.shutdown.clone();
    let mut ack_sweep = interval_at(
        Instant::now() + config.ack_timeout,
        config.ack_timeout,
    );

    let reason = match replay_subscriptions(ctx, config, &tx).await {
        Err(e) => {
            error!("[Session] Failed to replay subscriptions: {}", e);
            CloseReason::Transport(e.to_string())
        }
        Ok(()) => loop {
            tokio::select! {
                // A true shutdown value wins even if it was set before this
                // session started.
                // Convert the watch guard to a plain bool inside the branch
                // future so no `Ref`/`RwLockReadGuard` is held across the await
                // below (which would make the session future non-Send).
                ok = async { shutdown.wait_for(|closing| *closing).await.is_ok() } => {
                    // A dropped sender means the client itself is gone.
                    if ok {
                        info!("[Session] Local close requested, sending close handshake.");
                    }
                    let _ = tx.send(Message::Close(None)).await;
                    break CloseReason::LocalClose;
                }
                Some(()) = hb_timeout_rx.recv() => {
                    break CloseReason::HeartbeatTimeout;
                }
                _ = ack_sweep.tick() => {
                    let expired = ctx.acks.lock().unwrap().drain_expired(Instant::now());
                    if !expired.is_empty() {
                        router.report_ack_timeouts(expired);
                    }
                }
                inbound = read.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        activity.touch();
                        match codec::decode(&text) {
                            Ok(InboundFrame::Ping { id }) => {
                                let _ = tx.send(Message::Text(codec::pong_frame(&id))).await;
                            }
                            Ok(InboundFrame::Pong { id }) => {
                                trace!("[Session] Pong {} received.", id);
                            }
                            Ok(frame) => router.route(frame),
                            Err(e) => {
                                warn!("[Session] Dropping malformed frame: {}", e);
                                router.report_decode_error(e.to_string(), text);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        activity.touch();
                        let _ = tx.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        activity.touch();
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!("[Session] Received WS close frame: {:?}", frame);
                        break CloseReason::RemoteClose;
                    }
                    Some(Ok(other)) => {
                        trace!("[Session] Ignoring non-text frame: {:?}", other);
                        activity.touch();
                    }
                    Some(Err(e)) => {
                        error!("[Session] WebSocket read error: {}", e);
                        break CloseReason::Transport(e.to_string());
                    }
                    None => {
                        info!("[Session] WebSocket stream ended.");
                        break CloseReason::Transport("stream ended".to_string());
                    }
                }
            }
        },
    };

    // --- Teardown barrier ---
    // The monitor stops first so no ping can fire past this point; the
    // writer drains its queue (including a pending close frame) and exits
    // once the last sender is dropped.
    heartbeat.stop().await;
    *ctx.shared_tx.lock().await = None;
    ctx.acks.lock().unwrap().clear();
    drop(tx);
    let _ = writer_handle.await;

    info!("[Session] Session closed: {:?}", reason);
    reason
}

/// Re-primes a fresh session with every active subscription, in insertion
/// order.
async fn replay_subscriptions(
    ctx: &SessionContext,
    config: &SessionConfig,
    tx: &mpsc::Sender<Message>,
) -> Result<()> {
    let snapshot = ctx.registry.lock().await.snapshot();
    if snapshot.is_empty() {
        return Ok(());
    }
    info!("[Session] Replaying {} subscription(s).", snapshot.len());
    for sub in snapshot {
        if sub.wants_ack {
            ctx.acks.lock().unwrap().expect(
                sub.id,
                sub.topic.clone(),
                Instant::now() + config.ack_timeout,
            );
        }
        tx.send(Message::Text(codec::subscribe_frame(&sub)))
            .await
            .map_err(|e| {
                KucoinError::WebsocketError(format!("Failed to send subscription replay: {}", e))
            })?;
    }
    Ok(())
}
