//! Classification and dispatch of decoded frames to typed emitters.
//!
//! Classification order follows the wire discriminants: `welcome` resolves
//! to the lifecycle emitter, `ack` resolves a pending subscribe receipt by
//! request id, and `message` frames are keyed on `topic`/`subject` to one of
//! the typed emitter categories. Emission is fan-out: every registered
//! listener of a category receives the event, and a panicking listener
//! cannot prevent delivery to the others.

use crate::types::{
    AvailableBalanceChangeEvent, BalanceUpdateEvent, OrderMarginChangeEvent, OrderUpdateEvent,
    PositionChangeEvent, RawMessageEvent, StreamDiagnostic, SymbolTickerEvent,
};
use crate::websocket::codec::InboundFrame;
use log::*;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

const TICKER_TOPIC_PREFIX: &str = "/contractMarket/ticker:";

type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Typed event callbacks, registered before the client connects.
///
/// Multiple listeners may be registered per category. Callbacks should be
/// quick to execute to avoid blocking the session's frame processing.
#[derive(Clone, Default)]
pub struct StreamHandlers {
    welcome: Vec<Listener<()>>,
    symbol_ticker: Vec<Listener<SymbolTickerEvent>>,
    order_update: Vec<Listener<OrderUpdateEvent>>,
    balance_update: Vec<Listener<BalanceUpdateEvent>>,
    position_change: Vec<Listener<PositionChangeEvent>>,
    raw_message: Vec<Listener<RawMessageEvent>>,
    diagnostic: Vec<Listener<StreamDiagnostic>>,
}

impl StreamHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifecycle: the session completed its handshake.
    pub fn on_welcome(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.welcome.push(Arc::new(move |()| f()));
        self
    }

    /// Market streams: real-time symbol ticker.
    pub fn on_symbol_ticker(
        mut self,
        f: impl Fn(SymbolTickerEvent) + Send + Sync + 'static,
    ) -> Self {
        self.symbol_ticker.push(Arc::new(f));
        self
    }

    /// User streams: order lifecycle updates.
    pub fn on_order_update(
        mut self,
        f: impl Fn(OrderUpdateEvent) + Send + Sync + 'static,
    ) -> Self {
        self.order_update.push(Arc::new(f));
        self
    }

    /// User streams: wallet balance changes.
    pub fn on_balance_update(
        mut self,
        f: impl Fn(BalanceUpdateEvent) + Send + Sync + 'static,
    ) -> Self {
        self.balance_update.push(Arc::new(f));
        self
    }

    /// User streams: position changes.
    pub fn on_position_change(
        mut self,
        f: impl Fn(PositionChangeEvent) + Send + Sync + 'static,
    ) -> Self {
        self.position_change.push(Arc::new(f));
        self
    }

    /// Passthrough frames whose `topic`/`subject` match no typed category.
    pub fn on_raw_message(
        mut self,
        f: impl Fn(RawMessageEvent) + Send + Sync + 'static,
    ) -> Self {
        self.raw_message.push(Arc::new(f));
        self
    }

    /// Side-channel diagnostics: sequence gaps, dropped frames, ack timeouts.
    pub fn on_diagnostic(
        mut self,
        f: impl Fn(StreamDiagnostic) + Send + Sync + 'static,
    ) -> Self {
        self.diagnostic.push(Arc::new(f));
        self
    }
}

fn emit<T: Clone>(listeners: &[Listener<T>], event: T, category: &str) {
    for listener in listeners {
        let event = event.clone();
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            error!(
                "[Router] A {} listener panicked; continuing delivery to remaining listeners.",
                category
            );
        }
    }
}

// --- Pending subscribe receipts ---

#[derive(Debug)]
struct PendingAck {
    topic: String,
    deadline: Instant,
}

/// Subscribe/unsubscribe requests awaiting a server receipt, keyed by the
/// request id. Shared between the client (which registers expectations when
/// it sends with `response: true`) and the session (which resolves and
/// sweeps them).
#[derive(Debug, Default)]
pub(crate) struct AckTable {
    pending: HashMap<u64, PendingAck>,
}

pub(crate) type SharedAcks = Arc<Mutex<AckTable>>;

impl AckTable {
    pub fn expect(&mut self, id: u64, topic: String, deadline: Instant) {
        self.pending.insert(id, PendingAck { topic, deadline });
    }

    fn resolve(&mut self, id: u64) -> Option<String> {
        self.pending.remove(&id).map(|p| p.topic)
    }

    /// Drains every expectation whose deadline has passed.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<(u64, String)> {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.resolve(id).map(|topic| (id, topic)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// --- Router ---

/// Routes decoded frames to the registered emitters, tracking per-symbol
/// ticker sequences to detect gaps.
pub(crate) struct EventRouter {
    handlers: StreamHandlers,
    acks: SharedAcks,
    sequences: HashMap<String, u64>,
}

impl EventRouter {
    pub fn new(handlers: StreamHandlers, acks: SharedAcks) -> Self {
        Self {
            handlers,
            acks,
            sequences: HashMap::new(),
        }
    }

    /// Drops all sequence baselines. Called at every new session: a
    /// reconnect is a hard ordering boundary, not a reportable gap.
    pub fn reset_sequences(&mut self) {
        self.sequences.clear();
    }

    pub fn route(&mut self, frame: InboundFrame) {
        match frame {
            InboundFrame::Welcome { id } => {
                debug!("[Router] Session welcome (id={}).", id);
                emit(&self.handlers.welcome, (), "welcome");
            }
            InboundFrame::Ack { id } => match id.parse::<u64>() {
                Ok(id) => {
                    let resolved = self.acks.lock().unwrap().resolve(id);
                    match resolved {
                        Some(topic) => trace!("[Router] Ack {} resolved for '{}'.", id, topic),
                        None => trace!("[Router] Ack {} had no pending request.", id),
                    }
                }
                Err(_) => trace!("[Router] Ignoring ack with non-numeric id '{}'.", id),
            },
            InboundFrame::Error { code, message } => {
                warn!("[Router] Server error {}: {}", code, message);
                emit(
                    &self.handlers.diagnostic,
                    StreamDiagnostic::ProtocolError { code, message },
                    "diagnostic",
                );
            }
            InboundFrame::Message {
                topic,
                subject,
                data,
            } => self.route_message(topic, subject, data),
            // Transport liveness frames are consumed by the session loop and
            // only reach the router on unexpected paths.
            InboundFrame::Ping { .. } | InboundFrame::Pong { .. } => {
                trace!("[Router] Ignoring heartbeat frame.")
            }
        }
    }

    /// Reports a dropped frame without interrupting the stream.
    pub fn report_decode_error(&self, detail: String, raw: String) {
        emit(
            &self.handlers.diagnostic,
            StreamDiagnostic::DecodeError { detail, raw },
            "diagnostic",
        );
    }

    /// Reports subscribe receipts that never arrived.
    pub fn report_ack_timeouts(&self, expired: Vec<(u64, String)>) {
        for (id, topic) in expired {
            warn!("[Router] No ack for request {} ('{}') in time.", id, topic);
            emit(
                &self.handlers.diagnostic,
                StreamDiagnostic::SubscriptionAckTimeout { id, topic },
                "diagnostic",
            );
        }
    }

    fn route_message(&mut self, topic: String, subject: String, data: Value) {
        match subject.as_str() {
            "ticker" if topic.starts_with(TICKER_TOPIC_PREFIX) => {
                match serde_json::from_value::<SymbolTickerEvent>(data) {
                    Ok(event) => {
                        self.track_sequence(&topic, &event);
                        emit(&self.handlers.symbol_ticker, event, "symbolTicker");
                    }
                    Err(e) => self.report_payload_error(&topic, &subject, e),
                }
                return;
            }
            "orderChange" => {
                match serde_json::from_value::<OrderUpdateEvent>(data) {
                    Ok(event) => emit(&self.handlers.order_update, event, "orderUpdate"),
                    Err(e) => self.report_payload_error(&topic, &subject, e),
                }
                return;
            }
            "orderMargin.change" => {
                match serde_json::from_value::<OrderMarginChangeEvent>(data) {
                    Ok(event) => emit(
                        &self.handlers.balance_update,
                        BalanceUpdateEvent::OrderMargin(event),
                        "balanceUpdate",
                    ),
                    Err(e) => self.report_payload_error(&topic, &subject, e),
                }
                return;
            }
            "availableBalance.change" => {
                match serde_json::from_value::<AvailableBalanceChangeEvent>(data) {
                    Ok(event) => emit(
                        &self.handlers.balance_update,
                        BalanceUpdateEvent::AvailableBalance(event),
                        "balanceUpdate",
                    ),
                    Err(e) => self.report_payload_error(&topic, &subject, e),
                }
                return;
            }
            "position.change" => {
                match serde_json::from_value::<PositionChangeEvent>(data) {
                    Ok(event) => emit(&self.handlers.position_change, event, "positionChange"),
                    Err(e) => self.report_payload_error(&topic, &subject, e),
                }
                return;
            }
            _ => {}
        }

        // Undocumented topic families pass through without failing.
        trace!(
            "[Router] Passthrough frame topic='{}' subject='{}'.",
            topic,
            subject
        );
        emit(
            &self.handlers.raw_message,
            RawMessageEvent {
                topic,
                subject,
                payload: data,
            },
            "rawMessage",
        );
    }

    /// Flags a gap when a symbol's sequence is not exactly `last + 1`, then
    /// adopts the new value as the baseline and lets the event through.
    fn track_sequence(&mut self, topic: &str, event: &SymbolTickerEvent) {
        if let Some(&last) = self.sequences.get(&event.symbol) {
            if event.sequence != last + 1 {
                emit(
                    &self.handlers.diagnostic,
                    StreamDiagnostic::SequenceGap {
                        topic: topic.to_string(),
                        symbol: event.symbol.clone(),
                        expected: last + 1,
                        got: event.sequence,
                    },
                    "diagnostic",
                );
            }
        }
        self.sequences.insert(event.symbol.clone(), event.sequence);
    }

    fn report_payload_error(&self, topic: &str, subject: &str, error: serde_json::Error) {
        warn!(
            "[Router] Dropping undecodable payload topic='{}' subject='{}': {}",
            topic, subject, error
        );
        self.report_decode_error(
            error.to_string(),
            format!("topic={} subject={}", topic, subject),
        );
    }
}
