//! Keep-alive monitor for one connection session.
//!
//! Sends ping envelopes through the session writer channel at the configured
//! interval and watches for liveness. Per exchange semantics, any decoded
//! inbound frame counts as liveness, not only pong replies; the session
//! touches the shared [`ActivityTracker`] on every frame it decodes.
//!
//! A deadline breach is communicated as a single message on the timeout
//! channel consumed by the session control loop, never through shared
//! mutable flags. Stopping the monitor is a barrier: `stop` resolves only
//! after the task has exited, so no ping can fire once teardown begins.

use crate::websocket::codec;
use log::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;

/// Monotonic record of when the session last saw inbound traffic.
#[derive(Clone)]
pub(crate) struct ActivityTracker {
    epoch: Instant,
    last_ms: Arc<AtomicU64>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records inbound traffic, renewing the heartbeat deadline.
    pub fn touch(&self) {
        let ms = self.epoch.elapsed().as_millis() as u64;
        self.last_ms.store(ms, Ordering::Relaxed);
    }

    /// Time elapsed since the last recorded traffic.
    pub fn idle(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }
}

/// Handle to a spawned heartbeat task.
pub(crate) struct HeartbeatMonitor {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Spawns the monitor for one session generation.
    ///
    /// The first ping fires one full interval after spawn; the welcome frame
    /// has already primed the activity tracker by then. The connection is
    /// declared dead when it has been silent for `ping_interval +
    /// pong_timeout`, at which point exactly one signal is sent on
    /// `timeout_tx` and the task exits.
    pub fn spawn(
        ping_interval: Duration,
        pong_timeout: Duration,
        writer: mpsc::Sender<Message>,
        activity: ActivityTracker,
        timeout_tx: mpsc::Sender<()>,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let deadline = ping_interval + pong_timeout;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
            let mut ping_id: u64 = 0;
            loop {
                tokio::select! {
                    // Shutdown wins over a due tick so teardown is deterministic.
                    biased;
                    _ = shutdown_rx.changed() => {
                        trace!("[Heartbeat] Stop requested, exiting.");
                        break;
                    }
                    _ = ticker.tick() => {
                        if activity.idle() > deadline {
                            warn!(
                                "[Heartbeat] No traffic for {:?} (deadline {:?}), declaring connection dead.",
                                activity.idle(),
                                deadline
                            );
                            let _ = timeout_tx.send(()).await;
                            break;
                        }
                        ping_id += 1;
                        if writer
                            .send(Message::Text(codec::ping_frame(ping_id)))
                            .await
                            .is_err()
                        {
                            trace!("[Heartbeat] Writer channel closed, exiting.");
                            break;
                        }
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Stops the monitor and waits for the task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
