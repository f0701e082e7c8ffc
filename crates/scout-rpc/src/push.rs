//! WebSocket push client with automatic reconnect and transparent resubscription.
//!
//! [`PushClient`] speaks `logsSubscribe` over a JSON-RPC WebSocket. Each
//! subscription hands the caller a plain `mpsc::Receiver` that survives
//! reconnects: on a new connection every previously established filter is
//! re-sent, and the fresh server-side subscription id is spliced into the
//! routing table in place of the old one, so the consumer stream is never
//! interrupted.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           PushClient                                │
//! │                                                                     │
//! │  subscribe_logs ──▶ pending_subs ──┐                                │
//! │                     active_filters │                                │
//! │                                    ▼                                │
//! │  ┌────────────┐   confirmations  ┌──────────┐   notifications       │
//! │  │ writer task│◀── outbound ──── │ reader   │──▶ subs ──▶ consumer  │
//! │  │ (+ ping)   │                  │ loop     │    channels (blocking │
//! │  └────────────┘                  └──────────┘    send, ≥10k buffer) │
//! │        ▲                              │                             │
//! │        └───────── reconnect loop ─────┘                             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Locking
//!
//! Three tables are shared between the caller and the connection tasks.
//! Lock order is always `pending_subs` → `subs` → `active_filters`; no lock
//! is held across an await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PushConfig;
use crate::error::{Result, RpcError};
use crate::types::{LogNotification, WsEnvelope};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTING STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// A subscription awaiting its server-side confirmation.
struct PendingSub {
    /// Stable filter id (the original request id) this request belongs to.
    filter_id: u64,
    /// Caller waiting for the first confirmation; `None` on resubscription.
    confirm: Option<oneshot::Sender<Result<u64>>>,
    /// Consumer channel to register once the subscription id arrives.
    consumer: mpsc::Sender<LogNotification>,
}

/// An established (or establishing) filter, re-sent after every reconnect.
struct ActiveFilter {
    /// Program ids for the `mentions` filter.
    mentions: Vec<String>,
    /// Consumer channel notifications are routed into.
    consumer: mpsc::Sender<LogNotification>,
    /// Current server-side subscription id, once confirmed.
    subscription_id: Option<u64>,
}

/// The filter table plus the connection flag that decides whether a new
/// subscribe request is written immediately or deferred to the next
/// resubscription sweep.
struct FilterTable {
    connected: bool,
    filters: HashMap<u64, ActiveFilter>,
}

struct PushShared {
    ws_url: String,
    config: PushConfig,
    request_id: AtomicU64,
    // Lock order: pending_subs -> subs -> active_filters.
    pending_subs: Mutex<HashMap<u64, PendingSub>>,
    subs: Mutex<HashMap<u64, mpsc::Sender<LogNotification>>>,
    active_filters: Mutex<FilterTable>,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl PushShared {
    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUSH CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// WebSocket push client for `logsSubscribe` streams.
///
/// Reconnect backoff starts at
/// [`reconnect_base_delay`](PushConfig::reconnect_base_delay), doubles per
/// failed attempt up to the cap, and resets after any successful read. A
/// keep-alive ping goes out every [`ping_interval`](PushConfig::ping_interval)
/// and a read that stalls past [`read_timeout`](PushConfig::read_timeout)
/// tears the connection down for exactly one reconnection attempt at a time.
pub struct PushClient {
    shared: Arc<PushShared>,
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("ws_url", &self.shared.ws_url)
            .finish_non_exhaustive()
    }
}

impl PushClient {
    /// Create a push client and start its connection supervisor.
    ///
    /// The socket is dialed in the background;
    /// [`subscribe_logs`](Self::subscribe_logs) blocks until its
    /// confirmation arrives, so callers need not wait here.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn connect(ws_url: impl Into<String>, config: PushConfig) -> Result<Self> {
        config.validate()?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(64);
        let shared = Arc::new(PushShared {
            ws_url: ws_url.into(),
            config,
            request_id: AtomicU64::new(1),
            pending_subs: Mutex::new(HashMap::new()),
            subs: Mutex::new(HashMap::new()),
            active_filters: Mutex::new(FilterTable {
                connected: false,
                filters: HashMap::new(),
            }),
            outbound: outbound_tx,
            cancel: CancellationToken::new(),
        });

        tokio::spawn(supervise(Arc::clone(&shared), outbound_rx));

        Ok(Self { shared })
    }

    /// Subscribe to log notifications mentioning the given program ids.
    ///
    /// Blocks until the server confirms the subscription or the
    /// confirmation deadline elapses. The returned receiver keeps yielding
    /// across reconnects.
    ///
    /// # Errors
    ///
    /// - [`RpcError::SubscribeTimeout`] when no confirmation arrives in time
    /// - [`RpcError::SubscriptionClosed`] when the client is shut down
    /// - [`RpcError::Rpc`] when the server rejects the subscription
    pub async fn subscribe_logs(
        &self,
        mentions: &[String],
    ) -> Result<mpsc::Receiver<LogNotification>> {
        let shared = &self.shared;
        if shared.cancel.is_cancelled() {
            return Err(RpcError::SubscriptionClosed("client closed".into()));
        }

        let (consumer_tx, consumer_rx) =
            mpsc::channel::<LogNotification>(shared.config.notification_buffer);
        let (confirm_tx, confirm_rx) = oneshot::channel();
        let filter_id = shared.next_request_id();

        shared.pending_subs.lock().insert(
            filter_id,
            PendingSub {
                filter_id,
                confirm: Some(confirm_tx),
                consumer: consumer_tx.clone(),
            },
        );

        // Register the filter and decide whether to write now or let the
        // next resubscription sweep pick it up.
        let send_now = {
            let mut table = shared.active_filters.lock();
            table.filters.insert(
                filter_id,
                ActiveFilter {
                    mentions: mentions.to_vec(),
                    consumer: consumer_tx,
                    subscription_id: None,
                },
            );
            table.connected
        };

        if send_now {
            let frame = subscribe_frame(filter_id, mentions, &shared.config.commitment);
            if shared.outbound.send(frame).await.is_err() {
                self.forget_filter(filter_id);
                return Err(RpcError::SubscriptionClosed("connection task gone".into()));
            }
        }

        match timeout(shared.config.subscribe_timeout, confirm_rx).await {
            Ok(Ok(Ok(subscription_id))) => {
                debug!(filter_id, subscription_id, "subscription confirmed");
                Ok(consumer_rx)
            }
            Ok(Ok(Err(e))) => {
                self.forget_filter(filter_id);
                Err(e)
            }
            Ok(Err(_closed)) => {
                self.forget_filter(filter_id);
                Err(RpcError::SubscriptionClosed("client closed".into()))
            }
            Err(_elapsed) => {
                self.forget_filter(filter_id);
                Err(RpcError::SubscribeTimeout(shared.config.subscribe_timeout))
            }
        }
    }

    /// Shut the client down. All consumer streams end after in-flight
    /// notifications drain.
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    /// Drop all routing state for a filter that never came up.
    fn forget_filter(&self, filter_id: u64) {
        self.shared.pending_subs.lock().remove(&filter_id);
        let removed = self.shared.active_filters.lock().filters.remove(&filter_id);
        if let Some(ActiveFilter {
            subscription_id: Some(sub_id),
            ..
        }) = removed
        {
            self.shared.subs.lock().remove(&sub_id);
        }
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

fn subscribe_frame(request_id: u64, mentions: &[String], commitment: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": request_id,
        "method": "logsSubscribe",
        "params": [{"mentions": mentions}, {"commitment": commitment}]
    })
    .to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONNECTION SUPERVISOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns the reconnect loop. Exactly one session (and therefore one
/// reconnection attempt) is in flight at any time.
async fn supervise(shared: Arc<PushShared>, outbound_rx: mpsc::Receiver<String>) {
    let outbound_rx = Arc::new(tokio::sync::Mutex::new(outbound_rx));
    let mut delay = shared.config.reconnect_base_delay;

    loop {
        if shared.cancel.is_cancelled() {
            break;
        }

        match connect_async(&shared.ws_url).await {
            Ok((ws, _response)) => {
                info!(ws_url = %shared.ws_url, "push connection established");
                let had_read = run_session(&shared, ws, &outbound_rx).await;

                if shared.cancel.is_cancelled() {
                    break;
                }
                if had_read {
                    delay = shared.config.reconnect_base_delay;
                }
                warn!(delay_ms = delay.as_millis() as u64, "push connection lost, reconnecting");
            }
            Err(e) => {
                warn!(error = %e, delay_ms = delay.as_millis() as u64, "push connection failed");
            }
        }

        tokio::select! {
            () = shared.cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
        delay = (delay * 2).min(shared.config.reconnect_max_delay);
    }

    shutdown_routing(&shared);
    info!("push client stopped");
}

/// Run one connected session. Returns whether at least one read succeeded,
/// which resets the reconnect backoff.
async fn run_session(
    shared: &Arc<PushShared>,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: &Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
) -> bool {
    let (sink, stream) = ws.split();
    let session = shared.cancel.child_token();

    // Frames queued against a previous, now-dead socket would subscribe
    // under request ids nobody routes. Discard them before resubscribing.
    {
        let mut rx = outbound_rx.lock().await;
        while rx.try_recv().is_ok() {}
    }

    resubscribe_all(shared).await;

    let writer = tokio::spawn(write_loop(
        sink,
        Arc::clone(outbound_rx),
        shared.config.ping_interval,
        session.clone(),
    ));

    let had_read = read_loop(shared, stream, &session).await;

    session.cancel();
    let _ = writer.await;

    shared.active_filters.lock().connected = false;
    had_read
}

/// Re-send a `logsSubscribe` for every registered filter and reattach any
/// callers still waiting on a confirmation.
async fn resubscribe_all(shared: &Arc<PushShared>) {
    // Confirmation channels of requests that raced the disconnect.
    let mut confirms: HashMap<u64, oneshot::Sender<Result<u64>>> = HashMap::new();
    {
        let mut pending = shared.pending_subs.lock();
        for (_, entry) in pending.drain() {
            if let Some(tx) = entry.confirm {
                confirms.insert(entry.filter_id, tx);
            }
        }
    }

    // Server-side subscription ids do not survive the connection.
    shared.subs.lock().clear();

    let snapshot: Vec<(u64, Vec<String>, mpsc::Sender<LogNotification>)> = {
        let mut table = shared.active_filters.lock();
        table.connected = true;
        table
            .filters
            .iter()
            .map(|(id, f)| (*id, f.mentions.clone(), f.consumer.clone()))
            .collect()
    };

    for (filter_id, mentions, consumer) in snapshot {
        let request_id = shared.next_request_id();
        shared.pending_subs.lock().insert(
            request_id,
            PendingSub {
                filter_id,
                confirm: confirms.remove(&filter_id),
                consumer,
            },
        );

        let frame = subscribe_frame(request_id, &mentions, &shared.config.commitment);
        if shared.outbound.send(frame).await.is_err() {
            return;
        }
        debug!(filter_id, request_id, "resubscribe queued");
    }
}

/// Write half: drains the outbound queue and emits keep-alive pings.
async fn write_loop(
    mut sink: WsSink,
    outbound_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    ping_interval: Duration,
    session: CancellationToken,
) {
    let mut rx = outbound_rx.lock().await;
    let mut ping = interval(ping_interval);

    loop {
        tokio::select! {
            () = session.cancelled() => {
                let _ = sink.close().await;
                return;
            }
            _ = ping.tick() => {
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    debug!(error = %e, "keep-alive ping failed");
                    session.cancel();
                    return;
                }
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { return };
                if let Err(e) = sink.send(Message::text(frame)).await {
                    debug!(error = %e, "outbound write failed");
                    session.cancel();
                    return;
                }
            }
        }
    }
}

/// Read half: enforces the read deadline and routes frames. Returns whether
/// at least one read succeeded.
async fn read_loop(
    shared: &Arc<PushShared>,
    mut stream: WsStream,
    session: &CancellationToken,
) -> bool {
    let mut had_read = false;

    loop {
        let next = tokio::select! {
            () = session.cancelled() => return had_read,
            next = timeout(shared.config.read_timeout, stream.next()) => next,
        };

        match next {
            Err(_elapsed) => {
                warn!(deadline = ?shared.config.read_timeout, "read deadline exceeded");
                return had_read;
            }
            Ok(None) => {
                warn!("push stream ended");
                return had_read;
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "push read failed");
                return had_read;
            }
            Ok(Some(Ok(message))) => {
                had_read = true;
                match message {
                    Message::Text(text) => route_text_frame(shared, text.as_str()).await,
                    Message::Close(_) => {
                        debug!("server closed the push connection");
                        return had_read;
                    }
                    // Pings are answered by the protocol layer; pongs and
                    // binary frames carry nothing we route.
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
                }
            }
        }
    }
}

/// Route one text frame: a confirmation for a request we sent, or a
/// server-initiated notification.
async fn route_text_frame(shared: &Arc<PushShared>, text: &str) {
    let envelope: WsEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "unparseable push frame");
            return;
        }
    };

    if envelope.method.as_deref() == Some("logsNotification") {
        let Some(params) = envelope.params else {
            warn!("logsNotification without params");
            return;
        };
        let subscription_id = params.subscription;

        // Clone the sender out of the table so the blocking send below
        // happens without the lock.
        let consumer = shared.subs.lock().get(&subscription_id).cloned();
        let Some(consumer) = consumer else {
            debug!(subscription_id, "notification for unknown subscription");
            return;
        };

        // Blocking send: a full consumer stalls this reader, which shrinks
        // the transport window instead of dropping events.
        if consumer.send(LogNotification::from(params)).await.is_err() {
            debug!(subscription_id, "consumer dropped, removing subscription");
            shared.subs.lock().remove(&subscription_id);
            shared
                .active_filters
                .lock()
                .filters
                .retain(|_, f| f.subscription_id != Some(subscription_id));
        }
        return;
    }

    let Some(request_id) = envelope.id else {
        debug!("push frame with neither method nor id");
        return;
    };

    let Some(pending) = shared.pending_subs.lock().remove(&request_id) else {
        debug!(request_id, "confirmation for unknown request");
        return;
    };

    if let Some(error) = envelope.error {
        warn!(request_id, code = error.code, "subscription rejected");
        shared.active_filters.lock().filters.remove(&pending.filter_id);
        if let Some(confirm) = pending.confirm {
            let _ = confirm.send(Err(error.into_error()));
        }
        return;
    }

    let Some(subscription_id) = envelope.result.as_ref().and_then(serde_json::Value::as_u64)
    else {
        warn!(request_id, "confirmation without a numeric subscription id");
        return;
    };

    shared.subs.lock().insert(subscription_id, pending.consumer);

    // The fresh id replaces whatever the previous connection assigned.
    if let Some(filter) = shared
        .active_filters
        .lock()
        .filters
        .get_mut(&pending.filter_id)
    {
        filter.subscription_id = Some(subscription_id);
    }

    debug!(request_id, subscription_id, "subscription routed");
    if let Some(confirm) = pending.confirm {
        let _ = confirm.send(Ok(subscription_id));
    }
}

/// Final cleanup: fail waiting callers and drop consumer channels so every
/// downstream stream terminates.
fn shutdown_routing(shared: &Arc<PushShared>) {
    let pending: Vec<PendingSub> = {
        let mut table = shared.pending_subs.lock();
        table.drain().map(|(_, p)| p).collect()
    };
    for entry in pending {
        if let Some(confirm) = entry.confirm {
            let _ = confirm.send(Err(RpcError::SubscriptionClosed("client closed".into())));
        }
    }
    shared.subs.lock().clear();
    let mut table = shared.active_filters.lock();
    table.connected = false;
    table.filters.clear();
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
