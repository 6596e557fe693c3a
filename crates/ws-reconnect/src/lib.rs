//! WebSocket Reconnect Manager (spec §4.2).
//!
//! One manager per logical connection. On dial success it runs the
//! configured auth function (if any), replays every recorded subscription
//! in insertion order, then invokes `on_connect`. On a read error it invokes
//! `on_disconnect`, waits a jittered exponential back-off, and redials.
//! Subscriptions are append-only: there is no unsubscribe, so a redial must
//! resubscribe everything recorded so far.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::Message;

pub type OnMessage = Box<dyn Fn(serde_json::Value) + Send + Sync>;
pub type OnConnect = Box<dyn Fn() + Send + Sync>;
pub type OnDisconnect = Box<dyn Fn(String) + Send + Sync>;
pub type AuthFn = Box<
    dyn Fn() -> futures_util::future::BoxFuture<'static, anyhow::Result<Option<serde_json::Value>>>
        + Send
        + Sync,
>;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

/// Tracks the current back-off delay and advances it exponentially with
/// full jitter, capped at `max`.
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Returns the jittered delay for the next attempt and advances the
    /// internal attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.config.initial.as_millis() as u64 * 2u64.saturating_pow(self.attempt);
        let capped = exp.min(self.config.max.as_millis() as u64);
        self.attempt = self.attempt.saturating_add(1);
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered)
    }
}

struct Callbacks {
    on_message: Option<OnMessage>,
    on_connect: Option<OnConnect>,
    on_disconnect: Option<OnDisconnect>,
    auth_fn: Option<AuthFn>,
}

/// Supervises a single logical WebSocket connection with automatic,
/// jittered-exponential-backoff reconnection.
pub struct ReconnectManager {
    url: String,
    backoff_config: BackoffConfig,
    subscriptions: Mutex<Vec<serde_json::Value>>,
    callbacks: Arc<AsyncMutex<Callbacks>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    running: AtomicBool,
    sender: AsyncMutex<Option<tokio::sync::mpsc::UnboundedSender<Message>>>,
}

impl ReconnectManager {
    #[must_use]
    pub fn new(url: impl Into<String>, backoff_config: BackoffConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            url: url.into(),
            backoff_config,
            subscriptions: Mutex::new(Vec::new()),
            callbacks: Arc::new(AsyncMutex::new(Callbacks {
                on_message: None,
                on_connect: None,
                on_disconnect: None,
                auth_fn: None,
            })),
            shutdown_tx,
            shutdown_rx,
            running: AtomicBool::new(false),
            sender: AsyncMutex::new(None),
        }
    }

    pub async fn set_on_message(&self, cb: OnMessage) {
        self.callbacks.lock().await.on_message = Some(cb);
    }

    pub async fn set_on_connect(&self, cb: OnConnect) {
        self.callbacks.lock().await.on_connect = Some(cb);
    }

    pub async fn set_on_disconnect(&self, cb: OnDisconnect) {
        self.callbacks.lock().await.on_disconnect = Some(cb);
    }

    pub async fn set_auth_func(&self, cb: AuthFn) {
        self.callbacks.lock().await.auth_fn = Some(cb);
    }

    /// Appends a subscription message. Subscriptions are append-only for the
    /// lifetime of the manager; every redial replays the full list in
    /// insertion order.
    pub fn add_subscription(&self, msg: serde_json::Value) {
        self.subscriptions.lock().push(msg);
    }

    /// Sends a message over the current connection, if any.
    ///
    /// # Errors
    /// Returns an error if there is no active connection.
    pub async fn send(&self, msg: serde_json::Value) -> anyhow::Result<()> {
        let guard = self.sender.lock().await;
        let sender = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("not connected"))?;
        sender.send(Message::Text(msg.to_string()))?;
        Ok(())
    }

    /// Starts the connect/read/reconnect loop as a background task.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }

    async fn run(self: Arc<Self>) {
        let mut backoff = Backoff::new(self.backoff_config);
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.connect_once().await {
                Ok(()) => backoff.reset(),
                Err(err) => {
                    tracing::warn!(url = %self.url, error = %err, "websocket connection failed");
                }
            }

            if *shutdown_rx.borrow() {
                break;
            }

            let callbacks = self.callbacks.lock().await;
            if let Some(cb) = &callbacks.on_disconnect {
                cb("connection closed".to_string());
            }
            drop(callbacks);

            let delay = backoff.next_delay();
            tracing::debug!(url = %self.url, delay_ms = delay.as_millis(), "reconnecting after backoff");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    async fn connect_once(&self) -> anyhow::Result<()> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.url).await?;
        let (mut write, mut read) = ws_stream.split();

        {
            let callbacks = self.callbacks.lock().await;
            if let Some(auth_fn) = &callbacks.auth_fn {
                if let Some(auth_msg) = auth_fn().await? {
                    write.send(Message::Text(auth_msg.to_string())).await?;
                }
            }
        }

        for sub in self.subscriptions.lock().iter().cloned() {
            write.send(Message::Text(sub.to_string())).await?;
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
        *self.sender.lock().await = Some(tx);

        {
            let callbacks = self.callbacks.lock().await;
            if let Some(cb) = &callbacks.on_connect {
                cb();
            }
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                outgoing = rx.recv() => {
                    match outgoing {
                        Some(msg) => { write.send(msg).await?; }
                        None => break,
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                                let callbacks = self.callbacks.lock().await;
                                if let Some(cb) = &callbacks.on_message {
                                    cb(json);
                                }
                            }
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) | None => {
                            anyhow::bail!("connection closed by peer");
                        }
                        Some(Err(err)) => {
                            anyhow::bail!("read error: {err}");
                        }
                        Some(Ok(_)) => {}
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Idempotent. Signals shutdown and waits for the reader task to
    /// observe it.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
