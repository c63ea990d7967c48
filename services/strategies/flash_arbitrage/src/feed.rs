//! # Feed Connections - Venue Delta Streams over WebSocket
//!
//! ## Purpose
//!
//! One task per configured feed keeps a WebSocket subscription alive and forwards every
//! decoded venue delta into the ingest pipeline. The protocol bookkeeping lives in the
//! synchronous [`FeedMachine`] so it can be driven frame by frame in tests; [`FeedClient`]
//! wraps it with the socket, reconnect backoff and health reporting.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Subscribed ──► Streaming ⇄ Degraded
//!      ▲                                             │          │
//!      └──────────── close / heartbeat timeout / decode budget ─┘
//! ```
//!
//! - A sequence gap degrades the feed and forces a resubscription; the delta that
//!   revealed the gap is still forwarded because it is newer than anything applied
//! - Duplicates are dropped
//! - Consecutive undecodable frames beyond the budget force a reconnect
//! - Silence beyond the heartbeat timeout forces a reconnect
//!
//! ## Integration Points
//!
//! - **Input**: JSON text frames ([`codec::decode_message`]) or binary frames
//!   ([`codec::decode_delta`])
//! - **Output**: [`RawDelta`] over a bounded `mpsc` channel; a full channel applies
//!   backpressure to the socket read
//! - **Health**: failures feed the shared [`HealthTracker`]; an exhausted reconnect budget
//!   emits `VenueDegraded`

use codec::{decode_delta, decode_message, encode_subscribe, FeedDelta, FeedMessage, SubscribeRequest};
use futures_util::{Sink, SinkExt, StreamExt};
use network::{Backoff, HealthTracker};
use serde::Serialize;
use state_market::{SequenceCheck, SequenceTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async_with_config;
use tracing::{debug, info, warn};
use types::{ErrorClass, StrategyEvent};

use crate::config::FeedConfig;
use crate::error::{StrategyError, StrategyResult};
use crate::events::EventBus;
use crate::pipeline::RawDelta;
use crate::{log_network, log_warning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Degraded,
}

/// What the connection should do after a frame
#[derive(Debug, Clone, PartialEq)]
pub enum FeedAction {
    Ignore,
    Emit(FeedDelta),
    /// Forward the delta, then resubscribe to recover the skipped range
    EmitAndResubscribe(FeedDelta),
    Resubscribe,
    Reconnect(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub frames: u64,
    pub deltas: u64,
    pub heartbeats: u64,
    pub decode_errors: u64,
    pub gaps: u64,
    pub duplicates: u64,
    pub sessions: u64,
}

/// Per-feed protocol state, free of IO
#[derive(Debug)]
pub struct FeedMachine {
    state: FeedState,
    tracker: SequenceTracker,
    consecutive_decode_errors: u32,
    decode_error_budget: u32,
    heartbeat_timeout: Duration,
    last_frame: Option<Instant>,
    stats: FeedStats,
}

impl FeedMachine {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            state: FeedState::Disconnected,
            tracker: SequenceTracker::new(config.name.clone()),
            consecutive_decode_errors: 0,
            decode_error_budget: config.decode_error_budget,
            heartbeat_timeout: Duration::from_millis(config.heartbeat_timeout_ms),
            last_frame: None,
            stats: FeedStats::default(),
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    pub fn on_connecting(&mut self) {
        self.state = FeedState::Connecting;
    }

    /// Subscription sent on a fresh connection or after a gap; sequence numbering restarts
    pub fn on_subscribed(&mut self, now: Instant) {
        if self.state == FeedState::Connecting {
            self.stats.sessions += 1;
        }
        self.state = FeedState::Subscribed;
        self.tracker.reset();
        self.consecutive_decode_errors = 0;
        self.last_frame = Some(now);
    }

    pub fn on_disconnected(&mut self) {
        self.state = FeedState::Disconnected;
        self.tracker.reset();
        self.last_frame = None;
    }

    /// Control frames (ping/pong) prove liveness without carrying data
    pub fn touch(&mut self, now: Instant) {
        self.last_frame = Some(now);
    }

    pub fn on_text(&mut self, text: &str, now: Instant) -> FeedAction {
        self.stats.frames += 1;
        self.last_frame = Some(now);
        match decode_message(text) {
            Ok(message) => self.on_message(message),
            Err(e) => self.on_decode_error(e.to_string()),
        }
    }

    pub fn on_binary(&mut self, frame: &[u8], now: Instant) -> FeedAction {
        self.stats.frames += 1;
        self.last_frame = Some(now);
        match decode_delta(frame) {
            Ok(delta) => self.on_message(FeedMessage::Delta(delta)),
            Err(e) => self.on_decode_error(e.to_string()),
        }
    }

    /// `Reconnect` once nothing has arrived for the heartbeat timeout
    pub fn check_heartbeat(&mut self, now: Instant) -> FeedAction {
        let Some(last) = self.last_frame else {
            return FeedAction::Ignore;
        };
        let silent = now.saturating_duration_since(last);
        if silent > self.heartbeat_timeout {
            self.state = FeedState::Degraded;
            return FeedAction::Reconnect(format!("no frame for {}ms", silent.as_millis()));
        }
        FeedAction::Ignore
    }

    fn on_message(&mut self, message: FeedMessage) -> FeedAction {
        self.consecutive_decode_errors = 0;
        match message {
            FeedMessage::Subscribed { topics } => {
                debug!(feed = self.tracker.feed(), ?topics, "subscription confirmed");
                FeedAction::Ignore
            }
            FeedMessage::Error { message } => {
                warn!(feed = self.tracker.feed(), %message, "feed reported an error");
                FeedAction::Ignore
            }
            FeedMessage::Heartbeat { sequence } => {
                self.stats.heartbeats += 1;
                match sequence.map(|seq| self.track(seq)) {
                    Some(SequenceCheck::Gap { .. }) => FeedAction::Resubscribe,
                    _ => FeedAction::Ignore,
                }
            }
            FeedMessage::Delta(delta) => match self.track(delta.sequence) {
                SequenceCheck::Duplicate { .. } => FeedAction::Ignore,
                SequenceCheck::Gap { .. } => {
                    self.stats.deltas += 1;
                    FeedAction::EmitAndResubscribe(delta)
                }
                SequenceCheck::InOrder => {
                    self.stats.deltas += 1;
                    FeedAction::Emit(delta)
                }
            },
        }
    }

    fn track(&mut self, sequence: u64) -> SequenceCheck {
        let check = self.tracker.track(sequence);
        match check {
            SequenceCheck::InOrder => self.state = FeedState::Streaming,
            SequenceCheck::Duplicate { last } => {
                self.stats.duplicates += 1;
                debug!(feed = self.tracker.feed(), sequence, last, "duplicate dropped");
            }
            SequenceCheck::Gap { expected, actual } => {
                self.stats.gaps += 1;
                self.state = FeedState::Degraded;
                warn!(feed = self.tracker.feed(), expected, actual, "sequence gap");
            }
        }
        check
    }

    fn on_decode_error(&mut self, reason: String) -> FeedAction {
        self.stats.decode_errors += 1;
        self.consecutive_decode_errors += 1;
        debug!(feed = self.tracker.feed(), %reason, "undecodable frame");
        if self.consecutive_decode_errors > self.decode_error_budget {
            self.state = FeedState::Degraded;
            return FeedAction::Reconnect(format!(
                "{} consecutive undecodable frames",
                self.consecutive_decode_errors
            ));
        }
        FeedAction::Ignore
    }
}

enum SessionEnd {
    Closed { streamed: bool },
    Shutdown,
}

/// WebSocket connection for one feed with reconnect and resubscribe
pub struct FeedClient {
    config: FeedConfig,
    name: Arc<str>,
    machine: FeedMachine,
    health: Arc<HealthTracker>,
    events: EventBus,
}

impl FeedClient {
    pub fn new(config: FeedConfig, health: Arc<HealthTracker>, events: EventBus) -> Self {
        let name: Arc<str> = Arc::from(format!("feed:{}", config.name));
        Self {
            machine: FeedMachine::new(&config),
            name,
            config,
            health,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn subscription(&self) -> StrategyResult<String> {
        let request = SubscribeRequest::new(self.config.topics.clone(), self.config.venues.clone());
        Ok(encode_subscribe(&request)?)
    }

    fn feed_error(&self, reason: impl Into<String>) -> StrategyError {
        StrategyError::Feed {
            feed: self.config.name.clone(),
            reason: reason.into(),
        }
    }

    /// Runs until `shutdown` flips or the pipeline hangs up
    pub async fn run(
        mut self,
        deltas: mpsc::Sender<RawDelta>,
        mut shutdown: watch::Receiver<bool>,
    ) -> StrategyResult<FeedStats> {
        let mut backoff = Backoff::new(self.config.backoff.clone());
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.session(&deltas, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed { streamed }) => {
                    log_network!("Feed {} closed by peer", self.config.name);
                    if streamed {
                        backoff.reset();
                    }
                }
                Err(StrategyError::ChannelClosed(what)) => {
                    info!(feed = %self.config.name, what, "pipeline gone, stopping feed");
                    break;
                }
                Err(e) => {
                    warn!(feed = %self.config.name, error = %e, "feed session failed");
                    self.health.record_failure(&self.name, &e.to_string());
                }
            }
            self.machine.on_disconnected();

            let delay = match backoff.next_delay() {
                Some(delay) => delay,
                None => {
                    log_warning!("Feed {} exhausted its reconnect budget", self.config.name);
                    self.health.trip(&self.name, "reconnect budget exhausted");
                    self.events.emit(StrategyEvent::VenueDegraded {
                        subject: self.name.to_string(),
                        class: ErrorClass::Transient,
                        detail: "reconnect budget exhausted".to_string(),
                    });
                    let ceiling = backoff.nominal_delay(u32::MAX);
                    backoff.reset();
                    ceiling
                }
            };
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        self.machine.on_disconnected();
        Ok(self.machine.stats().clone())
    }

    async fn session(
        &mut self,
        deltas: &mpsc::Sender<RawDelta>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StrategyResult<SessionEnd> {
        self.machine.on_connecting();
        log_network!("Connecting feed {}", self.config.name);

        let request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| self.feed_error(format!("bad request: {e}")))?;
        let ws_config = WebSocketConfig {
            max_message_size: Some(16 * 1024 * 1024),
            max_frame_size: Some(4 * 1024 * 1024),
            ..Default::default()
        };
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let (stream, response) = timeout(
            connect_timeout,
            connect_async_with_config(request, Some(ws_config), false),
        )
        .await
        .map_err(|_| self.feed_error("connect timed out"))?
        .map_err(|e| self.feed_error(format!("connect failed: {e}")))?;
        debug!(feed = %self.config.name, status = %response.status(), "socket open");

        let (mut write, mut read) = stream.split();
        let subscription = self.subscription()?;
        self.send(&mut write, Message::Text(subscription.clone())).await?;
        self.machine.on_subscribed(Instant::now());
        log_network!("Feed {} subscribed to {:?}", self.config.name, self.config.topics);

        let mut heartbeat = interval((self.machine.heartbeat_timeout / 2).max(Duration::from_millis(10)));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut streamed = false;

        loop {
            let action = tokio::select! {
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeat.tick() => self.machine.check_heartbeat(Instant::now()),
                frame = read.next() => match frame {
                    None | Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Closed { streamed }),
                    Some(Err(e)) => return Err(self.feed_error(format!("read failed: {e}"))),
                    Some(Ok(Message::Text(text))) => self.machine.on_text(&text, Instant::now()),
                    Some(Ok(Message::Binary(bytes))) => self.machine.on_binary(&bytes, Instant::now()),
                    Some(Ok(Message::Ping(payload))) => {
                        self.machine.touch(Instant::now());
                        self.send(&mut write, Message::Pong(payload)).await?;
                        FeedAction::Ignore
                    }
                    Some(Ok(_)) => {
                        self.machine.touch(Instant::now());
                        FeedAction::Ignore
                    }
                },
            };

            match action {
                FeedAction::Ignore => {}
                FeedAction::Emit(delta) => {
                    self.forward(deltas, delta, &mut streamed).await?;
                }
                FeedAction::EmitAndResubscribe(delta) => {
                    self.forward(deltas, delta, &mut streamed).await?;
                    self.resubscribe(&mut write, &subscription).await?;
                }
                FeedAction::Resubscribe => self.resubscribe(&mut write, &subscription).await?,
                FeedAction::Reconnect(reason) => return Err(self.feed_error(reason)),
            }
        }
    }

    async fn forward(
        &self,
        deltas: &mpsc::Sender<RawDelta>,
        delta: FeedDelta,
        streamed: &mut bool,
    ) -> StrategyResult<()> {
        if !*streamed {
            *streamed = true;
            self.health.record_success(&self.name);
        }
        deltas
            .send(RawDelta::new(self.name.clone(), delta))
            .await
            .map_err(|_| StrategyError::ChannelClosed("feed deltas"))
    }

    async fn resubscribe<S>(&mut self, write: &mut S, subscription: &str) -> StrategyResult<()>
    where
        S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        self.health.record_failure(&self.name, "sequence gap");
        self.send(write, Message::Text(subscription.to_string())).await?;
        self.machine.on_subscribed(Instant::now());
        log_network!("Feed {} resubscribed after a gap", self.config.name);
        Ok(())
    }

    async fn send<S>(&self, write: &mut S, message: Message) -> StrategyResult<()>
    where
        S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        write
            .send(message)
            .await
            .map_err(|e| self.feed_error(format!("write failed: {e}")))
    }
}
