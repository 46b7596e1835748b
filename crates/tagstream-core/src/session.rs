//! One agent session over the event and socket channels.
//!
//! The consumer owns the [`SessionController`] and its [`SessionInbox`] and
//! feeds every inbox event back through [`SessionController::handle`]:
//!
//! ```text
//! loop {
//!     tokio::select! {
//!         Some(event) = inbox.recv() => controller.handle(event),
//!         ...
//!     }
//! }
//! ```
//!
//! All state changes happen inside `handle`, on the consumer's task.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::channel::transport::DEFAULT_INBOX_CAPACITY;
use crate::channel::{
    ChannelEvent, ChannelEventKind, ChannelKind, ChannelOutput, ChannelPhase, ChannelState, ChannelStatus,
    Connector,
};
use crate::envelope::{Decoder, Envelope, EnvelopeDecoder, InboundMessage};
use crate::error::{ChannelError, ChannelErrorKind, ChannelResult};
use crate::parser::TagVocabulary;
use crate::reconnect::{ExponentialBackoff, ReconnectPolicy};
use crate::response::{ResponseAssembler, SessionSnapshot};

const NOTICE_CAPACITY: usize = 64;

/// Which channels a session needs before it counts as connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Events,
    Socket,
    #[default]
    Dual,
}

impl SessionMode {
    pub fn channels(self) -> &'static [ChannelKind] {
        match self {
            SessionMode::Events => &[ChannelKind::Events],
            SessionMode::Socket => &[ChannelKind::Socket],
            SessionMode::Dual => &[ChannelKind::Events, ChannelKind::Socket],
        }
    }

    pub fn requires(self, kind: ChannelKind) -> bool {
        self.channels().contains(&kind)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Events => write!(f, "events"),
            SessionMode::Socket => write!(f, "socket"),
            SessionMode::Dual => write!(f, "dual"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "events" | "sse" => Ok(SessionMode::Events),
            "socket" | "ws" | "websocket" => Ok(SessionMode::Socket),
            "dual" | "both" => Ok(SessionMode::Dual),
            other => bail!("Unknown session mode '{other}' (expected events, socket or dual)"),
        }
    }
}

/// Out-of-band information for subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// Server sent `type: "error"`. The current turn is untouched.
    RemoteError(Envelope),
    /// Any envelope that is not part of the response text.
    Control(Envelope),
    ChannelError(ChannelError),
    ChannelClosed(ChannelKind),
    ReconnectScheduled {
        channel: ChannelKind,
        attempt: u32,
        delay: Duration,
    },
    /// The policy gave up on `channel`.
    ReconnectExhausted { channel: ChannelKind, attempts: u32 },
}

/// Receiving end of the transport events for one session.
#[derive(Debug)]
pub struct SessionInbox {
    rx: mpsc::Receiver<ChannelEvent>,
}

impl SessionInbox {
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.rx.try_recv().ok()
    }
}

/// Configures and creates a [`SessionController`].
pub struct SessionBuilder {
    mode: SessionMode,
    events: Option<Arc<dyn Connector>>,
    socket: Option<Arc<dyn Connector>>,
    vocabulary: TagVocabulary,
    decoder: Decoder,
    policy: Arc<dyn ReconnectPolicy>,
    inbox_capacity: usize,
}

impl SessionBuilder {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            events: None,
            socket: None,
            vocabulary: TagVocabulary::default(),
            decoder: EnvelopeDecoder::default().into_decoder(),
            policy: Arc::new(ExponentialBackoff::default()),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }

    #[must_use]
    pub fn events(mut self, connector: Arc<dyn Connector>) -> Self {
        self.events = Some(connector);
        self
    }

    #[must_use]
    pub fn socket(mut self, connector: Arc<dyn Connector>) -> Self {
        self.socket = Some(connector);
        self
    }

    #[must_use]
    pub fn vocabulary(mut self, vocabulary: TagVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    #[must_use]
    pub fn decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    #[must_use]
    pub fn reconnect_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }

    /// Creates the controller and its inbox. Fails when the mode needs a
    /// channel no connector was given for.
    pub fn build(self) -> Result<(SessionController, SessionInbox)> {
        let (tx, rx) = mpsc::channel(self.inbox_capacity);

        let channel = |kind: ChannelKind,
                       connector: Option<Arc<dyn Connector>>|
         -> Result<Option<ChannelState>> {
            if !self.mode.requires(kind) {
                return Ok(None);
            }
            let Some(connector) = connector else {
                bail!("A {} session needs a {kind} connector", self.mode);
            };
            Ok(Some(ChannelState::new(
                kind,
                connector,
                Arc::clone(&self.decoder),
                tx.clone(),
            )))
        };
        let events = channel(ChannelKind::Events, self.events.clone())?;
        let socket = channel(ChannelKind::Socket, self.socket.clone())?;

        let assembler = ResponseAssembler::new(Arc::new(self.vocabulary));
        let (snapshot, _) = watch::channel(assembler.snapshot());
        let (connected, _) = watch::channel(false);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let controller = SessionController {
            mode: self.mode,
            assembler,
            turn_started: false,
            events,
            socket,
            policy: self.policy,
            attempts: RetryAttempts::default(),
            snapshot,
            connected,
            notices,
        };
        Ok((controller, SessionInbox { rx }))
    }
}

#[derive(Debug, Default)]
struct RetryAttempts {
    events: u32,
    socket: u32,
}

impl RetryAttempts {
    fn get_mut(&mut self, kind: ChannelKind) -> &mut u32 {
        match kind {
            ChannelKind::Events => &mut self.events,
            ChannelKind::Socket => &mut self.socket,
        }
    }
}

/// Owns the assembler and both channels behind one subscription surface.
pub struct SessionController {
    mode: SessionMode,
    assembler: ResponseAssembler,
    /// Whether the current turn has received anything yet.
    turn_started: bool,
    events: Option<ChannelState>,
    socket: Option<ChannelState>,
    policy: Arc<dyn ReconnectPolicy>,
    attempts: RetryAttempts,
    snapshot: watch::Sender<SessionSnapshot>,
    connected: watch::Sender<bool>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionController {
    pub fn builder(mode: SessionMode) -> SessionBuilder {
        SessionBuilder::new(mode)
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Connects every channel that is closed or failed.
    ///
    /// Returns `AlreadyConnected` only when nothing was left to connect.
    pub fn connect(&mut self) -> ChannelResult<()> {
        let mut started = false;
        let mut already = None;
        for kind in self.mode.channels() {
            let Some(channel) = self.channel_mut(*kind) else {
                continue;
            };
            match channel.connect() {
                Ok(()) => {
                    started = true;
                    // A channel already mid-retry keeps its count.
                    *self.attempts.get_mut(*kind) = 0;
                }
                Err(err) if err.kind == ChannelErrorKind::AlreadyConnected => already = Some(err),
                Err(err) => return Err(err),
            }
        }
        self.refresh_connected();
        match already {
            Some(err) if !started => Err(err),
            _ => Ok(()),
        }
    }

    /// Closes both channels. Pending retries become stale.
    pub fn disconnect(&mut self) {
        for channel in [self.events.as_mut(), self.socket.as_mut()].into_iter().flatten() {
            channel.disconnect();
        }
        self.attempts = RetryAttempts::default();
        self.refresh_connected();
    }

    /// Sends raw text through the socket channel.
    pub fn send(&self, message: impl Into<String>) -> ChannelResult<()> {
        match &self.socket {
            Some(socket) => socket.send(message.into()),
            None => Err(ChannelError::send_while_disconnected(ChannelKind::Socket)
                .with_details(format!("{} session has no socket channel", self.mode))),
        }
    }

    /// Applies one inbox event.
    pub fn handle(&mut self, event: ChannelEvent) {
        let kind = event.channel;
        let Some(channel) = self.channel_mut(kind) else {
            debug!(channel = %kind, "Event for a channel this session does not use");
            return;
        };
        let Some(output) = channel.accept(event) else {
            return;
        };

        match output {
            ChannelOutput::Opened => {
                *self.attempts.get_mut(kind) = 0;
                self.refresh_connected();
            }
            ChannelOutput::Message(message) => self.dispatch(message),
            ChannelOutput::Malformed(err) => self.notify(SessionNotice::ChannelError(err)),
            ChannelOutput::Failed(err) => {
                self.notify(SessionNotice::ChannelError(err));
                self.refresh_connected();
                self.schedule_retry(kind);
            }
            ChannelOutput::Closed => {
                self.notify(SessionNotice::ChannelClosed(kind));
                self.refresh_connected();
            }
            ChannelOutput::RetryDue => {
                info!(channel = %kind, "Reconnecting");
                if let Some(channel) = self.channel_mut(kind)
                    && let Err(err) = channel.connect()
                {
                    warn!(channel = %kind, "Reconnect skipped: {err}");
                }
                self.refresh_connected();
            }
        }
    }

    fn dispatch(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Delta { turn_id, text } => {
                self.ensure_turn(turn_id);
                let snapshot = self.assembler.apply_delta(&text);
                self.publish(snapshot);
            }
            InboundMessage::Complete { turn_id, text } => {
                if let Some(text) = text {
                    self.ensure_turn(turn_id);
                    self.assembler.apply_delta(&text);
                } else if self.assembler.is_complete() {
                    return;
                }
                let snapshot = self.assembler.mark_complete();
                debug!(turn_id = %snapshot.turn_id, "Turn complete");
                self.publish(snapshot);
            }
            InboundMessage::RemoteError(envelope) => self.notify(SessionNotice::RemoteError(envelope)),
            InboundMessage::Control(envelope) => self.notify(SessionNotice::Control(envelope)),
        }
    }

    /// Starts a new turn on the first delta, after a completed turn, or when
    /// the server switches turn ids.
    fn ensure_turn(&mut self, turn_id: Option<String>) {
        let switched = turn_id
            .as_deref()
            .is_some_and(|id| id != self.assembler.turn_id());
        if !self.turn_started || self.assembler.is_complete() || switched {
            self.assembler.begin_turn(turn_id);
            self.turn_started = true;
            debug!(turn_id = %self.assembler.turn_id(), "Turn started");
        }
    }

    fn schedule_retry(&mut self, kind: ChannelKind) {
        let attempt = {
            let attempts = self.attempts.get_mut(kind);
            *attempts += 1;
            *attempts
        };
        let Some(delay) = self.policy.next_delay(attempt) else {
            info!(channel = %kind, attempts = attempt - 1, "Giving up on reconnect");
            self.notify(SessionNotice::ReconnectExhausted {
                channel: kind,
                attempts: attempt - 1,
            });
            return;
        };
        let Some(channel) = self.channel(kind) else {
            return;
        };

        let sink = channel.sink();
        info!(channel = %kind, attempt, ?delay, "Scheduling reconnect");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink.emit(ChannelEventKind::RetryDue).await;
        });
        self.notify(SessionNotice::ReconnectScheduled {
            channel: kind,
            attempt,
            delay,
        });
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn refresh_connected(&self) {
        let connected = self.is_connected();
        self.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    /// True iff every channel the mode requires is open.
    pub fn is_connected(&self) -> bool {
        self.mode.channels().iter().all(|kind| {
            self.channel(*kind)
                .is_some_and(|channel| channel.phase() == ChannelPhase::Open)
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn channel_status(&self, kind: ChannelKind) -> Option<ChannelStatus> {
        self.channel(kind).map(ChannelState::status)
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub fn subscribe_channel(&self, kind: ChannelKind) -> Option<watch::Receiver<ChannelStatus>> {
        self.channel(kind).map(ChannelState::subscribe)
    }

    fn channel(&self, kind: ChannelKind) -> Option<&ChannelState> {
        match kind {
            ChannelKind::Events => self.events.as_ref(),
            ChannelKind::Socket => self.socket.as_ref(),
        }
    }

    fn channel_mut(&mut self, kind: ChannelKind) -> Option<&mut ChannelState> {
        match kind {
            ChannelKind::Events => self.events.as_mut(),
            ChannelKind::Socket => self.socket.as_mut(),
        }
    }
}
