use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::transport::{ChannelEvent, ChannelEventKind, Connector, EventSink, Generation, TransportHandle};
use super::{ChannelKind, ChannelPhase, ChannelStatus};
use crate::envelope::{Decoder, InboundMessage};
use crate::error::{ChannelError, ChannelResult};

/// What an accepted transport event means to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutput {
    Opened,
    Message(InboundMessage),
    /// Frame could not be decoded; the channel is still open.
    Malformed(ChannelError),
    Failed(ChannelError),
    Closed,
    /// A scheduled reconnect may go ahead.
    RetryDue,
}

/// Lifecycle of one transport.
///
/// ```text
/// Closed ──connect──▶ Connecting ──opened──▶ Open
///    ▲                    │                    │
///    │                    └──────failed────────┴──▶ Error ──connect──▶ Connecting
///    └──────────── disconnect (from any phase) ────────────┘
/// ```
///
/// The transport handle never leaves this struct. Every `connect` and
/// `disconnect` starts a new generation, so events still queued from an
/// earlier connection are dropped in [`ChannelState::accept`].
pub struct ChannelState {
    kind: ChannelKind,
    connector: Arc<dyn Connector>,
    decoder: Decoder,
    inbox: mpsc::Sender<ChannelEvent>,
    generation: Generation,
    phase: ChannelPhase,
    last_error: Option<ChannelError>,
    handle: Option<TransportHandle>,
    status: watch::Sender<ChannelStatus>,
}

impl ChannelState {
    pub fn new(
        kind: ChannelKind,
        connector: Arc<dyn Connector>,
        decoder: Decoder,
        inbox: mpsc::Sender<ChannelEvent>,
    ) -> Self {
        let (status, _) = watch::channel(ChannelStatus::closed(kind));
        Self {
            kind,
            connector,
            decoder,
            inbox,
            generation: 0,
            phase: ChannelPhase::Closed,
            last_error: None,
            handle: None,
            status,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn last_error(&self) -> Option<&ChannelError> {
        self.last_error.as_ref()
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            kind: self.kind,
            phase: self.phase,
            last_error: self.last_error.clone(),
            can_send: self.kind.can_send() && self.phase == ChannelPhase::Open,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelStatus> {
        self.status.subscribe()
    }

    /// Opens a new transport. Only allowed from `Closed` or `Error`.
    pub fn connect(&mut self) -> ChannelResult<()> {
        if matches!(self.phase, ChannelPhase::Connecting | ChannelPhase::Open) {
            return Err(ChannelError::already_connected(self.kind));
        }

        if let Some(stale) = self.handle.take() {
            stale.release();
        }
        self.generation += 1;
        self.last_error = None;
        let sink = EventSink::new(self.kind, self.generation, self.inbox.clone());
        self.handle = Some(self.connector.open(sink));
        info!(channel = %self.kind, generation = self.generation, "Connecting");
        self.set_phase(ChannelPhase::Connecting);
        Ok(())
    }

    /// Drops the transport and returns to `Closed`. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.release();
        }
        if self.phase == ChannelPhase::Closed {
            return;
        }
        self.generation += 1;
        info!(channel = %self.kind, "Disconnected");
        self.set_phase(ChannelPhase::Closed);
    }

    /// Sends raw text. Never queues: outside `Open` the message is dropped
    /// and nothing reaches the network.
    pub fn send(&self, payload: String) -> ChannelResult<()> {
        if !self.kind.can_send() {
            return Err(ChannelError::receive_only(self.kind));
        }
        let Some(handle) = self.handle.as_ref().filter(|_| self.phase == ChannelPhase::Open) else {
            return Err(ChannelError::send_while_disconnected(self.kind));
        };
        handle
            .send(payload)
            .map_err(|reason| ChannelError::send_while_disconnected(self.kind).with_details(reason))
    }

    /// Sink for events that belong to the current generation (scheduled
    /// retries).
    pub fn sink(&self) -> EventSink {
        EventSink::new(self.kind, self.generation, self.inbox.clone())
    }

    /// Applies one transport event. Stale or out-of-phase events yield
    /// `None`.
    pub fn accept(&mut self, event: ChannelEvent) -> Option<ChannelOutput> {
        if event.channel != self.kind || event.generation != self.generation {
            debug!(
                channel = %self.kind,
                event_generation = event.generation,
                generation = self.generation,
                "Dropping stale channel event"
            );
            return None;
        }

        match event.kind {
            ChannelEventKind::Opened => {
                if self.phase != ChannelPhase::Connecting {
                    return None;
                }
                info!(channel = %self.kind, generation = self.generation, "Open");
                self.set_phase(ChannelPhase::Open);
                Some(ChannelOutput::Opened)
            }
            ChannelEventKind::Frame(frame) => {
                if self.phase != ChannelPhase::Open {
                    return None;
                }
                match (self.decoder)(&frame) {
                    Ok(message) => Some(ChannelOutput::Message(message)),
                    Err(err) => {
                        let error = ChannelError::malformed_frame(self.kind, &err, &frame);
                        warn!(channel = %self.kind, "{}", error.message);
                        self.last_error = Some(error.clone());
                        self.publish();
                        Some(ChannelOutput::Malformed(error))
                    }
                }
            }
            ChannelEventKind::Failed(message) => {
                if !self.is_live() {
                    return None;
                }
                let error = ChannelError::transport(self.kind, message);
                warn!(channel = %self.kind, generation = self.generation, "Transport failed: {}", error.message);
                if let Some(handle) = self.handle.take() {
                    handle.release();
                }
                self.last_error = Some(error.clone());
                self.set_phase(ChannelPhase::Error);
                Some(ChannelOutput::Failed(error))
            }
            ChannelEventKind::Closed => {
                if !self.is_live() {
                    return None;
                }
                info!(channel = %self.kind, "Closed by remote");
                if let Some(handle) = self.handle.take() {
                    handle.release();
                }
                self.set_phase(ChannelPhase::Closed);
                Some(ChannelOutput::Closed)
            }
            ChannelEventKind::RetryDue => {
                (self.phase == ChannelPhase::Error).then_some(ChannelOutput::RetryDue)
            }
        }
    }

    fn is_live(&self) -> bool {
        matches!(self.phase, ChannelPhase::Connecting | ChannelPhase::Open)
    }

    fn set_phase(&mut self, phase: ChannelPhase) {
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(self.status());
    }
}

impl Drop for ChannelState {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.release();
        }
    }
}
