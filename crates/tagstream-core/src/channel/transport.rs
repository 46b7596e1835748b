//! Boundary between channel state and the network tasks.
//!
//! A `Connector` spawns one task per connection attempt. The task only talks
//! to the network and posts `ChannelEvent`s tagged with the generation it was
//! opened with; it never touches channel state.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ChannelKind;

/// Connection attempt counter. Events from an older generation are stale.
pub type Generation = u64;

/// Capacity of the session inbox shared by both transports.
pub const DEFAULT_INBOX_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEventKind {
    /// Transport is connected.
    Opened,
    /// One inbound text frame, verbatim.
    Frame(String),
    /// Transport failed; the task has ended.
    Failed(String),
    /// Remote side closed cleanly; the task has ended.
    Closed,
    /// A scheduled reconnect is due.
    RetryDue,
}

/// Event posted to the session inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel: ChannelKind,
    pub generation: Generation,
    pub kind: ChannelEventKind,
}

/// Sending half handed to a transport task.
#[derive(Debug, Clone)]
pub struct EventSink {
    channel: ChannelKind,
    generation: Generation,
    tx: mpsc::Sender<ChannelEvent>,
}

impl EventSink {
    pub fn new(channel: ChannelKind, generation: Generation, tx: mpsc::Sender<ChannelEvent>) -> Self {
        Self {
            channel,
            generation,
            tx,
        }
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Posts `kind` to the inbox. Returns false once the inbox is gone.
    pub async fn emit(&self, kind: ChannelEventKind) -> bool {
        self.tx
            .send(ChannelEvent {
                channel: self.channel,
                generation: self.generation,
                kind,
            })
            .await
            .is_ok()
    }
}

/// Owner's grip on a running transport task. Dropping it cancels the task.
#[derive(Debug)]
pub struct TransportHandle {
    cancel: CancellationToken,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

impl TransportHandle {
    pub fn new(cancel: CancellationToken, outbound: Option<mpsc::UnboundedSender<String>>) -> Self {
        Self { cancel, outbound }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Hands `payload` to the writer half. Fails when the transport has no
    /// writer or its task has ended.
    pub fn send(&self, payload: String) -> Result<(), String> {
        let Some(outbound) = &self.outbound else {
            return Err("transport is receive-only".to_string());
        };
        outbound
            .send(payload)
            .map_err(|err| format!("transport task has stopped: {err}"))
    }

    /// Cancels the task and forgets it.
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        self.outbound = None;
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Opens one transport connection.
pub trait Connector: Send + Sync {
    /// Spawns the connection task. The task reports through `sink` and must
    /// stop when the returned handle's token is cancelled.
    fn open(&self, sink: EventSink) -> TransportHandle;
}
