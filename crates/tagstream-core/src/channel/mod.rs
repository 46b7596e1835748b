//! Realtime channels: the receive-only event stream (SSE) and the
//! bidirectional socket (WebSocket).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub mod socket;
pub mod sse;
pub mod state;
pub mod transport;

pub use socket::SocketConnector;
pub use sse::SseConnector;
pub use state::{ChannelOutput, ChannelState};
pub use transport::{ChannelEvent, ChannelEventKind, Connector, EventSink, Generation, TransportHandle};

/// Which of the two transports a channel drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Server-sent events; receive-only.
    Events,
    /// WebSocket; the only channel that can send.
    Socket,
}

impl ChannelKind {
    pub fn can_send(self) -> bool {
        matches!(self, ChannelKind::Socket)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Events => write!(f, "events"),
            ChannelKind::Socket => write!(f, "socket"),
        }
    }
}

/// Lifecycle phase of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPhase {
    #[default]
    Closed,
    Connecting,
    Open,
    Error,
}

impl fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelPhase::Closed => write!(f, "closed"),
            ChannelPhase::Connecting => write!(f, "connecting"),
            ChannelPhase::Open => write!(f, "open"),
            ChannelPhase::Error => write!(f, "error"),
        }
    }
}

/// Subscribable value of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub kind: ChannelKind,
    pub phase: ChannelPhase,
    pub last_error: Option<ChannelError>,
    /// Only ever true for the socket while open.
    pub can_send: bool,
}

impl ChannelStatus {
    pub fn closed(kind: ChannelKind) -> Self {
        Self {
            kind,
            phase: ChannelPhase::Closed,
            last_error: None,
            can_send: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.phase == ChannelPhase::Open
    }
}
