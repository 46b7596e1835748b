use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;

/// Categories of channel errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelErrorKind {
    /// Inbound frame could not be decoded. The channel stays open.
    MalformedFrame,
    /// Connection failed or dropped.
    Transport,
    /// `send` called while the socket is not open. Nothing was sent.
    SendWhileDisconnected,
    /// `connect` called while connecting or open.
    AlreadyConnected,
    /// `send` called on the receive-only event channel.
    ReceiveOnly,
}

impl fmt::Display for ChannelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelErrorKind::MalformedFrame => write!(f, "malformed_frame"),
            ChannelErrorKind::Transport => write!(f, "transport"),
            ChannelErrorKind::SendWhileDisconnected => write!(f, "send_while_disconnected"),
            ChannelErrorKind::AlreadyConnected => write!(f, "already_connected"),
            ChannelErrorKind::ReceiveOnly => write!(f, "receive_only"),
        }
    }
}

/// Structured error raised by a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelError {
    pub kind: ChannelErrorKind,
    /// Channel the error belongs to
    pub channel: ChannelKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., the offending frame)
    pub details: Option<String>,
}

impl ChannelError {
    pub fn new(kind: ChannelErrorKind, channel: ChannelKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            channel,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn malformed_frame(channel: ChannelKind, reason: impl fmt::Display, frame: &str) -> Self {
        Self::new(
            ChannelErrorKind::MalformedFrame,
            channel,
            format!("malformed frame: {reason}"),
        )
        .with_details(frame)
    }

    pub fn transport(channel: ChannelKind, message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Transport, channel, message)
    }

    pub fn send_while_disconnected(channel: ChannelKind) -> Self {
        Self::new(
            ChannelErrorKind::SendWhileDisconnected,
            channel,
            format!("{channel} channel is not open; message dropped"),
        )
    }

    pub fn already_connected(channel: ChannelKind) -> Self {
        Self::new(
            ChannelErrorKind::AlreadyConnected,
            channel,
            format!("{channel} channel is already connecting or open"),
        )
    }

    pub fn receive_only(channel: ChannelKind) -> Self {
        Self::new(
            ChannelErrorKind::ReceiveOnly,
            channel,
            format!("{channel} channel cannot send"),
        )
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} channel: {}", self.channel, self.message)
    }
}

impl std::error::Error for ChannelError {}

/// Result type for channel operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;
