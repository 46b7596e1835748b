//! Core tagstream library (tag parser, turn assembly, realtime channels, config).

pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod parser;
pub mod reconnect;
pub mod response;
pub mod session;

pub use channel::{ChannelKind, ChannelPhase, ChannelStatus};
pub use config::Config;
pub use error::{ChannelError, ChannelErrorKind};
pub use parser::{TagNode, TagValue, TagVocabulary, parse};
pub use response::{ParsedResponse, ResponseAssembler, ResponseValue, SessionSnapshot, UntaggedText};
pub use session::{SessionBuilder, SessionController, SessionInbox, SessionMode, SessionNotice};
