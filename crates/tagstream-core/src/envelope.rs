//! Wire envelope shared by both channels.
//!
//! Every inbound frame is a JSON object such as
//! `{"type": "generate", "content": "<thought>…", "action": "chat_message"}`.
//! The socket server names the payload `data` instead of `content`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope types carrying a text delta when no others are configured.
pub const DEFAULT_DELTA_TYPES: &[&str] = &["generate", "delta", "generate_response", "chat_reply"];

/// Envelope type reporting a server-side failure.
pub const ERROR_TYPE: &str = "error";

/// One decoded wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, alias = "data")]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Fields this crate does not interpret (e.g. `artifacts`, `sessions`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Turn id as a string, if the server sent one.
    pub fn turn_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn content_text(&self) -> Option<&str> {
        self.content.as_str()
    }
}

/// What a frame means to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Next piece of the current turn's text.
    Delta {
        turn_id: Option<String>,
        text: String,
    },
    /// The turn is finished, optionally with a last piece of text.
    Complete {
        turn_id: Option<String>,
        text: Option<String>,
    },
    /// Server-reported error, forwarded untouched.
    RemoteError(Envelope),
    /// Anything else (history, session lists, tool results).
    Control(Envelope),
}

/// Frame that is not a valid envelope.
#[derive(Debug)]
pub struct EnvelopeError {
    source: serde_json::Error,
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid envelope: {}", self.source)
    }
}

impl std::error::Error for EnvelopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Decode callback a channel hands each inbound frame to.
pub type Decoder = Arc<dyn Fn(&str) -> Result<InboundMessage, EnvelopeError> + Send + Sync>;

/// Classifies frames by their `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeDecoder {
    delta_types: Vec<String>,
}

impl EnvelopeDecoder {
    pub fn new<I, S>(delta_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            delta_types: delta_types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn decode(&self, frame: &str) -> Result<InboundMessage, EnvelopeError> {
        let envelope: Envelope =
            serde_json::from_str(frame).map_err(|source| EnvelopeError { source })?;
        Ok(self.classify(envelope))
    }

    pub fn classify(&self, envelope: Envelope) -> InboundMessage {
        if envelope.kind == ERROR_TYPE {
            return InboundMessage::RemoteError(envelope);
        }
        if envelope.complete == Some(true) {
            let text = envelope
                .content_text()
                .filter(|text| !text.is_empty())
                .map(str::to_string);
            return InboundMessage::Complete {
                turn_id: envelope.turn_id(),
                text,
            };
        }
        if self.delta_types.iter().any(|t| *t == envelope.kind)
            && let Some(text) = envelope.content_text()
        {
            return InboundMessage::Delta {
                turn_id: envelope.turn_id(),
                text: text.to_string(),
            };
        }
        InboundMessage::Control(envelope)
    }

    /// Wraps the decoder into a channel callback.
    pub fn into_decoder(self) -> Decoder {
        Arc::new(move |frame: &str| self.decode(frame))
    }
}

impl Default for EnvelopeDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_DELTA_TYPES.iter().copied())
    }
}

/// Decodes `frame` with the default delta types.
pub fn decode(frame: &str) -> Result<InboundMessage, EnvelopeError> {
    EnvelopeDecoder::default().decode(frame)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_sse_delta() {
        let message =
            decode(r#"{"type":"generate","content":"<thought>hi","action":"chat_message"}"#)
                .unwrap();
        assert_eq!(
            message,
            InboundMessage::Delta {
                turn_id: None,
                text: "<thought>hi".to_string()
            }
        );
    }

    #[test]
    fn test_decode_socket_data_alias() {
        let message = decode(r#"{"type":"generate_response","data":"chunk","id":7}"#).unwrap();
        assert_eq!(
            message,
            InboundMessage::Delta {
                turn_id: Some("7".to_string()),
                text: "chunk".to_string()
            }
        );
    }

    #[test]
    fn test_decode_complete_with_trailing_text() {
        let message = decode(r#"{"type":"generate","content":"</result>","complete":true}"#).unwrap();
        assert_eq!(
            message,
            InboundMessage::Complete {
                turn_id: None,
                text: Some("</result>".to_string())
            }
        );

        let message = decode(r#"{"type":"generate","content":"","complete":true}"#).unwrap();
        assert!(matches!(message, InboundMessage::Complete { text: None, .. }));
    }

    #[test]
    fn test_decode_error_wins_over_complete() {
        let message = decode(r#"{"type":"error","content":"boom","complete":true}"#).unwrap();
        let InboundMessage::RemoteError(envelope) = message else {
            panic!("expected remote error");
        };
        assert_eq!(envelope.content, json!("boom"));
    }

    #[test]
    fn test_decode_non_text_content_is_control() {
        let message = decode(
            r#"{"type":"generate","content":{"type":"tool_calls_result","result":[]},"artifacts":[]}"#,
        )
        .unwrap();
        let InboundMessage::Control(envelope) = message else {
            panic!("expected control");
        };
        assert_eq!(envelope.extra.get("artifacts"), Some(&json!([])));
    }

    #[test]
    fn test_decode_unknown_type_is_control() {
        let message = decode(r#"{"type":"sessions","content":[]}"#).unwrap();
        assert!(matches!(message, InboundMessage::Control(e) if e.kind == "sessions"));
    }

    #[test]
    fn test_decode_rejects_invalid_frames() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"content":"no type"}"#).is_err());
        assert!(decode("[1,2]").is_err());
    }

    #[test]
    fn test_custom_delta_types() {
        let decoder = EnvelopeDecoder::new(["token"]);
        let message = decoder.decode(r#"{"type":"token","content":"a"}"#).unwrap();
        assert!(matches!(message, InboundMessage::Delta { .. }));
        let message = decoder.decode(r#"{"type":"generate","content":"a"}"#).unwrap();
        assert!(matches!(message, InboundMessage::Control(_)));
    }
}
