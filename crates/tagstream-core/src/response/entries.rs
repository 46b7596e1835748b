//! Typed records read out of collection items.
//!
//! Tool arguments come from the opaque `<arguments>` payload in one of two
//! shapes:
//! ```text
//! <arguments>{"query": "rust", "limit": 5}</arguments>
//! <arguments><query>rust</query><limit>5</limit></arguments>
//! ```

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::parser::TagNode;

/// One `<artifact>` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    pub identifier: Option<String>,
    /// From the `<type>` child.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub language: Option<String>,
    pub title: Option<String>,
    /// Raw payload, byte for byte as received.
    pub content: Option<String>,
    pub complete: bool,
}

impl ArtifactEntry {
    pub fn from_node(node: &TagNode) -> Self {
        let text = |name: &str| node.child_text(name).map(str::to_string);
        Self {
            identifier: text("identifier"),
            kind: text("type"),
            language: text("language"),
            title: text("title"),
            content: text("content"),
            complete: node.complete,
        }
    }

    /// Content without the blank lines that usually pad the tags.
    pub fn trimmed_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(|c| c.trim_start_matches(['\n', '\r']).trim_end())
    }
}

/// One `<tool>` entry under `<tool_calls>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolCallEntry {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub complete: bool,
}

impl ToolCallEntry {
    pub fn from_node(node: &TagNode) -> Self {
        Self {
            name: node.child_text("name").unwrap_or_default().to_string(),
            arguments: node
                .child_text("arguments")
                .map(parse_arguments)
                .unwrap_or_default(),
            complete: node.complete,
        }
    }
}

/// One `<tool>` entry under `<tool_call_results>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolResultEntry {
    pub name: String,
    pub result: Option<String>,
    pub complete: bool,
}

impl ToolResultEntry {
    pub fn from_node(node: &TagNode) -> Self {
        Self {
            name: node.child_text("name").unwrap_or_default().to_string(),
            result: node.child_text("result").map(str::to_string),
            complete: node.complete,
        }
    }
}

/// Reads tool arguments: a JSON object as-is, otherwise `<key>value</key>`
/// pairs. Values that parse as JSON keep their type; the rest are strings.
/// A pair without its closing tag yet is skipped.
pub fn parse_arguments(raw: &str) -> Map<String, Value> {
    let raw = raw.trim();
    if raw.starts_with('{')
        && let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw)
    {
        return map;
    }

    let mut arguments = Map::new();
    let mut rest = raw;
    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let Some(name_end) = after.find('>') else {
            break;
        };
        let key = after[..name_end].trim();
        if key.is_empty() || !key.bytes().all(is_key_byte) {
            rest = after;
            continue;
        }

        let body = &after[name_end + 1..];
        let close = format!("</{key}>");
        let Some(value_end) = body.find(&close) else {
            break;
        };
        let value = body[..value_end].trim();
        let value: Value = serde_json::from_str(value).unwrap_or_else(|_| json!(value));
        arguments.insert(key.to_string(), value);
        rest = &body[value_end + close.len()..];
    }
    arguments
}

fn is_key_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || byte == b'.'
}
