//! Typed view of one parsed agent response.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::entries::{ArtifactEntry, ToolCallEntry, ToolResultEntry};
use crate::parser::tree::GroupedChildren;
use crate::parser::{self, Document, TagNode, TagValue, TagVocabulary};

/// Key the untagged text is serialized under.
const UNTAGGED_KEY: &str = "untagged";

/// Value stored under one top-level key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseValue {
    Leaf { text: String, complete: bool },
    Nested { children: Vec<TagNode>, complete: bool },
    Sequence { items: Vec<TagNode>, complete: bool },
}

impl ResponseValue {
    fn from_node(node: TagNode) -> Self {
        match node.value {
            TagValue::Text(text) => Self::Leaf {
                text,
                complete: node.complete,
            },
            TagValue::Children(children) => Self::Nested {
                children,
                complete: node.complete,
            },
        }
    }

    fn into_node(self, name: &str) -> TagNode {
        match self {
            Self::Leaf { text, complete } => TagNode {
                name: name.to_string(),
                value: TagValue::Text(text),
                complete,
            },
            Self::Nested { children, complete } => TagNode {
                name: name.to_string(),
                value: TagValue::Children(children),
                complete,
            },
            Self::Sequence { items, complete } => TagNode {
                name: name.to_string(),
                value: TagValue::Children(items),
                complete,
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Self::Leaf { complete, .. }
            | Self::Nested { complete, .. }
            | Self::Sequence { complete, .. } => *complete,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Leaf { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Items of a sequence; empty for other variants.
    pub fn items(&self) -> &[TagNode] {
        match self {
            Self::Sequence { items, .. } => items,
            _ => &[],
        }
    }

    /// Children of a nested value; empty for other variants.
    pub fn children(&self) -> &[TagNode] {
        match self {
            Self::Nested { children, .. } => children,
            _ => &[],
        }
    }
}

impl Serialize for ResponseValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf { text, .. } => serializer.serialize_str(text),
            Self::Nested { children, .. } => GroupedChildren(children).serialize(serializer),
            Self::Sequence { items, .. } => items.serialize(serializer),
        }
    }
}

/// Ordered mapping from top-level tag name to its value.
///
/// Keys keep first-appearance order. Envelope tags are flattened away,
/// collection tags are always sequences and a repeated plain tag turns into a
/// sequence of every occurrence. Text written outside every tag is kept
/// apart as [`UntaggedText`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    entries: Vec<(String, ResponseValue)>,
    untagged: Vec<UntaggedText>,
}

/// A run of text outside every tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntaggedText {
    pub text: String,
    /// Index of the entry this text precedes; equal to the entry count when
    /// it trails them all.
    pub entry: usize,
}

impl ParsedResponse {
    /// Parses `text` and folds the nodes into a response.
    pub fn parse(text: &str, vocabulary: &TagVocabulary) -> Self {
        Self::from_document(parser::parse_document(text, vocabulary), vocabulary)
    }

    pub fn from_document(document: Document, vocabulary: &TagVocabulary) -> Self {
        let mut parsed = Self::default();
        let mut loose = document.loose.into_iter().peekable();
        for (index, node) in document.nodes.into_iter().enumerate() {
            while let Some(text) = loose.next_if(|t| t.after_nodes <= index) {
                parsed.push_untagged(text.text);
            }
            parsed.absorb(node, vocabulary);
        }
        for text in loose {
            parsed.push_untagged(text.text);
        }
        parsed
    }

    fn absorb(&mut self, node: TagNode, vocabulary: &TagVocabulary) {
        if vocabulary.is_envelope(&node.name) {
            if node.is_leaf() {
                // An envelope with nothing inside yet stays invisible.
                if node.text().is_some_and(|text| !text.trim().is_empty()) {
                    self.insert_plain(node);
                }
            } else if let TagValue::Children(children) = node.value {
                for child in children {
                    self.absorb(child, vocabulary);
                }
            }
            return;
        }

        if let Some(item) = vocabulary.collection_item(&node.name) {
            let items: Vec<TagNode> = match node.value {
                TagValue::Children(children) => {
                    children.into_iter().filter(|c| c.name == item).collect()
                }
                TagValue::Text(_) => Vec::new(),
            };
            match self.position(&node.name) {
                Some(index) => {
                    if let ResponseValue::Sequence {
                        items: existing,
                        complete,
                    } = &mut self.entries[index].1
                    {
                        existing.extend(items);
                        *complete = *complete && node.complete;
                    }
                }
                None => self.entries.push((
                    node.name,
                    ResponseValue::Sequence {
                        items,
                        complete: node.complete,
                    },
                )),
            }
            return;
        }

        self.insert_plain(node);
    }

    fn insert_plain(&mut self, node: TagNode) {
        let Some(index) = self.position(&node.name) else {
            let name = node.name.clone();
            self.entries.push((name, ResponseValue::from_node(node)));
            return;
        };

        let slot = &mut self.entries[index];
        let previous = std::mem::replace(
            &mut slot.1,
            ResponseValue::Leaf {
                text: String::new(),
                complete: false,
            },
        );
        slot.1 = match previous {
            ResponseValue::Sequence {
                mut items,
                complete,
            } => {
                let complete = complete && node.complete;
                items.push(node);
                ResponseValue::Sequence { items, complete }
            }
            single => {
                let first = single.into_node(&slot.0);
                let complete = first.complete && node.complete;
                ResponseValue::Sequence {
                    items: vec![first, node],
                    complete,
                }
            }
        };
    }

    fn push_untagged(&mut self, text: String) {
        self.untagged.push(UntaggedText {
            text,
            entry: self.entries.len(),
        });
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&ResponseValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Leaf text under `key`.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ResponseValue::text)
    }

    /// True when every key present has seen its closing tag.
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.is_complete())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResponseValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was parsed, tagged or not.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.untagged.is_empty()
    }

    pub fn untagged(&self) -> &[UntaggedText] {
        &self.untagged
    }

    /// Every untagged run, joined by newlines.
    pub fn untagged_text(&self) -> Option<String> {
        if self.untagged.is_empty() {
            return None;
        }
        let runs: Vec<&str> = self.untagged.iter().map(|t| t.text.as_str()).collect();
        Some(runs.join("\n"))
    }

    pub fn artifacts(&self) -> Vec<ArtifactEntry> {
        self.items("artifacts")
            .iter()
            .map(ArtifactEntry::from_node)
            .collect()
    }

    pub fn tool_calls(&self) -> Vec<ToolCallEntry> {
        self.items("tool_calls")
            .iter()
            .map(ToolCallEntry::from_node)
            .collect()
    }

    pub fn tool_results(&self) -> Vec<ToolResultEntry> {
        self.items("tool_call_results")
            .iter()
            .map(ToolResultEntry::from_node)
            .collect()
    }

    fn items(&self, key: &str) -> &[TagNode] {
        self.get(key).map_or(&[], ResponseValue::items)
    }
}

/// Untagged text goes under `"untagged"` at the position of its first run,
/// unless a tag already owns that key.
impl Serialize for ParsedResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let untagged = self
            .untagged_text()
            .filter(|_| self.position(UNTAGGED_KEY).is_none());
        let at = self.untagged.first().map_or(0, |t| t.entry);
        let len = self.entries.len() + usize::from(untagged.is_some());

        let mut map = serializer.serialize_map(Some(len))?;
        for (index, (key, value)) in self.entries.iter().enumerate() {
            if index == at
                && let Some(text) = &untagged
            {
                map.serialize_entry(UNTAGGED_KEY, text)?;
            }
            map.serialize_entry(key, value)?;
        }
        if at >= self.entries.len()
            && let Some(text) = &untagged
        {
            map.serialize_entry(UNTAGGED_KEY, text)?;
        }
        map.end()
    }
}
