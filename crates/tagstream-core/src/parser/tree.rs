//! Recursive-descent builder turning tokens into a `TagNode` tree.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::tokenizer::{Token, partial_tag_suffix};
use super::vocabulary::TagVocabulary;

/// One parsed tag occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNode {
    /// Lower-cased tag name.
    pub name: String,
    pub value: TagValue,
    /// False while the closing tag has not been seen.
    pub complete: bool,
}

/// Payload of a tag: nested tags or leaf text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Text(String),
    Children(Vec<TagNode>),
}

impl TagNode {
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: TagValue::Text(text.into()),
            complete: true,
        }
    }

    pub fn branch(name: impl Into<String>, children: Vec<TagNode>) -> Self {
        Self {
            name: name.into(),
            value: TagValue::Children(children),
            complete: true,
        }
    }

    /// Marks the node as still waiting for its closing tag.
    #[must_use]
    pub fn incomplete(mut self) -> Self {
        self.complete = false;
        self
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.value, TagValue::Text(_))
    }

    /// Leaf text, if this node is a leaf.
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            TagValue::Text(text) => Some(text),
            TagValue::Children(_) => None,
        }
    }

    /// Child nodes; empty for leaves.
    pub fn children(&self) -> &[TagNode] {
        match &self.value {
            TagValue::Text(_) => &[],
            TagValue::Children(children) => children,
        }
    }

    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&TagNode> {
        self.children().iter().find(|c| c.name == name)
    }

    /// Text of the first leaf child named `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(TagNode::text)
    }
}

/// Serializes as the node's value: a string for leaves, an object for
/// branches. Repeated child names become arrays in document order.
impl Serialize for TagNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.value {
            TagValue::Text(text) => serializer.serialize_str(text),
            TagValue::Children(children) => GroupedChildren(children).serialize(serializer),
        }
    }
}

pub(crate) struct GroupedChildren<'a>(pub(crate) &'a [TagNode]);

impl Serialize for GroupedChildren<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut names: Vec<&str> = Vec::new();
        for child in self.0 {
            if !names.contains(&child.name.as_str()) {
                names.push(&child.name);
            }
        }

        let mut map = serializer.serialize_map(Some(names.len()))?;
        for name in names {
            let group: Vec<&TagNode> = self.0.iter().filter(|c| c.name == name).collect();
            if let [single] = group.as_slice() {
                map.serialize_entry(name, single)?;
            } else {
                map.serialize_entry(name, &group)?;
            }
        }
        map.end()
    }
}

/// Text that sits outside every tag, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LooseText {
    pub text: String,
    /// Number of top-level nodes that precede this text.
    pub after_nodes: usize,
}

/// Top-level nodes plus the loose text around them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub nodes: Vec<TagNode>,
    pub loose: Vec<LooseText>,
}

struct Frame {
    name: String,
    content_start: usize,
    children: Vec<TagNode>,
}

impl Frame {
    fn finish(
        self,
        source: &str,
        content_end: usize,
        complete: bool,
        vocabulary: &TagVocabulary,
    ) -> TagNode {
        let value = if self.children.is_empty() {
            let opaque = vocabulary.is_opaque(&self.name);
            let mut raw = &source[self.content_start..content_end];
            if !complete && content_end == source.len() {
                let only_close = opaque.then_some(self.name.as_str());
                let held = partial_tag_suffix(raw, vocabulary, only_close);
                raw = &raw[..raw.len() - held];
            }
            TagValue::Text(if opaque { raw } else { raw.trim() }.to_string())
        } else {
            // Free text between child tags is not kept.
            TagValue::Children(self.children)
        };
        TagNode {
            name: self.name,
            value,
            complete,
        }
    }
}

/// Builds the node tree for `source` from its token stream.
///
/// Nesting is tracked with an explicit stack of open tags. Whatever is still
/// on the stack at end of input is unterminated and comes out with
/// `complete == false`. Text outside every tag is collected separately, and a
/// trailing fragment that could still become a tag is held back.
pub fn build(source: &str, tokens: Vec<Token>, vocabulary: &TagVocabulary) -> Document {
    let mut roots = Vec::new();
    let mut loose = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        match token {
            Token::Text { start, end } => {
                if !stack.is_empty() {
                    continue;
                }
                let mut raw = &source[start..end];
                if end == source.len() {
                    let held = partial_tag_suffix(raw, vocabulary, None);
                    raw = &raw[..raw.len() - held];
                }
                let text = raw.trim();
                if !text.is_empty() {
                    loose.push(LooseText {
                        text: text.to_string(),
                        after_nodes: roots.len(),
                    });
                }
            }
            Token::Open { name, end, .. } => {
                if stack.last().is_some_and(|f| vocabulary.is_opaque(&f.name)) {
                    continue;
                }
                stack.push(Frame {
                    name,
                    content_start: end,
                    children: Vec::new(),
                });
            }
            Token::Close { name, start, .. } => {
                if let Some(top) = stack.last()
                    && vocabulary.is_opaque(&top.name)
                    && top.name != name
                {
                    continue;
                }
                let Some(depth) = stack.iter().rposition(|f| f.name == name) else {
                    // Stray close tag.
                    continue;
                };
                // Children still open when their parent closes end there.
                while stack.len() > depth + 1 {
                    if let Some(frame) = stack.pop() {
                        let node = frame.finish(source, start, false, vocabulary);
                        attach(&mut stack, &mut roots, node);
                    }
                }
                if let Some(frame) = stack.pop() {
                    let node = frame.finish(source, start, true, vocabulary);
                    attach(&mut stack, &mut roots, node);
                }
            }
        }
    }

    while let Some(frame) = stack.pop() {
        let node = frame.finish(source, source.len(), false, vocabulary);
        attach(&mut stack, &mut roots, node);
    }
    Document { nodes: roots, loose }
}

fn attach(stack: &mut [Frame], roots: &mut Vec<TagNode>, node: TagNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}
