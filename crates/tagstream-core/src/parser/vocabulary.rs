//! The fixed tag vocabulary the parser recognizes.

use std::collections::{BTreeMap, BTreeSet};

/// Envelope tag wrapping a whole agent response.
pub const RESPONSE_TAG: &str = "response";

/// Top-level tags of the agent response format.
pub const TOP_LEVEL_TAGS: &[&str] = &[
    "observation",
    "mindspace",
    "thought",
    "reflection",
    "type",
    "result",
    "tool_calls",
    "artifacts",
    "tool_call_results",
];

/// Tags that only appear nested inside a collection entry.
pub const NESTED_TAGS: &[&str] = &[
    "tool",
    "name",
    "arguments",
    "artifact",
    "language",
    "identifier",
    "title",
    "content",
];

/// Tags whose payload is kept verbatim and never scanned for child tags.
pub const OPAQUE_TAGS: &[&str] = &["content", "arguments"];

/// Collection tags and the entry tag each one holds.
pub const COLLECTION_TAGS: &[(&str, &str)] = &[
    ("artifacts", "artifact"),
    ("tool_calls", "tool"),
    ("tool_call_results", "tool"),
];

/// Set of tag names the parser treats as structure.
///
/// Every name is stored lower-cased. Anything shaped like `<...>` whose name
/// is not in the vocabulary is plain text, so inline code such as `a <b> c`
/// survives untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagVocabulary {
    known: BTreeSet<String>,
    opaque: BTreeSet<String>,
    envelopes: BTreeSet<String>,
    collections: BTreeMap<String, String>,
}

impl TagVocabulary {
    /// Creates a vocabulary that knows `names` and nothing else.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            known: names.into_iter().map(|n| normalize(n.as_ref())).collect(),
            opaque: BTreeSet::new(),
            envelopes: BTreeSet::new(),
            collections: BTreeMap::new(),
        }
    }

    /// Marks `name` as an opaque payload (also makes it known).
    #[must_use]
    pub fn with_opaque(mut self, name: &str) -> Self {
        let name = normalize(name);
        self.known.insert(name.clone());
        self.opaque.insert(name);
        self
    }

    /// Marks `name` as a transparent envelope whose children are lifted to
    /// the top level of a `ParsedResponse`.
    #[must_use]
    pub fn with_envelope(mut self, name: &str) -> Self {
        let name = normalize(name);
        self.known.insert(name.clone());
        self.envelopes.insert(name);
        self
    }

    /// Declares `name` as a collection of `item` entries.
    #[must_use]
    pub fn with_collection(mut self, name: &str, item: &str) -> Self {
        let (name, item) = (normalize(name), normalize(item));
        self.known.insert(name.clone());
        self.known.insert(item.clone());
        self.collections.insert(name, item);
        self
    }

    /// Returns true if `name` (already lower-cased) is structural.
    pub fn is_known(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    pub fn is_opaque(&self, name: &str) -> bool {
        self.opaque.contains(name)
    }

    pub fn is_envelope(&self, name: &str) -> bool {
        self.envelopes.contains(name)
    }

    /// Returns the entry tag for a collection tag.
    pub fn collection_item(&self, name: &str) -> Option<&str> {
        self.collections.get(name).map(String::as_str)
    }

    /// Iterates over every known tag name.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }
}

impl Default for TagVocabulary {
    /// The agent response format: `<response>` envelope, reasoning tags,
    /// tool calls, tool results and artifacts.
    fn default() -> Self {
        let mut vocabulary = Self::new(TOP_LEVEL_TAGS.iter().chain(NESTED_TAGS))
            .with_envelope(RESPONSE_TAG);
        for name in OPAQUE_TAGS {
            vocabulary = vocabulary.with_opaque(name);
        }
        for (name, item) in COLLECTION_TAGS {
            vocabulary = vocabulary.with_collection(name, item);
        }
        vocabulary
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_vocabulary_covers_agent_format() {
        let vocabulary = TagVocabulary::default();
        for name in ["response", "thought", "tool_calls", "artifact", "content"] {
            assert!(vocabulary.is_known(name), "{name} should be known");
        }
        assert!(vocabulary.is_opaque("content"));
        assert!(vocabulary.is_opaque("arguments"));
        assert!(!vocabulary.is_opaque("thought"));
        assert!(vocabulary.is_envelope("response"));
        assert_eq!(vocabulary.collection_item("artifacts"), Some("artifact"));
        assert_eq!(vocabulary.collection_item("tool_calls"), Some("tool"));
        assert_eq!(vocabulary.collection_item("thought"), None);
    }

    #[test]
    fn test_names_are_normalized() {
        let vocabulary = TagVocabulary::new([" Thought "]).with_opaque("CODE");
        assert!(vocabulary.is_known("thought"));
        assert!(vocabulary.is_known("code"));
        assert!(vocabulary.is_opaque("code"));
        assert!(!vocabulary.is_known("Thought"));
    }
}
