use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::parsed::ParsedResponse;
use crate::parser::TagVocabulary;

/// Published state of the current turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub turn_id: String,
    pub parsed: ParsedResponse,
    /// Every delta of the turn, concatenated.
    pub raw: String,
    /// Set only by an explicit completion signal.
    pub complete: bool,
}

/// Owns the live structured response for one agent turn.
///
/// Every delta is appended to `raw` and the whole buffer is re-parsed, so
/// the result never depends on where chunk boundaries fell.
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    vocabulary: Arc<TagVocabulary>,
    turn_id: String,
    raw: String,
    parsed: ParsedResponse,
    complete: bool,
}

impl ResponseAssembler {
    pub fn new(vocabulary: Arc<TagVocabulary>) -> Self {
        Self {
            vocabulary,
            turn_id: new_turn_id(),
            raw: String::new(),
            parsed: ParsedResponse::default(),
            complete: false,
        }
    }

    /// Starts a new turn, using `id` when the server supplied one.
    pub fn begin_turn(&mut self, id: Option<String>) {
        self.turn_id = id.unwrap_or_else(new_turn_id);
        self.raw.clear();
        self.parsed = ParsedResponse::default();
        self.complete = false;
    }

    /// Starts a new turn with a generated id.
    pub fn reset(&mut self) {
        self.begin_turn(None);
    }

    /// Appends `text` to the turn and re-parses the buffer.
    pub fn apply_delta(&mut self, text: &str) -> SessionSnapshot {
        if !text.is_empty() {
            self.raw.push_str(text);
            self.parsed = ParsedResponse::parse(&self.raw, &self.vocabulary);
        }
        self.snapshot()
    }

    /// Flags the turn as finished. `raw` and `parsed` are left as they are.
    pub fn mark_complete(&mut self) -> SessionSnapshot {
        self.complete = true;
        self.snapshot()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            turn_id: self.turn_id.clone(),
            parsed: self.parsed.clone(),
            raw: self.raw.clone(),
            complete: self.complete,
        }
    }

    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new(Arc::new(TagVocabulary::default()))
    }
}

fn new_turn_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseValue;

    const FULL: &str = "<response>\n<observation>User asks for code</observation>\n<thought>Write it</thought>\n<type>final_answer</type>\n<artifacts><artifact><identifier>a</identifier><language>rust</language><content>\nlet x = a <b>> c;\n</content></artifact></artifacts>\n<result>Done</result>\n</response>";

    #[test]
    fn test_chunking_does_not_change_result() {
        let expected = ParsedResponse::parse(FULL, &TagVocabulary::default());
        for size in [1, 2, 3, 7, 16, 64] {
            let mut assembler = ResponseAssembler::default();
            let chars: Vec<char> = FULL.chars().collect();
            let mut last = SessionSnapshot::default();
            for chunk in chars.chunks(size) {
                last = assembler.apply_delta(&chunk.iter().collect::<String>());
            }
            assert_eq!(last.parsed, expected, "chunk size {size}");
            assert_eq!(last.raw, FULL);
        }
    }

    #[test]
    fn test_incomplete_leaf_grows_across_chunks() {
        let mut assembler = ResponseAssembler::default();
        let first = assembler.apply_delta("<thought>Step 1");
        assert_eq!(
            first.parsed.get("thought"),
            Some(&ResponseValue::Leaf {
                text: "Step 1".to_string(),
                complete: false
            })
        );

        let second = assembler.apply_delta(" continues</thought><type>x</type>");
        assert_eq!(second.parsed.text("thought"), Some("Step 1 continues"));
        assert_eq!(second.parsed.text("type"), Some("x"));
        assert!(second.parsed.is_complete());
        assert!(!second.complete);
    }

    #[test]
    fn test_partial_close_tag_is_never_visible() {
        let mut assembler = ResponseAssembler::default();
        let snapshot = assembler.apply_delta("<thought>Step 1</th");
        assert_eq!(snapshot.parsed.text("thought"), Some("Step 1"));
    }

    #[test]
    fn test_mark_complete_is_idempotent() {
        let mut assembler = ResponseAssembler::default();
        assembler.apply_delta("<result>ok</result>");
        let once = assembler.mark_complete();
        let twice = assembler.mark_complete();
        assert_eq!(once, twice);
        assert!(twice.complete);
        assert_eq!(twice.raw, "<result>ok</result>");
    }

    #[test]
    fn test_begin_turn_clears_state() {
        let mut assembler = ResponseAssembler::default();
        assembler.apply_delta("<result>old</result>");
        assembler.mark_complete();

        assembler.begin_turn(Some("turn-2".to_string()));
        let snapshot = assembler.snapshot();
        assert_eq!(snapshot.turn_id, "turn-2");
        assert!(snapshot.raw.is_empty());
        assert!(snapshot.parsed.is_empty());
        assert!(!snapshot.complete);
    }

    #[test]
    fn test_reset_generates_new_turn_id() {
        let mut assembler = ResponseAssembler::default();
        let before = assembler.turn_id().to_string();
        assembler.reset();
        assert_ne!(assembler.turn_id(), before);
        assert!(Uuid::parse_str(assembler.turn_id()).is_ok());
    }

    #[test]
    fn test_untagged_reply_is_not_dropped() {
        let mut assembler = ResponseAssembler::default();
        let partial = assembler.apply_delta("Hello there <tho");
        assert_eq!(partial.parsed.untagged_text().as_deref(), Some("Hello there"));

        let done = assembler.apply_delta("ught>hmm</thought> Bye.");
        assert_eq!(done.parsed.untagged_text().as_deref(), Some("Hello there\nBye."));
        assert_eq!(done.parsed.text("thought"), Some("hmm"));
        assert!(!done.parsed.is_empty());
    }

    #[test]
    fn test_empty_delta_keeps_snapshot() {
        let mut assembler = ResponseAssembler::default();
        let before = assembler.apply_delta("<thought>a");
        let after = assembler.apply_delta("");
        assert_eq!(before, after);
        assert_eq!(
            after.parsed.get("thought").map(ResponseValue::is_complete),
            Some(false)
        );
    }
}
