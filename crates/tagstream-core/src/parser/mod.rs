//! Tolerant parser for the agent's pseudo-XML response dialect.
//!
//! The input is LLM output: tags may be unterminated, misnested or cut in
//! half by a chunk boundary, and content may legally contain `<`. Parsing is
//! total and never fails; see [`parse`].

pub mod tokenizer;
pub mod tree;
pub mod vocabulary;

pub use tree::{Document, LooseText, TagNode, TagValue};
pub use vocabulary::TagVocabulary;

/// Parses `text` into top-level nodes in document order.
///
/// Only names in `vocabulary` are structural. Unterminated tags yield nodes
/// with `complete == false` holding the content received so far.
pub fn parse(text: &str, vocabulary: &TagVocabulary) -> Vec<TagNode> {
    parse_document(text, vocabulary).nodes
}

/// Like [`parse`], but also keeps the text found outside every tag.
pub fn parse_document(text: &str, vocabulary: &TagVocabulary) -> Document {
    let tokens = tokenizer::tokenize(text, vocabulary);
    tree::build(text, tokens, vocabulary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(text: &str) -> Vec<TagNode> {
        parse(text, &TagVocabulary::default())
    }

    #[test]
    fn test_parse_flat_leaves() {
        let nodes = parse_default("<type>final_answer</type><result>\n  Hello  \n</result>");
        assert_eq!(
            nodes,
            vec![
                TagNode::leaf("type", "final_answer"),
                TagNode::leaf("result", "Hello"),
            ]
        );
    }

    #[test]
    fn test_parse_nested_tree() {
        let nodes = parse_default(
            "<tool_calls>\n<tool><name>search</name><arguments><query>rust</query></arguments></tool>\n</tool_calls>",
        );
        assert_eq!(nodes.len(), 1);
        let tool = &nodes[0].children()[0];
        assert_eq!(tool.name, "tool");
        assert_eq!(tool.child_text("name"), Some("search"));
        // `arguments` is opaque, so its inner tags stay as text.
        assert_eq!(tool.child_text("arguments"), Some("<query>rust</query>"));
    }

    #[test]
    fn test_parse_unterminated_tag_is_incomplete() {
        let nodes = parse_default("<thought>Step 1");
        assert_eq!(nodes, vec![TagNode::leaf("thought", "Step 1").incomplete()]);
    }

    #[test]
    fn test_parse_holds_back_partial_close_tag() {
        let nodes = parse_default("<thought>Step 1</tho");
        assert_eq!(nodes, vec![TagNode::leaf("thought", "Step 1").incomplete()]);

        let nodes = parse_default("<thought>a < b");
        assert_eq!(nodes[0].text(), Some("a < b"));
    }

    #[test]
    fn test_parse_unknown_markup_is_text() {
        let nodes = parse_default("<thought>use <div> here</thought>");
        assert_eq!(nodes, vec![TagNode::leaf("thought", "use <div> here")]);
    }

    #[test]
    fn test_parse_opaque_content_is_verbatim() {
        let source = "<artifact><content>\nfn f() { a <b> c; }\n<type>x</type>\n</content></artifact>";
        let nodes = parse_default(source);
        let content = nodes[0].child_text("content");
        assert_eq!(content, Some("\nfn f() { a <b> c; }\n<type>x</type>\n"));
        assert!(nodes[0].children()[0].complete);
    }

    #[test]
    fn test_parse_empty_leaf_is_kept() {
        let nodes = parse_default("<observation></observation>");
        assert_eq!(nodes, vec![TagNode::leaf("observation", "")]);
    }

    #[test]
    fn test_parse_stray_close_is_ignored() {
        let nodes = parse_default("</thought><type>x</type>");
        assert_eq!(nodes, vec![TagNode::leaf("type", "x")]);
    }

    #[test]
    fn test_parse_parent_close_ends_open_child() {
        let nodes = parse_default("<artifacts><artifact><title>Demo</artifacts>");
        let artifacts = &nodes[0];
        assert!(artifacts.complete);
        let artifact = &artifacts.children()[0];
        assert!(!artifact.complete);
        let title = &artifact.children()[0];
        assert_eq!(title, &TagNode::leaf("title", "Demo").incomplete());
    }

    #[test]
    fn test_parse_keeps_duplicate_siblings() {
        let nodes = parse_default("<thought>a</thought> <thought>b</thought>");
        assert_eq!(
            nodes,
            vec![TagNode::leaf("thought", "a"), TagNode::leaf("thought", "b")]
        );
    }

    #[test]
    fn test_parse_ignores_text_outside_tags() {
        let nodes = parse_default("Sure!\n<type>x</type>\nbye");
        assert_eq!(nodes, vec![TagNode::leaf("type", "x")]);
    }

    #[test]
    fn test_parse_document_keeps_loose_text() {
        let doc = parse_document("Sure!\n<type>x</type>\n  bye  ", &TagVocabulary::default());
        assert_eq!(doc.nodes, vec![TagNode::leaf("type", "x")]);
        assert_eq!(
            doc.loose,
            vec![
                LooseText {
                    text: "Sure!".to_string(),
                    after_nodes: 0
                },
                LooseText {
                    text: "bye".to_string(),
                    after_nodes: 1
                },
            ]
        );
    }

    #[test]
    fn test_parse_document_plain_text_has_no_nodes() {
        let doc = parse_document("just words", &TagVocabulary::default());
        assert!(doc.nodes.is_empty());
        assert_eq!(doc.loose[0].text, "just words");
    }

    #[test]
    fn test_parse_document_holds_back_partial_open_tag() {
        let doc = parse_document("Hello <tho", &TagVocabulary::default());
        assert_eq!(doc.loose[0].text, "Hello");

        let doc = parse_document("a < b", &TagVocabulary::default());
        assert_eq!(doc.loose[0].text, "a < b");
    }

    #[test]
    fn test_parse_document_skips_whitespace_between_tags() {
        let doc = parse_document("<type>x</type>\n\n<result>y</result>", &TagVocabulary::default());
        assert!(doc.loose.is_empty());
    }

    #[test]
    fn test_tag_node_serializes_as_plain_value() {
        let node = TagNode::branch(
            "artifact",
            vec![
                TagNode::leaf("title", "Demo"),
                TagNode::leaf("language", "rust"),
                TagNode::leaf("language", "toml"),
            ],
        );
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"title": "Demo", "language": ["rust", "toml"]})
        );
    }
}
