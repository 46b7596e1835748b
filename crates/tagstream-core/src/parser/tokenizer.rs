//! Scanner that splits tagged text into open, close and text tokens.
//!
//! Only tokens whose name is in the vocabulary become tags:
//! ```text
//! <thought>if a <b then</thought>
//! ^open    ^text        ^close
//! ```
//! `<b` is not a known tag, so it stays inside the text token.

use super::vocabulary::TagVocabulary;

/// One lexical unit of tagged text. Offsets are byte positions into the
/// scanned source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `<name>`; `end` is the first byte after `>`.
    Open {
        name: String,
        start: usize,
        end: usize,
    },
    /// `</name>`; `start` is the position of `<`.
    Close {
        name: String,
        start: usize,
        end: usize,
    },
    /// Anything between tags.
    Text { start: usize, end: usize },
}

/// Splits `text` into tokens. Never fails: unrecognized markup is text.
pub fn tokenize(text: &str, vocabulary: &TagVocabulary) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('<') {
        let start = cursor + offset;
        match read_tag(text, start, vocabulary) {
            Some(tag) => {
                if start > text_start {
                    tokens.push(Token::Text {
                        start: text_start,
                        end: start,
                    });
                }
                cursor = tag.end;
                text_start = tag.end;
                tokens.push(if tag.closing {
                    Token::Close {
                        name: tag.name,
                        start,
                        end: tag.end,
                    }
                } else {
                    Token::Open {
                        name: tag.name,
                        start,
                        end: tag.end,
                    }
                });
            }
            None => cursor = start + 1,
        }
    }

    if text_start < text.len() {
        tokens.push(Token::Text {
            start: text_start,
            end: text.len(),
        });
    }
    tokens
}

struct RawTag {
    name: String,
    closing: bool,
    end: usize,
}

/// Reads a `<name>` or `</name>` token at `start`, if the name is known.
fn read_tag(text: &str, start: usize, vocabulary: &TagVocabulary) -> Option<RawTag> {
    let rest = &text[start + 1..];
    let (closing, rest) = match rest.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };

    let name_len = rest.bytes().take_while(|b| is_name_byte(*b)).count();
    if name_len == 0 {
        return None;
    }
    let name = rest[..name_len].to_ascii_lowercase();
    if !vocabulary.is_known(&name) {
        return None;
    }

    let after_name = &rest[name_len..];
    let padding = after_name.len() - after_name.trim_start().len();
    if !after_name[padding..].starts_with('>') {
        return None;
    }

    let end = start + 1 + usize::from(closing) + name_len + padding + 1;
    Some(RawTag { name, closing, end })
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

/// Returns how many trailing bytes of `text` could still grow into a known
/// tag token once more input arrives (e.g. `</tho` or a lone `<`).
///
/// With `only_close` set, only a closing token for `only_close` counts.
pub(crate) fn partial_tag_suffix(
    text: &str,
    vocabulary: &TagVocabulary,
    only_close: Option<&str>,
) -> usize {
    let Some(start) = text.rfind('<') else {
        return 0;
    };
    let fragment = &text[start + 1..];
    if fragment.contains('>') {
        return 0;
    }

    let (closing, stem) = match fragment.strip_prefix('/') {
        Some(stem) => (true, stem),
        None => (false, fragment),
    };
    let stem = stem.to_ascii_lowercase();
    let could_grow = match only_close {
        Some(name) => (closing || fragment.is_empty()) && name.starts_with(&stem),
        None => {
            let stem = stem.trim_end();
            let padded = stem.len() < fragment.len() - usize::from(closing);
            vocabulary
                .names()
                .any(|name| if padded { name == stem } else { name.starts_with(stem) })
        }
    };

    if could_grow { text.len() - start } else { 0 }
}
