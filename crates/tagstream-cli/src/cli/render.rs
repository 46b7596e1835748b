//! Plain-text rendering of responses and session notices.

use std::fmt::Write;

use tagstream_core::{ParsedResponse, ResponseValue, SessionNotice, TagNode};

const INDENT: &str = "  ";
const PARTIAL: &str = " (incomplete)";

/// Renders every key in arrival order.
///
/// Artifacts, tool calls and tool results use their typed view; everything
/// else is printed as the tag tree it came from. Untagged text is printed
/// as-is where it appeared.
pub fn response(parsed: &ParsedResponse) -> String {
    let mut out = String::new();
    let mut untagged = parsed.untagged().iter().peekable();
    for (index, (key, value)) in parsed.iter().enumerate() {
        while let Some(run) = untagged.next_if(|run| run.entry <= index) {
            let _ = writeln!(out, "{}", run.text);
        }
        match key {
            "artifacts" => artifacts(&mut out, parsed, value),
            "tool_calls" => tool_calls(&mut out, parsed, value),
            "tool_call_results" => tool_results(&mut out, parsed, value),
            _ => entry(&mut out, key, value),
        }
    }
    for run in untagged {
        let _ = writeln!(out, "{}", run.text);
    }
    out
}

fn entry(out: &mut String, key: &str, value: &ResponseValue) {
    let marker = partial(value.is_complete());
    match value {
        ResponseValue::Leaf { text, .. } => leaf(out, 0, key, text, marker),
        ResponseValue::Nested { children, .. } => {
            let _ = writeln!(out, "{key}:{marker}");
            for child in children {
                node(out, 1, child);
            }
        }
        ResponseValue::Sequence { items, .. } => {
            let _ = writeln!(out, "{key}:{marker}");
            for item in items {
                node(out, 1, item);
            }
        }
    }
}

fn node(out: &mut String, depth: usize, tag: &TagNode) {
    let marker = partial(tag.complete);
    if let Some(text) = tag.text() {
        leaf(out, depth, &tag.name, text, marker);
        return;
    }
    let _ = writeln!(out, "{}{}:{marker}", INDENT.repeat(depth), tag.name);
    for child in tag.children() {
        node(out, depth + 1, child);
    }
}

fn leaf(out: &mut String, depth: usize, key: &str, text: &str, marker: &str) {
    let pad = INDENT.repeat(depth);
    if text.contains('\n') {
        let _ = writeln!(out, "{pad}{key}:{marker}");
        for line in text.lines() {
            let _ = writeln!(out, "{pad}{INDENT}{line}");
        }
    } else {
        let _ = writeln!(out, "{pad}{key}: {text}{marker}");
    }
}

fn artifacts(out: &mut String, parsed: &ParsedResponse, value: &ResponseValue) {
    let _ = writeln!(out, "artifacts:{}", partial(value.is_complete()));
    for (index, artifact) in parsed.artifacts().iter().enumerate() {
        let label = artifact
            .title
            .as_deref()
            .or(artifact.identifier.as_deref())
            .unwrap_or("untitled");
        let detail: Vec<&str> = [artifact.kind.as_deref(), artifact.language.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        let detail = if detail.is_empty() {
            String::new()
        } else {
            format!(" ({})", detail.join(", "))
        };
        let _ = writeln!(out, "{INDENT}[{}] {label}{detail}{}", index + 1, partial(artifact.complete));
        if let Some(content) = artifact.trimmed_content() {
            for line in content.lines() {
                let _ = writeln!(out, "{INDENT}{INDENT}{line}");
            }
        }
    }
}

fn tool_calls(out: &mut String, parsed: &ParsedResponse, value: &ResponseValue) {
    let _ = writeln!(out, "tool_calls:{}", partial(value.is_complete()));
    for (index, call) in parsed.tool_calls().iter().enumerate() {
        let arguments = serde_json::Value::Object(call.arguments.clone());
        let _ = writeln!(
            out,
            "{INDENT}[{}] {} {arguments}{}",
            index + 1,
            call.name,
            partial(call.complete)
        );
    }
}

fn tool_results(out: &mut String, parsed: &ParsedResponse, value: &ResponseValue) {
    let _ = writeln!(out, "tool_call_results:{}", partial(value.is_complete()));
    for (index, result) in parsed.tool_results().iter().enumerate() {
        let marker = partial(result.complete);
        let label = format!("[{}] {}", index + 1, result.name);
        match result.result.as_deref() {
            Some(text) => leaf(out, 1, &label, text, marker),
            None => {
                let _ = writeln!(out, "{INDENT}{label}{marker}");
            }
        }
    }
}

fn partial(complete: bool) -> &'static str {
    if complete { "" } else { PARTIAL }
}

/// One stderr line per notice worth showing.
pub fn notice(notice: &SessionNotice) -> Option<String> {
    match notice {
        SessionNotice::RemoteError(envelope) => Some(match envelope.content_text() {
            Some(text) => format!("remote error: {text}"),
            None => format!("remote error: {}", envelope.content),
        }),
        SessionNotice::Control(_) => None,
        SessionNotice::ChannelError(err) => Some(match &err.details {
            Some(details) => format!("{err} ({details})"),
            None => err.to_string(),
        }),
        SessionNotice::ChannelClosed(channel) => Some(format!("{channel} channel closed")),
        SessionNotice::ReconnectScheduled {
            channel,
            attempt,
            delay,
        } => Some(format!(
            "{channel} channel: reconnect attempt {attempt} in {}ms",
            delay.as_millis()
        )),
        SessionNotice::ReconnectExhausted { channel, attempts } => Some(format!(
            "{channel} channel: giving up after {attempts} reconnect attempts"
        )),
    }
}
