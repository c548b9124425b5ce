//! Normalisation of raw completion text into the answer shown to users.

use serde_json::Value;

use crate::extract_json_output;

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// Remove every `<think>…</think>` block (non-greedy, spanning lines,
/// case-sensitive) and trim the remainder.  An opening tag with no closing
/// tag after it is left untouched.
pub fn strip_thinking(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        let Some(open) = rest.find(THINK_OPEN) else {
            out.push_str(rest);
            break;
        };
        let after_open = &rest[open + THINK_OPEN.len()..];
        let Some(close) = after_open.find(THINK_CLOSE) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..open]);
        rest = &after_open[close + THINK_CLOSE.len()..];
    }

    out.trim().to_string()
}

/// What a synthesis model handed back.  Some models answer in prose, others
/// wrap the answer in a JSON object; both collapse to text at the
/// synthesizer boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    PlainText(String),
    Structured { answer: String, metadata: Value },
}

impl ModelReply {
    /// Classify raw completion text.  Only replies that *are* JSON (a bare
    /// object or a leading ```json fence) count as structured, so prose that
    /// merely mentions braces stays plain text.
    pub fn from_raw(raw: &str) -> Self {
        let visible = strip_thinking(raw);
        let looks_structured = visible.starts_with('{') || visible.starts_with("```json");
        if looks_structured {
            if let Some(Value::Object(mut fields)) = extract_json_output::<Value>(&visible) {
                if let Some(Value::String(answer)) = fields.remove("answer") {
                    return ModelReply::Structured {
                        answer,
                        metadata: Value::Object(fields),
                    };
                }
            }
        }
        ModelReply::PlainText(raw.to_string())
    }

    fn text(&self) -> &str {
        match self {
            ModelReply::PlainText(text) => text,
            ModelReply::Structured { answer, .. } => answer,
        }
    }

    /// Final user-facing text with reasoning blocks removed.
    pub fn into_clean_text(self) -> String {
        strip_thinking(self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_think_block() {
        assert_eq!(
            strip_thinking("<think>internal notes</think>The answer is 42."),
            "The answer is 42."
        );
    }

    #[test]
    fn untagged_text_is_only_trimmed() {
        assert_eq!(strip_thinking("  plain answer \n"), "plain answer");
    }

    #[test]
    fn multiline_and_repeated_blocks() {
        let raw = "<think>line one\nline two</think>\nFirst.\n<think>more</think> Second.";
        assert_eq!(strip_thinking(raw), "First.\n Second.");
    }

    #[test]
    fn non_greedy_match_keeps_text_between_blocks() {
        let raw = "<think>a</think>keep<think>b</think>";
        assert_eq!(strip_thinking(raw), "keep");
    }

    #[test]
    fn tags_are_case_sensitive() {
        let raw = "<THINK>shout</THINK> visible";
        assert_eq!(strip_thinking(raw), raw.trim());
    }

    #[test]
    fn unclosed_tag_is_left_alone() {
        assert_eq!(strip_thinking("<think>never closed"), "<think>never closed");
    }

    #[test]
    fn plain_reply_stays_plain() {
        let reply = ModelReply::from_raw("There were {about} 5 orders.");
        assert!(matches!(reply, ModelReply::PlainText(_)));
        assert_eq!(reply.into_clean_text(), "There were {about} 5 orders.");
    }

    #[test]
    fn structured_reply_exposes_answer_and_metadata() {
        let reply = ModelReply::from_raw(
            "<think>json time</think>{\"answer\": \"5 orders\", \"confidence\": \"high\"}",
        );
        match &reply {
            ModelReply::Structured { answer, metadata } => {
                assert_eq!(answer, "5 orders");
                assert_eq!(metadata["confidence"], "high");
            }
            other => panic!("expected structured reply, got {other:?}"),
        }
        assert_eq!(reply.into_clean_text(), "5 orders");
    }

    #[test]
    fn json_without_answer_field_is_plain_text() {
        let raw = "{\"rows\": 5}";
        assert_eq!(ModelReply::from_raw(raw), ModelReply::PlainText(raw.to_string()));
    }
}
