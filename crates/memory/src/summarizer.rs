use anyhow::Result;
use async_trait::async_trait;

use sqlsage_llm::{ModelHandle, PromptBindings, PromptTemplate, Slot, strip_thinking};

use crate::conversation::ConversationTurn;

/// Folds conversation turns into a running summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, existing: &str, turns: &[ConversationTurn]) -> Result<String>;
}

pub const SUMMARY_TEMPLATE: &str = "\
Progressively summarize the conversation between a user and a database assistant. \
Extend the current summary with the new lines and return the new summary only. \
Keep concrete numbers, table names and filters the user asked about, since later \
questions may refer back to them.

Current summary:
{summary}

New lines of conversation:
{new_lines}

New summary:";

/// Summarizer backed by a low-temperature language model.
pub struct LlmSummarizer {
    model: ModelHandle,
    template: PromptTemplate,
}

impl LlmSummarizer {
    pub fn new(model: ModelHandle) -> Result<Self> {
        let template =
            PromptTemplate::parse_requiring(SUMMARY_TEMPLATE, &[Slot::Summary, Slot::NewLines])?;
        Ok(Self { model, template })
    }
}

fn format_lines(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("Human: {}\nAI: {}", turn.query, turn.response))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, existing: &str, turns: &[ConversationTurn]) -> Result<String> {
        let existing = if existing.trim().is_empty() { "(empty)" } else { existing };
        let prompt = self.template.render(
            &PromptBindings::new()
                .bind(Slot::Summary, existing)
                .bind(Slot::NewLines, format_lines(turns)),
        )?;
        let raw = self.model.complete(&prompt).await?;
        Ok(strip_thinking(&raw))
    }
}

/// Deterministic synopsis built from the turns themselves.  Used when no
/// summary model is configured and as the fallback when the model fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

const MAX_SYNOPSIS_CHARS: usize = 1_200;

impl ExtractiveSummarizer {
    pub fn synopsis(&self, existing: &str, turns: &[ConversationTurn]) -> String {
        let mut lines: Vec<String> = Vec::new();
        if !existing.trim().is_empty() {
            lines.push(existing.trim().to_string());
        }
        for turn in turns {
            lines.push(format!(
                "The user asked \"{}\" and was told \"{}\".",
                clip(&turn.query, 160),
                clip(&turn.response, 200)
            ));
        }
        let joined = lines.join(" ");
        let total = joined.chars().count();
        if total <= MAX_SYNOPSIS_CHARS {
            return joined;
        }
        joined.chars().skip(total - MAX_SYNOPSIS_CHARS).collect()
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, existing: &str, turns: &[ConversationTurn]) -> Result<String> {
        Ok(self.synopsis(existing, turns))
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let mut clipped = flat.chars().take(max_chars).collect::<String>();
        clipped.push('…');
        clipped
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sqlsage_llm::testing::ScriptedModel;

    use super::*;

    #[tokio::test]
    async fn llm_summarizer_builds_progressive_prompt_and_strips_thinking() {
        let model = Arc::new(ScriptedModel::new([
            "<think>hmm</think>The user counted last month's orders (5).",
        ]));
        let summarizer = LlmSummarizer::new(ModelHandle::new(model.clone(), "summary", 0.1)).unwrap();

        let turns = [ConversationTurn::new("How many orders last month?", "5")];
        let summary = summarizer.summarize("", &turns).await.unwrap();
        assert_eq!(summary, "The user counted last month's orders (5).");

        let calls = model.calls();
        assert!((calls[0].temperature - 0.1).abs() < f32::EPSILON);
        assert!(calls[0].prompt.contains("Current summary:\n(empty)"));
        assert!(calls[0].prompt.contains("Human: How many orders last month?\nAI: 5"));
    }

    #[test]
    fn extractive_synopsis_mentions_each_turn() {
        let turns = [
            ConversationTurn::new("top customer?", "Alice"),
            ConversationTurn::new("and her total?", "$120"),
        ];
        let synopsis = ExtractiveSummarizer.synopsis("Earlier: revenue questions.", &turns);
        assert!(synopsis.starts_with("Earlier: revenue questions."));
        assert!(synopsis.contains("\"top customer?\""));
        assert!(synopsis.contains("\"$120\""));
    }

    #[test]
    fn extractive_synopsis_is_bounded() {
        let turns: Vec<_> = (0..50)
            .map(|i| ConversationTurn::new(format!("question {i}"), "y".repeat(300)))
            .collect();
        let synopsis = ExtractiveSummarizer.synopsis("", &turns);
        assert!(synopsis.chars().count() <= MAX_SYNOPSIS_CHARS);
        assert!(synopsis.contains("question 49"));
    }
}
