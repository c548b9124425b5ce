//! Bounded conversation buffer with a running summary.
//!
//! Turns are kept verbatim until the rendered history would exceed the
//! token-equivalent ceiling; the oldest turns are then folded into the
//! summary.  The most recent turn is never folded away.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::summarizer::{ExtractiveSummarizer, Summarizer};

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Character budget equivalent to `tokens` under [`estimate_tokens`].
fn chars_for_tokens(tokens: usize) -> usize {
    tokens.saturating_mul(4)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub response: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            at: Utc::now(),
        }
    }

    fn render(&self) -> String {
        format!("Human: {}\nAI: {}", self.query, self.response)
    }
}

const SUMMARY_PREFIX: &str = "System: ";

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    summary: String,
    turns: VecDeque<ConversationTurn>,
    max_token_limit: usize,
    summarized_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_token_limit: usize) -> Self {
        Self {
            summary: String::new(),
            turns: VecDeque::new(),
            max_token_limit,
            summarized_turns: 0,
        }
    }

    pub fn max_token_limit(&self) -> usize {
        self.max_token_limit
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Turns folded into the summary since creation.
    pub fn summarized_turns(&self) -> usize {
        self.summarized_turns
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
    }

    fn render_turns(&self) -> String {
        self.turns
            .iter()
            .map(ConversationTurn::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_unbounded(&self) -> String {
        let turns = self.render_turns();
        match (self.summary.is_empty(), turns.is_empty()) {
            (true, _) => turns,
            (false, true) => format!("{SUMMARY_PREFIX}{}", self.summary),
            (false, false) => format!("{SUMMARY_PREFIX}{}\n{turns}", self.summary),
        }
    }

    /// Token estimate of the history as it would be rendered without any
    /// clamping.
    pub fn raw_tokens(&self) -> usize {
        estimate_tokens(&self.render_unbounded())
    }

    /// Over the ceiling with at least one turn that may be folded.
    pub fn needs_compaction(&self) -> bool {
        self.turns.len() > 1 && self.raw_tokens() > self.max_token_limit
    }

    /// Share of the ceiling kept free for the summary when pruning turns.
    fn summary_reserve(&self) -> usize {
        self.max_token_limit / 4
    }

    /// Pop the oldest turns until the remaining turns fit in the ceiling minus
    /// the summary reserve.  At least one turn always stays.
    fn take_overflow(&mut self) -> Vec<ConversationTurn> {
        let budget = self.max_token_limit.saturating_sub(self.summary_reserve());
        let mut pruned = Vec::new();
        while self.turns.len() > 1 && estimate_tokens(&self.render_turns()) > budget {
            if let Some(turn) = self.turns.pop_front() {
                pruned.push(turn);
            }
        }
        pruned
    }

    /// Fold overflowing turns into the running summary.  Falls back to an
    /// extractive synopsis when the summarizer fails so that turns are never
    /// dropped without a trace.
    pub async fn compact(&mut self, summarizer: &dyn Summarizer) {
        if !self.needs_compaction() {
            return;
        }
        let pruned = self.take_overflow();
        if pruned.is_empty() {
            return;
        }

        let summary = match summarizer.summarize(&self.summary, &pruned).await {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => {
                warn!("summarizer returned empty text, using extractive synopsis");
                ExtractiveSummarizer.synopsis(&self.summary, &pruned)
            }
            Err(err) => {
                warn!(%err, "summarizer failed, using extractive synopsis");
                ExtractiveSummarizer.synopsis(&self.summary, &pruned)
            }
        };

        self.summarized_turns += pruned.len();
        self.summary = summary;
        debug!(
            folded = pruned.len(),
            kept = self.turns.len(),
            tokens = self.raw_tokens(),
            limit = self.max_token_limit,
            "conversation memory compacted"
        );
    }

    /// History text for prompt injection, never above the ceiling.
    ///
    /// Normally compaction keeps the raw rendering under the ceiling.  When it
    /// cannot (a summary that came back too long, or a single turn larger than
    /// the ceiling) the summary is clamped first, keeping its most recent
    /// part, and then the turn block, keeping its end.
    pub fn render(&self) -> String {
        let full = self.render_unbounded();
        if estimate_tokens(&full) <= self.max_token_limit {
            return full;
        }

        let budget = chars_for_tokens(self.max_token_limit);
        let turns = self.render_turns();
        let turns_len = turns.chars().count();

        if !self.summary.is_empty() && !turns.is_empty() {
            let overhead = SUMMARY_PREFIX.chars().count() + 1;
            let room = budget.saturating_sub(turns_len + overhead);
            if room > 0 {
                return format!("{SUMMARY_PREFIX}{}\n{turns}", tail_chars(&self.summary, room));
            }
        } else if !self.summary.is_empty() {
            let room = budget.saturating_sub(SUMMARY_PREFIX.chars().count());
            return format!("{SUMMARY_PREFIX}{}", tail_chars(&self.summary, room));
        }

        tail_chars(&turns, budget).to_string()
    }

    /// Token estimate of [`render`](Self::render).
    pub fn rendered_tokens(&self) -> usize {
        estimate_tokens(&self.render())
    }
}

/// The last `n` characters of `text`.
fn tail_chars(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if total <= n {
        return text;
    }
    match text.char_indices().nth(total - n) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
