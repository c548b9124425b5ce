//! Conversation memory for the query service: a bounded, summarizing history
//! per identity plus an append-only on-disk transcript.

pub mod conversation;
pub mod session_log;
pub mod store;
pub mod summarizer;

pub use conversation::{ConversationMemory, ConversationTurn, estimate_tokens};
pub use session_log::{SessionLog, SessionRecord, identity_slug};
pub use store::{MemoryStats, MemoryStore, SharedMemory};
pub use summarizer::{ExtractiveSummarizer, LlmSummarizer, SUMMARY_TEMPLATE, Summarizer};
