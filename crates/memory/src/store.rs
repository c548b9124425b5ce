//! Identity → conversation memory map.
//!
//! One [`ConversationMemory`] per identity, created lazily on first access.
//! The outer map lock is only held long enough to look up or insert an
//! entry; mutation of one identity's memory never blocks another identity.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::conversation::{ConversationMemory, ConversationTurn};
use crate::summarizer::Summarizer;

pub type SharedMemory = Arc<RwLock<ConversationMemory>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub identity: String,
    pub turns: usize,
    pub summarized_turns: usize,
    pub has_summary: bool,
    pub rendered_tokens: usize,
    pub max_token_limit: usize,
}

pub struct MemoryStore {
    memories: RwLock<HashMap<String, SharedMemory>>,
    max_token_limit: usize,
    summarizer: Arc<dyn Summarizer>,
}

impl MemoryStore {
    pub fn new(max_token_limit: usize, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            memories: RwLock::new(HashMap::new()),
            max_token_limit,
            summarizer,
        }
    }

    pub fn max_token_limit(&self) -> usize {
        self.max_token_limit
    }

    /// The memory for `identity`, created if absent.  Concurrent first
    /// access for one identity yields the same instance.
    pub async fn get(&self, identity: &str) -> SharedMemory {
        if let Some(memory) = self.memories.read().await.get(identity) {
            return Arc::clone(memory);
        }

        let mut memories = self.memories.write().await;
        let memory = memories.entry(identity.to_string()).or_insert_with(|| {
            debug!(identity, "creating conversation memory");
            Arc::new(RwLock::new(ConversationMemory::new(self.max_token_limit)))
        });
        Arc::clone(memory)
    }

    /// Record a completed turn, summarizing older turns if the ceiling is
    /// now exceeded.
    #[instrument(skip(self, turn), fields(identity = %identity))]
    pub async fn append(&self, identity: &str, turn: ConversationTurn) {
        let memory = self.get(identity).await;
        let mut memory = memory.write().await;
        memory.push(turn);
        memory.compact(self.summarizer.as_ref()).await;
    }

    /// History text for the synthesis prompt, within the ceiling.
    #[instrument(skip(self), fields(identity = %identity))]
    pub async fn render_history(&self, identity: &str) -> String {
        let memory = self.get(identity).await;
        {
            let guard = memory.read().await;
            if !guard.needs_compaction() {
                return guard.render();
            }
        }

        let mut guard = memory.write().await;
        guard.compact(self.summarizer.as_ref()).await;
        guard.render()
    }

    /// Identities with a memory, sorted.
    pub async fn identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.memories.read().await.keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Snapshot of one identity's memory, without creating it.
    pub async fn stats(&self, identity: &str) -> Option<MemoryStats> {
        let memory = self.memories.read().await.get(identity).map(Arc::clone)?;
        let memory = memory.read().await;
        Some(MemoryStats {
            identity: identity.to_string(),
            turns: memory.turn_count(),
            summarized_turns: memory.summarized_turns(),
            has_summary: !memory.summary().is_empty(),
            rendered_tokens: memory.rendered_tokens(),
            max_token_limit: memory.max_token_limit(),
        })
    }

    /// Drop an identity's memory.  Returns whether one existed.
    pub async fn forget(&self, identity: &str) -> bool {
        self.memories.write().await.remove(identity).is_some()
    }
}
