//! Retrieval + answer generation over a per-request index.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::{debug, instrument};

use sqlsage_index::{Embedder, VectorIndex};
use sqlsage_llm::{ModelHandle, ModelReply, PromptBindings, PromptTemplate, Slot};

pub const SYNTHESIS_TEMPLATE: &str = "\
You will be given a question about data in a database. The answer to it is in the context below.
Answer the question from the context and the previous conversation history only.
Reply in natural language with a clear structure, and use tables where they help.
Check the previous conversation history to see whether the question is a follow-up to something asked earlier, and resolve such references before answering.

Previous conversation history:
{history}

<context>
{context}
</context>

Question: {input}";

const EMPTY_HISTORY: &str = "(no previous conversation)";

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Extra fields of a structured reply, if the model produced one.
    pub metadata: Option<Value>,
    pub context_chunks: usize,
}

pub struct Synthesizer {
    model: ModelHandle,
    embedder: Arc<dyn Embedder>,
    template: PromptTemplate,
    retrieval_k: usize,
}

impl Synthesizer {
    pub fn new(model: ModelHandle, embedder: Arc<dyn Embedder>, retrieval_k: usize) -> Result<Self> {
        Self::with_template(model, embedder, retrieval_k, SYNTHESIS_TEMPLATE)
    }

    /// Use a custom prompt.  It must mention `{history}`, `{context}` and
    /// `{input}`.
    pub fn with_template(
        model: ModelHandle,
        embedder: Arc<dyn Embedder>,
        retrieval_k: usize,
        template: &str,
    ) -> Result<Self> {
        let template =
            PromptTemplate::parse_requiring(template, &[Slot::History, Slot::Context, Slot::Input])?;
        Ok(Self {
            model,
            embedder,
            template,
            retrieval_k: retrieval_k.max(1),
        })
    }

    pub fn retrieval_k(&self) -> usize {
        self.retrieval_k
    }

    #[instrument(skip_all, fields(index = %index_path.display(), k = self.retrieval_k))]
    pub async fn synthesize(&self, question: &str, index_path: &Path, history: &str) -> Result<Answer> {
        let index = VectorIndex::load(index_path, self.embedder.as_ref())
            .await
            .context("loading answer index")?;
        let hits = index
            .retrieve(self.embedder.as_ref(), question, self.retrieval_k)
            .await?;
        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        debug!(chunks = hits.len(), "context retrieved");

        let history = if history.trim().is_empty() { EMPTY_HISTORY } else { history };
        let prompt = self.template.render(
            &PromptBindings::new()
                .bind(Slot::History, history)
                .bind(Slot::Context, context)
                .bind(Slot::Input, question),
        )?;

        let raw = self.model.complete(&prompt).await?;
        let reply = ModelReply::from_raw(&raw);
        let metadata = match &reply {
            ModelReply::Structured { metadata, .. } => Some(metadata.clone()),
            ModelReply::PlainText(_) => None,
        };
        let text = reply.into_clean_text();
        if text.is_empty() {
            bail!("synthesis model returned no answer text");
        }

        Ok(Answer {
            text,
            metadata,
            context_chunks: hits.len(),
        })
    }
}
