//! Wiring from [`AppConfig`] to a ready [`Orchestrator`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use sqlsage_config::{AppConfig, LlmConfig};
use sqlsage_index::{Embedder, HashingEmbedder, IndexArena, OllamaEmbedder, RecursiveSplitter};
use sqlsage_llm::{ChatModel, ModelHandle, OllamaClient, OpenAiCompatClient, Provider, RetryPolicy};
use sqlsage_memory::{LlmSummarizer, MemoryStore, SessionLog};

use crate::database::{SchemaProvider, SqlDatabase, StaticSchema};
use crate::indexer::Indexer;
use crate::orchestrator::{Orchestrator, StageTimeouts};
use crate::synthesizer::Synthesizer;
use crate::translator::Translator;

pub fn chat_client(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match Provider::parse(&config.provider) {
        Some(Provider::Ollama) => Ok(Arc::new(OllamaClient::new(config.ollama_base_url.clone()))),
        Some(Provider::OpenAiCompatible) => Ok(Arc::new(OpenAiCompatClient::from_env(
            config.openai_base_url.clone(),
            &config.api_key_env,
        ))),
        None => bail!("unknown llm provider `{}`", config.provider),
    }
}

pub fn retry_policy(config: &LlmConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: config.max_retries,
        initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
        max_delay: Duration::from_millis(config.retry_max_delay_ms),
    }
}

fn model_handle(
    client: &Arc<dyn ChatModel>,
    config: &LlmConfig,
    model: &str,
    temperature: f32,
) -> ModelHandle {
    ModelHandle::new(Arc::clone(client), model, temperature)
        .with_timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
        .with_retry(retry_policy(config))
}

pub fn embedder_from_config(config: &AppConfig) -> Result<Arc<dyn Embedder>> {
    let embeddings = &config.embeddings;
    match embeddings.provider.trim().to_ascii_lowercase().as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(
            &config.llm.ollama_base_url,
            embeddings.model.clone(),
            embeddings.dimensions,
            Duration::from_secs(embeddings.timeout_secs.max(1)),
        )?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(embeddings.dimensions))),
        other => bail!("unknown embeddings provider `{other}`"),
    }
}

impl StageTimeouts {
    /// Model-backed stages get room for every retry of every call they make.
    pub fn from_config(config: &AppConfig) -> Self {
        let llm = &config.llm;
        let attempts = u64::from(llm.max_retries) + 1;
        let per_call = Duration::from_secs(llm.request_timeout_secs.max(1) * attempts)
            + Duration::from_millis(llm.retry_max_delay_ms * u64::from(llm.max_retries));
        Self {
            // generation + repair
            translate: per_call * 2,
            materialize: Duration::from_secs(config.database.query_timeout_secs.max(1)),
            index: Duration::from_secs(config.index.build_timeout_secs.max(1)),
            synthesize: per_call,
        }
    }
}

pub async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let client = chat_client(&config.llm)?;
    let llm = &config.llm;

    let translator = Translator::new(
        model_handle(&client, llm, &llm.translator_model, llm.translator_temperature),
        model_handle(&client, llm, &llm.translator_model, llm.translator_temperature),
        config.database.top_k,
    )?;

    let database = Arc::new(
        SqlDatabase::connect(&config.database)
            .await
            .context("connecting to the database")?,
    );
    let schema: Arc<dyn SchemaProvider> = if config.database.schema_path.trim().is_empty() {
        database.clone()
    } else {
        Arc::new(StaticSchema::from_file(
            config.database.dialect_name(),
            Path::new(config.database.schema_path.trim()),
        )?)
    };

    let embedder = embedder_from_config(config)?;
    let splitter = RecursiveSplitter::new(config.index.chunk_size, config.index.chunk_overlap)?;
    let indexer = Indexer::new(splitter, embedder.clone());
    let synthesizer = Synthesizer::new(
        model_handle(&client, llm, &llm.synthesis_model, llm.synthesis_temperature),
        embedder,
        config.index.retrieval_k,
    )?;

    let summarizer = LlmSummarizer::new(model_handle(
        &client,
        llm,
        &llm.summary_model,
        config.memory.summary_temperature,
    ))?;
    let memory = Arc::new(MemoryStore::new(
        config.memory.max_token_limit,
        Arc::new(summarizer),
    ));

    let arena = IndexArena::new(&config.index.root_dir).keep_after_use(config.index.keep_after_answer);

    let mut orchestrator = Orchestrator::new(
        translator,
        database,
        schema,
        indexer,
        synthesizer,
        memory,
        arena,
    )
    .with_timeouts(StageTimeouts::from_config(config));
    if config.memory.session_log_enabled {
        orchestrator = orchestrator.with_session_log(SessionLog::new(&config.memory.session_log_dir));
    }

    info!(
        provider = %llm.provider,
        translator = %llm.translator_model,
        synthesis = %llm.synthesis_model,
        embeddings = %config.embeddings.model,
        "pipeline ready"
    );
    Ok(orchestrator)
}
