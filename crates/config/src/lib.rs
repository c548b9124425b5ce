use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ── Language models ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `openai` (any OpenAI-compatible endpoint: Groq, OpenRouter, ...) or
    /// `ollama`.
    pub provider: String,
    /// Model used for SQL generation and the SQL repair pass.
    pub translator_model: String,
    /// Model used for answer synthesis.
    pub synthesis_model: String,
    /// Model used to compact conversation memory.
    pub summary_model: String,
    pub translator_temperature: f32,
    pub synthesis_temperature: f32,
    /// Base URL for the Ollama API.  Overridden at runtime by the
    /// `OLLAMA_BASE_URL` environment variable when set.
    pub ollama_base_url: String,
    /// Base URL of the OpenAI-compatible endpoint (must include the `/v1`
    /// style prefix, e.g. `https://api.groq.com/openai/v1`).
    pub openai_base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Upper bound for a single completion request.
    pub request_timeout_secs: u64,
    /// Retries after the first attempt for transient failures (timeouts,
    /// connection resets, 429, 5xx).  `0` disables retrying.
    pub max_retries: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            translator_model: "llama-3.3-70b-versatile".to_string(),
            synthesis_model: "deepseek-r1-distill-llama-70b".to_string(),
            summary_model: "deepseek-r1-distill-llama-70b".to_string(),
            translator_temperature: 0.0,
            synthesis_temperature: 0.4,
            ollama_base_url: "http://localhost:11434".to_string(),
            openai_base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            request_timeout_secs: 60,
            max_retries: 2,
            retry_initial_delay_ms: 500,
            retry_max_delay_ms: 8_000,
        }
    }
}

// ── Embeddings ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// `ollama` (sentence-embedding model served by Ollama, CPU is fine) or
    /// `hashing` (deterministic local feature hashing, no network).
    pub provider: String,
    pub model: String,
    /// Expected vector width.  The index refuses to load vectors of any
    /// other width.
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "all-minilm".to_string(),
            dimensions: 384,
            timeout_secs: 30,
        }
    }
}

// ── Database ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL (`sqlite://`, `mysql://`, `postgres://`).  Overridden
    /// by `DATABASE_URL`.
    pub url: String,
    pub max_connections: u32,
    /// Health-check connections before handing them out.
    pub pre_ping: bool,
    /// Connections older than this are closed instead of reused.
    pub recycle_secs: u64,
    pub acquire_timeout_secs: u64,
    pub query_timeout_secs: u64,
    /// SQL dialect named in the generation prompt.  Empty means derive it
    /// from the URL scheme.
    pub dialect: String,
    /// Row cap suggested to the model when the question does not ask for a
    /// specific number of results.
    pub top_k: usize,
    /// Sample rows shown per table in the schema description.
    pub sample_rows: usize,
    /// Optional file holding a hand-written schema description.  Empty means
    /// introspect the live database.
    pub schema_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/ecommerce.db".to_string(),
            max_connections: 5,
            pre_ping: true,
            recycle_secs: 3_600,
            acquire_timeout_secs: 10,
            query_timeout_secs: 30,
            dialect: String::new(),
            top_k: 5,
            sample_rows: 3,
            schema_path: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// Dialect label used in prompts: the explicit `dialect` when set,
    /// otherwise derived from the URL scheme.
    pub fn dialect_name(&self) -> String {
        if !self.dialect.trim().is_empty() {
            return self.dialect.trim().to_string();
        }
        let scheme = self
            .url
            .split(':')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => "SQLite",
            "mysql" | "mariadb" => "MySQL",
            "postgres" | "postgresql" => "PostgreSQL",
            _ => "SQL",
        }
        .to_string()
    }
}

// ── Ephemeral index ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Parent directory for per-request index directories.
    pub root_dir: String,
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks.
    pub chunk_overlap: usize,
    /// Number of chunks handed to the synthesis prompt.
    pub retrieval_k: usize,
    /// Keep per-request index directories after the answer is produced
    /// (useful when debugging retrieval).  Off by default.
    pub keep_after_answer: bool,
    /// Upper bound for embedding + persisting one index.
    pub build_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root_dir: ".sqlsage/index".to_string(),
            chunk_size: 500,
            chunk_overlap: 200,
            retrieval_k: 4,
            keep_after_answer: false,
            build_timeout_secs: 120,
        }
    }
}

// ── Conversation memory ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Token-equivalent ceiling for the rendered history of one identity.
    pub max_token_limit: usize,
    /// Temperature of the model that compacts older turns into a summary.
    pub summary_temperature: f32,
    /// Write every completed turn to a per-identity JSONL transcript.
    pub session_log_enabled: bool,
    pub session_log_dir: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_token_limit: 2_000,
            summary_temperature: 0.1,
            session_log_enabled: true,
            session_log_dir: ".sqlsage/sessions".to_string(),
        }
    }
}

// ── Telemetry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Directory for daily-rolling log files.  Empty logs to stderr only.
    pub log_dir: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: String::new(),
        }
    }
}

// ── Chat transport ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub name: String,
    /// Environment variable holding the Telegram bot token.
    pub telegram_token_env: String,
    /// Prefix every reply with the user's display name.
    pub prefix_display_name: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "sqlsage".to_string(),
            telegram_token_env: "TELEGRAM_TOKEN".to_string(),
            prefix_display_name: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub embeddings: EmbeddingsConfig,
    pub database: DatabaseConfig,
    pub index: IndexConfig,
    pub memory: MemoryConfig,
    pub telemetry: TelemetryConfig,
    pub bot: BotConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("DATABASE_URL") {
            if !value.trim().is_empty() {
                self.database.url = value.trim().to_string();
            }
        }

        if let Ok(value) = env::var("OLLAMA_BASE_URL") {
            if !value.trim().is_empty() {
                self.llm.ollama_base_url = value.trim().to_string();
            }
        }

        if let Ok(value) = env::var("SQLSAGE_LLM_PROVIDER") {
            if !value.trim().is_empty() {
                self.llm.provider = value.trim().to_lowercase();
            }
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// `true` when completions go through a local Ollama server.
    pub fn uses_ollama(&self) -> bool {
        self.llm.provider.eq_ignore_ascii_case("ollama")
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
