//! Question answering over a SQL database: translate, execute, index the
//! result, answer from the index with conversation memory.

pub mod builder;
pub mod database;
pub mod error;
pub mod indexer;
pub mod observability;
pub mod orchestrator;
pub mod synthesizer;
pub mod translator;

pub use builder::{build_orchestrator, chat_client, embedder_from_config, retry_policy};
pub use database::{Backend, CellValue, DataSource, ResultSet, SchemaProvider, SqlDatabase, StaticSchema};
pub use error::{PipelineError, Stage};
pub use indexer::{Indexer, render_document};
pub use observability::{LogTracer, Outcome, RequestTracer, TraceEvent};
pub use orchestrator::{Orchestrator, StageTimeouts};
pub use synthesizer::{Answer, SYNTHESIS_TEMPLATE, Synthesizer};
pub use translator::{
    GENERATION_TEMPLATE, REPAIR_TEMPLATE, SchemaDescriptor, TranslationResult, Translator, sanitize_sql,
};
