//! One question in, one answer (or one failure) out.
//!
//! Each request walks `Translate → Materialize → Index → Synthesize →
//! Persist`.  The first failing stage ends the request; memory is only
//! touched once an answer exists.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use sqlsage_index::IndexArena;
use sqlsage_memory::{ConversationTurn, MemoryStore, SessionLog, identity_slug};

use crate::database::{DataSource, SchemaProvider};
use crate::error::{PipelineError, Stage};
use crate::indexer::Indexer;
use crate::observability::{LogTracer, Outcome, RequestTracer, TraceEvent};
use crate::synthesizer::{Answer, Synthesizer};
use crate::translator::{SchemaDescriptor, Translator};

const TRACE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound per stage.  Overrunning a bound fails the request with
/// [`PipelineError::Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub translate: Duration,
    pub materialize: Duration,
    pub index: Duration,
    pub synthesize: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            translate: Duration::from_secs(180),
            materialize: Duration::from_secs(30),
            index: Duration::from_secs(120),
            synthesize: Duration::from_secs(180),
        }
    }
}

pub struct Orchestrator {
    translator: Translator,
    data_source: Arc<dyn DataSource>,
    schema_provider: Arc<dyn SchemaProvider>,
    schema: OnceCell<SchemaDescriptor>,
    indexer: Indexer,
    synthesizer: Synthesizer,
    memory: Arc<MemoryStore>,
    arena: IndexArena,
    session_log: Option<SessionLog>,
    tracer: Arc<dyn RequestTracer>,
    timeouts: StageTimeouts,
}

#[derive(Default)]
struct Progress {
    index_built: bool,
}

impl Orchestrator {
    pub fn new(
        translator: Translator,
        data_source: Arc<dyn DataSource>,
        schema_provider: Arc<dyn SchemaProvider>,
        indexer: Indexer,
        synthesizer: Synthesizer,
        memory: Arc<MemoryStore>,
        arena: IndexArena,
    ) -> Self {
        Self {
            translator,
            data_source,
            schema_provider,
            schema: OnceCell::new(),
            indexer,
            synthesizer,
            memory,
            arena,
            session_log: None,
            tracer: Arc::new(LogTracer),
            timeouts: StageTimeouts::default(),
        }
    }

    pub fn with_session_log(mut self, log: SessionLog) -> Self {
        self.session_log = Some(log);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn RequestTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn session_log(&self) -> Option<&SessionLog> {
        self.session_log.as_ref()
    }

    /// Schema description, fetched once and reused.
    pub async fn schema(&self) -> Result<&SchemaDescriptor, PipelineError> {
        self.schema
            .get_or_try_init(|| async {
                let text = self.schema_provider.describe().await?;
                anyhow::Ok(SchemaDescriptor {
                    dialect: self.schema_provider.dialect().to_string(),
                    text,
                })
            })
            .await
            .map_err(|err| PipelineError::Translation {
                reason: "schema description unavailable".to_string(),
                raw_candidate: None,
                source: Some(err.into()),
            })
    }

    /// Answer `question` for `identity`.
    #[instrument(skip(self, question), fields(identity = %identity, chars = question.len()))]
    pub async fn answer(&self, question: &str, identity: &str) -> Result<Answer, PipelineError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let mut progress = Progress::default();

        let result = self.run(question, identity, &mut progress).await;

        let (outcome, stage, error_kind) = match &result {
            Ok(_) => {
                info!(%request_id, elapsed_ms = started.elapsed().as_millis() as u64, "answered");
                (Outcome::Successful, Stage::Persist, None)
            }
            Err(err) => {
                error!(%request_id, stage = %err.stage(), detail = %err.detail(), "request failed");
                (Outcome::Failed, err.stage(), Some(err.kind()))
            }
        };
        let event = TraceEvent {
            request_id,
            identity: identity.to_string(),
            input_length: question.chars().count(),
            outcome,
            stage,
            error_kind,
            index_built: progress.index_built,
            elapsed: started.elapsed(),
        };
        match timeout(TRACE_TIMEOUT, self.tracer.record(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%request_id, %err, "request tracer failed"),
            Err(_) => warn!(%request_id, "request tracer timed out"),
        }

        result
    }

    async fn run(
        &self,
        question: &str,
        identity: &str,
        progress: &mut Progress,
    ) -> Result<Answer, PipelineError> {
        // ── Translate ──
        let schema = bounded(Stage::Translate, self.timeouts.materialize, self.schema()).await??;
        let translation = bounded(
            Stage::Translate,
            self.timeouts.translate,
            self.translator.translate(question, schema),
        )
        .await?;
        let Some(query) = translation.cleaned_query else {
            let reason = translation
                .failure
                .unwrap_or_else(|| "no query produced".to_string());
            warn!(raw_candidate = %translation.raw_candidate, %reason, "translation failed");
            return Err(PipelineError::translation(reason, Some(translation.raw_candidate)));
        };

        // ── Materialize ──
        let result = bounded(
            Stage::Materialize,
            self.timeouts.materialize,
            self.data_source.execute(&query),
        )
        .await?
        .map_err(|err| {
            warn!(
                %query,
                raw_candidate = %translation.raw_candidate,
                "query execution failed"
            );
            PipelineError::execution(query.as_str(), err)
        })?;

        // ── Index ──
        let lease = self.arena.allocate(&identity_slug(identity));
        bounded(
            Stage::Index,
            self.timeouts.index,
            self.indexer.build(&result, lease.path()),
        )
        .await?
        .map_err(PipelineError::indexing)?;
        progress.index_built = true;

        // ── Synthesize ──
        let answer = bounded(Stage::Synthesize, self.timeouts.synthesize, async {
            let history = self.memory.render_history(identity).await;
            self.synthesizer
                .synthesize(question, lease.path(), &history)
                .await
        })
        .await?
        .map_err(PipelineError::synthesis)?;
        drop(lease);

        // ── Persist ──
        let turn = ConversationTurn::new(question, answer.text.clone());
        self.memory.append(identity, turn.clone()).await;
        if let Some(log) = &self.session_log {
            if let Err(err) = log.append(identity, &turn).await {
                warn!(%err, "session log append failed");
            }
        }

        Ok(answer)
    }
}

async fn bounded<F: Future>(stage: Stage, limit: Duration, future: F) -> Result<F::Output, PipelineError> {
    timeout(limit, future).await.map_err(|_| {
        warn!(%stage, ?limit, "stage timed out");
        PipelineError::Timeout { stage, limit }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    use sqlsage_index::{HashingEmbedder, RecursiveSplitter};
    use sqlsage_llm::testing::{FnModel, ScriptedModel};
    use sqlsage_llm::{ChatModel, CompletionRequest, LlmError, ModelHandle, RetryPolicy};
    use sqlsage_memory::ExtractiveSummarizer;

    use super::*;
    use crate::database::{ResultSet, SqlDatabase, StaticSchema};

    const LAST_MONTH_COUNT: &str = "SELECT COUNT(*) AS order_count FROM orders \
         WHERE order_date >= date('now', 'start of month', '-1 month') \
         AND order_date < date('now', 'start of month')";

    async fn seeded_db() -> SqlDatabase {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT NOT NULL, \
             order_date TEXT NOT NULL, total REAL NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        for day in 0..5 {
            sqlx::query(&format!(
                "INSERT INTO orders (customer, order_date, total) VALUES \
                 ('cust{day}', date('now', 'start of month', '-1 month', '+{day} days'), 10.0)"
            ))
            .execute(&pool)
            .await
            .unwrap();
        }
        for offset in ["+0 months", "-2 months", "-3 months"] {
            sqlx::query(&format!(
                "INSERT INTO orders (customer, order_date, total) VALUES \
                 ('other', date('now', 'start of month', '{offset}', '+1 day'), 99.0)"
            ))
            .execute(&pool)
            .await
            .unwrap();
        }
        SqlDatabase::from_sqlite(pool, "SQLite", 2)
    }

    fn handle(model: Arc<dyn ChatModel>, temperature: f32) -> ModelHandle {
        ModelHandle::new(model, "test-model", temperature).with_retry(RetryPolicy::none())
    }

    /// Generation model that wraps the given SQL in chatter; extraction model
    /// that pulls it back out.
    fn translator_for(sql: &'static str) -> Translator {
        let generator = FnModel::new(move |_request: CompletionRequest<'_>| {
            Ok(format!("Here you go:\n```sql\n{sql};\n```"))
        });
        let extractor = FnModel::new(|request: CompletionRequest<'_>| {
            let candidate = request.prompt.split("Input text:\n").nth(1).unwrap_or_default();
            let candidate = candidate.split("\n\nReturn only").next().unwrap_or_default();
            Ok(crate::translator::sanitize_sql(candidate))
        });
        Translator::new(handle(Arc::new(generator), 0.0), handle(Arc::new(extractor), 0.0), 5).unwrap()
    }

    /// Synthesis model that reads the count out of the retrieved context.
    fn counting_synthesizer(embedder: Arc<HashingEmbedder>) -> (Synthesizer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let model = FnModel::new(move |request: CompletionRequest<'_>| {
            seen.fetch_add(1, Ordering::SeqCst);
            let context = request
                .prompt
                .split("<context>")
                .nth(1)
                .and_then(|rest| rest.split("</context>").next())
                .unwrap_or_default();
            let count = context
                .lines()
                .skip_while(|line| !line.starts_with("order_count"))
                .nth(1)
                .map(str::trim)
                .unwrap_or("unknown");
            Ok(format!("<think>The table says {count}.</think>\n{count} orders were placed last month."))
        });
        let synthesizer = Synthesizer::new(handle(Arc::new(model), 0.4), embedder, 4).unwrap();
        (synthesizer, calls)
    }

    struct Harness {
        orchestrator: Orchestrator,
        synth_calls: Arc<AtomicUsize>,
        index_root: tempfile::TempDir,
    }

    async fn harness(sql: &'static str) -> Harness {
        let db = Arc::new(seeded_db().await);
        let embedder = Arc::new(HashingEmbedder::new(128));
        let (synthesizer, synth_calls) = counting_synthesizer(embedder.clone());
        let index_root = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            translator_for(sql),
            db.clone(),
            db,
            Indexer::new(RecursiveSplitter::new(500, 200).unwrap(), embedder),
            synthesizer,
            Arc::new(MemoryStore::new(2_000, Arc::new(ExtractiveSummarizer))),
            IndexArena::new(index_root.path()),
        );
        Harness {
            orchestrator,
            synth_calls,
            index_root,
        }
    }

    #[tokio::test]
    async fn answers_last_month_order_count() {
        let h = harness(LAST_MONTH_COUNT).await;
        let answer = h
            .orchestrator
            .answer("How many orders were placed last month?", "alice")
            .await
            .unwrap();

        assert!(answer.text.contains('5'), "answer: {}", answer.text);
        assert!(!answer.text.contains("<think>"));
        assert_eq!(h.synth_calls.load(Ordering::SeqCst), 1);

        let history = h.orchestrator.memory().render_history("alice").await;
        assert!(history.contains("Human: How many orders were placed last month?"));
        assert!(history.contains("AI: 5 orders were placed last month."));
    }

    #[tokio::test]
    async fn materialized_result_is_single_count() {
        let db = seeded_db().await;
        let result: ResultSet = db.execute(LAST_MONTH_COUNT).await.unwrap();
        assert_eq!(result.columns, ["order_count"]);
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.scalar(), Some(&crate::database::CellValue::Int(5)));
        assert!(LAST_MONTH_COUNT.contains("COUNT(*)"));
        assert!(LAST_MONTH_COUNT.contains("FROM orders"));
        assert!(LAST_MONTH_COUNT.contains("order_date >="));
    }

    #[tokio::test]
    async fn execution_failure_skips_synthesis_and_memory() {
        let h = harness("SELECT COUNT(*) FROM no_such_table").await;
        let err = h
            .orchestrator
            .answer("How many widgets?", "bob")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Execution { .. }));
        assert_eq!(err.stage(), Stage::Materialize);
        assert!(!err.user_message().contains("no_such_table"));
        assert_eq!(h.synth_calls.load(Ordering::SeqCst), 0);
        assert!(h.orchestrator.memory().stats("bob").await.is_none());
    }

    #[tokio::test]
    async fn translation_failure_keeps_raw_candidate() {
        let db = Arc::new(seeded_db().await);
        let embedder = Arc::new(HashingEmbedder::new(64));
        let (synthesizer, synth_calls) = counting_synthesizer(embedder.clone());
        let generator = Arc::new(ScriptedModel::new(["I don't know how to do that."]));
        let extractor = Arc::new(ScriptedModel::new(["```sql\n```"]));
        let index_root = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            Translator::new(handle(generator, 0.0), handle(extractor, 0.0), 5).unwrap(),
            db.clone(),
            db,
            Indexer::new(RecursiveSplitter::new(500, 200).unwrap(), embedder),
            synthesizer,
            Arc::new(MemoryStore::new(2_000, Arc::new(ExtractiveSummarizer))),
            IndexArena::new(index_root.path()),
        );

        match orchestrator.answer("gibberish", "carol").await.unwrap_err() {
            PipelineError::Translation { raw_candidate, .. } => {
                assert_eq!(raw_candidate.as_deref(), Some("I don't know how to do that."));
            }
            other => panic!("expected translation failure, got {other:?}"),
        }
        assert_eq!(synth_calls.load(Ordering::SeqCst), 0);
        assert!(orchestrator.memory().identities().await.is_empty());
    }

    #[tokio::test]
    async fn identities_answered_concurrently_stay_separate() {
        let h = harness(LAST_MONTH_COUNT).await;
        let question = "How many orders were placed last month?";
        let (a, b) = futures::join!(
            h.orchestrator.answer(question, "alice"),
            h.orchestrator.answer(question, "bob"),
        );
        a.unwrap();
        b.unwrap();
        h.orchestrator.answer("And the month before?", "alice").await.unwrap();

        let alice = h.orchestrator.memory().stats("alice").await.unwrap();
        let bob = h.orchestrator.memory().stats("bob").await.unwrap();
        assert_eq!(alice.turns, 2);
        assert_eq!(bob.turns, 1);
        let bob_history = h.orchestrator.memory().render_history("bob").await;
        assert!(!bob_history.contains("month before"));
    }

    #[tokio::test]
    async fn index_directories_are_released() {
        let h = harness(LAST_MONTH_COUNT).await;
        h.orchestrator.answer("How many orders?", "dana").await.unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(h.index_root.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
    }

    struct RecordingTracer {
        events: Mutex<Vec<TraceEvent>>,
    }

    #[async_trait]
    impl RequestTracer for RecordingTracer {
        async fn record(&self, event: &TraceEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct BrokenTracer;

    #[async_trait]
    impl RequestTracer for BrokenTracer {
        async fn record(&self, _event: &TraceEvent) -> Result<()> {
            anyhow::bail!("tracing backend unreachable")
        }
    }

    #[tokio::test]
    async fn tracer_sees_success_and_failure() {
        let tracer = Arc::new(RecordingTracer { events: Mutex::new(Vec::new()) });
        let ok = harness(LAST_MONTH_COUNT).await;
        let ok_orchestrator = ok.orchestrator.with_tracer(tracer.clone());
        ok_orchestrator.answer("How many orders?", "erin").await.unwrap();

        let bad = harness("SELECT * FROM missing").await;
        let bad_orchestrator = bad.orchestrator.with_tracer(tracer.clone());
        bad_orchestrator.answer("How many?", "erin").await.unwrap_err();

        let events = tracer.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, Outcome::Successful);
        assert_eq!(events[0].stage, Stage::Persist);
        assert!(events[0].index_built);
        assert_eq!(events[0].input_length, "How many orders?".len());
        assert_eq!(events[1].outcome, Outcome::Failed);
        assert_eq!(events[1].stage, Stage::Materialize);
        assert_eq!(events[1].error_kind, Some("execution_failure"));
        assert!(!events[1].index_built);
    }

    #[tokio::test]
    async fn broken_tracer_does_not_fail_requests() {
        let h = harness(LAST_MONTH_COUNT).await;
        let orchestrator = h.orchestrator.with_tracer(Arc::new(BrokenTracer));
        assert!(orchestrator.answer("How many orders?", "frank").await.is_ok());
    }

    #[tokio::test]
    async fn slow_translation_times_out() {
        let db = Arc::new(seeded_db().await);
        let embedder = Arc::new(HashingEmbedder::new(64));
        let (synthesizer, _) = counting_synthesizer(embedder.clone());
        let slow = Arc::new(
            ScriptedModel::new([LAST_MONTH_COUNT]).with_delay(Duration::from_millis(500)),
        );
        let index_root = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            Translator::new(handle(slow.clone(), 0.0), handle(slow, 0.0), 5).unwrap(),
            db.clone(),
            db,
            Indexer::new(RecursiveSplitter::new(500, 200).unwrap(), embedder),
            synthesizer,
            Arc::new(MemoryStore::new(2_000, Arc::new(ExtractiveSummarizer))),
            IndexArena::new(index_root.path()),
        )
        .with_timeouts(StageTimeouts {
            translate: Duration::from_millis(50),
            ..StageTimeouts::default()
        });

        let err = orchestrator.answer("How many orders?", "gina").await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { stage: Stage::Translate, .. }));
    }

    struct SlowSchema;

    #[async_trait]
    impl SchemaProvider for SlowSchema {
        fn dialect(&self) -> &str {
            "SQLite"
        }

        async fn describe(&self) -> Result<String> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok("CREATE TABLE orders (id INTEGER)".to_string())
        }
    }

    #[tokio::test]
    async fn slow_schema_description_times_out() {
        let db = Arc::new(seeded_db().await);
        let embedder = Arc::new(HashingEmbedder::new(64));
        let (synthesizer, synth_calls) = counting_synthesizer(embedder.clone());
        let generator = Arc::new(ScriptedModel::new([LAST_MONTH_COUNT]));
        let index_root = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            Translator::new(handle(generator.clone(), 0.0), handle(generator.clone(), 0.0), 5).unwrap(),
            db,
            Arc::new(SlowSchema),
            Indexer::new(RecursiveSplitter::new(500, 200).unwrap(), embedder),
            synthesizer,
            Arc::new(MemoryStore::new(2_000, Arc::new(ExtractiveSummarizer))),
            IndexArena::new(index_root.path()),
        )
        .with_timeouts(StageTimeouts {
            materialize: Duration::from_millis(50),
            ..StageTimeouts::default()
        });

        let started = Instant::now();
        let err = orchestrator.answer("How many orders?", "kim").await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { stage: Stage::Translate, .. }));
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(generator.calls().is_empty());
        assert_eq!(synth_calls.load(Ordering::SeqCst), 0);
    }

    /// Synthesis model that takes longer to answer questions mentioning
    /// "slow".
    struct PacedModel;

    #[async_trait]
    impl ChatModel for PacedModel {
        async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, LlmError> {
            let question = request.prompt.rsplit("Question: ").next().unwrap_or_default();
            let slow = question.contains("slow");
            tokio::time::sleep(Duration::from_millis(if slow { 300 } else { 20 })).await;
            Ok(if slow { "slow answer" } else { "fast answer" }.to_string())
        }
    }

    #[tokio::test]
    async fn same_identity_turns_land_in_completion_order() {
        let db = Arc::new(seeded_db().await);
        let embedder = Arc::new(HashingEmbedder::new(64));
        let synthesizer = Synthesizer::new(handle(Arc::new(PacedModel), 0.4), embedder.clone(), 4).unwrap();
        let index_root = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            translator_for(LAST_MONTH_COUNT),
            db.clone(),
            db,
            Indexer::new(RecursiveSplitter::new(500, 200).unwrap(), embedder),
            synthesizer,
            Arc::new(MemoryStore::new(2_000, Arc::new(ExtractiveSummarizer))),
            IndexArena::new(index_root.path()),
        )
        .with_session_log(SessionLog::new(log_dir.path()));

        let (slow, fast) = futures::join!(
            orchestrator.answer("Give me the slow count of orders", "jules"),
            orchestrator.answer("Quick count of orders?", "jules"),
        );
        assert_eq!(slow.unwrap().text, "slow answer");
        assert_eq!(fast.unwrap().text, "fast answer");

        let stats = orchestrator.memory().stats("jules").await.unwrap();
        assert_eq!(stats.turns, 2);
        let history = orchestrator.memory().render_history("jules").await;
        assert_eq!(history.matches("Human: Quick count of orders?").count(), 1);
        assert_eq!(history.matches("Human: Give me the slow count of orders").count(), 1);
        let fast_at = history.find("Human: Quick count").unwrap();
        let slow_at = history.find("Human: Give me the slow").unwrap();
        assert!(fast_at < slow_at, "history: {history}");
        assert!(history.contains("Human: Quick count of orders?\nAI: fast answer"));
        assert!(history.contains("Human: Give me the slow count of orders\nAI: slow answer"));

        let logged = orchestrator
            .session_log()
            .unwrap()
            .load_recent("jules", 10)
            .await
            .unwrap();
        let queries: Vec<&str> = logged.iter().map(|turn| turn.query.as_str()).collect();
        assert_eq!(queries, ["Quick count of orders?", "Give me the slow count of orders"]);
    }

    #[tokio::test]
    async fn successful_turns_reach_session_log() {
        let log_dir = tempfile::tempdir().unwrap();
        let h = harness(LAST_MONTH_COUNT).await;
        let orchestrator = h.orchestrator.with_session_log(SessionLog::new(log_dir.path()));
        orchestrator.answer("How many orders?", "hana").await.unwrap();

        let turns = orchestrator
            .session_log()
            .unwrap()
            .load_recent("hana", 10)
            .await
            .unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].query, "How many orders?");
    }

    #[tokio::test]
    async fn static_schema_is_passed_to_translator() {
        let db = Arc::new(seeded_db().await);
        let embedder = Arc::new(HashingEmbedder::new(64));
        let (synthesizer, _) = counting_synthesizer(embedder.clone());
        let generator = Arc::new(ScriptedModel::new([LAST_MONTH_COUNT]));
        let extractor = Arc::new(ScriptedModel::new([LAST_MONTH_COUNT]));
        let index_root = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            Translator::new(handle(generator.clone(), 0.0), handle(extractor, 0.0), 5).unwrap(),
            db,
            Arc::new(StaticSchema::new("MySQL", "orders(id, customer, order_date, total)")),
            Indexer::new(RecursiveSplitter::new(500, 200).unwrap(), embedder),
            synthesizer,
            Arc::new(MemoryStore::new(2_000, Arc::new(ExtractiveSummarizer))),
            IndexArena::new(index_root.path()),
        );
        orchestrator.answer("How many orders?", "ivan").await.unwrap();
        let prompt = &generator.calls()[0].prompt;
        assert!(prompt.contains("You are a MySQL expert"));
        assert!(prompt.contains("orders(id, customer, order_date, total)"));
    }
}
