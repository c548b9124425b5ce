//! Per-request trace tagging.  Tracers are called after every request,
//! successful or not; their failures never affect the answer.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Successful,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub request_id: Uuid,
    pub identity: String,
    pub input_length: usize,
    pub outcome: Outcome,
    /// Stage the request ended in: `Persist` on success, the failing stage
    /// otherwise.
    pub stage: Stage,
    pub error_kind: Option<&'static str>,
    pub index_built: bool,
    pub elapsed: Duration,
}

#[async_trait]
pub trait RequestTracer: Send + Sync {
    async fn record(&self, event: &TraceEvent) -> Result<()>;
}

/// Emits one structured `tracing` event per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

#[async_trait]
impl RequestTracer for LogTracer {
    async fn record(&self, event: &TraceEvent) -> Result<()> {
        info!(
            target: "sqlsage::trace",
            request_id = %event.request_id,
            identity = %event.identity,
            input_length = event.input_length,
            outcome = ?event.outcome,
            stage = %event.stage,
            error_kind = event.error_kind.unwrap_or("none"),
            index_built = event.index_built,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "request traced"
        );
        Ok(())
    }
}
