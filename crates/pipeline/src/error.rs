use std::fmt;
use std::time::Duration;

use serde::Serialize;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Steps of one request, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Translate,
    Materialize,
    Index,
    Synthesize,
    Persist,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Translate => "translate",
            Stage::Materialize => "materialize",
            Stage::Index => "index",
            Stage::Synthesize => "synthesize",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a request.  `Display` and `source()` carry operator
/// detail; [`user_message`](Self::user_message) is what end users see.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("translation failed: {reason}")]
    Translation {
        reason: String,
        raw_candidate: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("query execution failed for `{query}`")]
    Execution {
        query: String,
        #[source]
        source: BoxError,
    },

    #[error("building the answer index failed")]
    Indexing {
        #[source]
        source: BoxError,
    },

    #[error("answer synthesis failed")]
    Synthesis {
        #[source]
        source: BoxError,
    },

    #[error("{stage} stage timed out after {limit:?}")]
    Timeout { stage: Stage, limit: Duration },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Translation { .. } => Stage::Translate,
            PipelineError::Execution { .. } => Stage::Materialize,
            PipelineError::Indexing { .. } => Stage::Index,
            PipelineError::Synthesis { .. } => Stage::Synthesize,
            PipelineError::Timeout { stage, .. } => *stage,
        }
    }

    /// Short machine-readable kind, used as a tracing tag.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Translation { .. } => "translation_failure",
            PipelineError::Execution { .. } => "execution_failure",
            PipelineError::Indexing { .. } => "indexing_failure",
            PipelineError::Synthesis { .. } => "synthesis_failure",
            PipelineError::Timeout { .. } => "timeout_failure",
        }
    }

    /// Message safe to show to the person who asked.  Never includes SQL,
    /// driver errors or model output.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Translation { .. } => {
                "Sorry, I couldn't turn that question into a database query. Could you rephrase it?"
                    .to_string()
            }
            PipelineError::Execution { .. } => {
                "Sorry, I couldn't fetch data for that question. Try rephrasing it or naming the data you need."
                    .to_string()
            }
            PipelineError::Indexing { .. } => {
                "Sorry, something went wrong while preparing the results. Please try again.".to_string()
            }
            PipelineError::Synthesis { .. } => {
                "Sorry, I couldn't put together an answer right now. Please try again.".to_string()
            }
            PipelineError::Timeout { .. } => {
                "Sorry, that took too long to answer. Please try again in a moment.".to_string()
            }
        }
    }

    /// Full cause chain for logs.
    pub fn detail(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push_str(": ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }

    pub(crate) fn translation(reason: impl Into<String>, raw_candidate: Option<String>) -> Self {
        PipelineError::Translation {
            reason: reason.into(),
            raw_candidate,
            source: None,
        }
    }

    pub(crate) fn execution(query: impl Into<String>, err: anyhow::Error) -> Self {
        PipelineError::Execution {
            query: query.into(),
            source: err.into(),
        }
    }

    pub(crate) fn indexing(err: anyhow::Error) -> Self {
        PipelineError::Indexing { source: err.into() }
    }

    pub(crate) fn synthesis(err: anyhow::Error) -> Self {
        PipelineError::Synthesis { source: err.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_hide_internals() {
        let err = PipelineError::execution(
            "SELECT * FROM nope",
            anyhow::anyhow!("no such table: nope"),
        );
        assert_eq!(err.stage(), Stage::Materialize);
        assert_eq!(err.kind(), "execution_failure");
        assert!(!err.user_message().contains("nope"));
        assert!(err.detail().contains("no such table: nope"));
        assert!(err.detail().contains("SELECT * FROM nope"));
    }

    #[test]
    fn timeout_carries_its_stage() {
        let err = PipelineError::Timeout {
            stage: Stage::Synthesize,
            limit: Duration::from_secs(3),
        };
        assert_eq!(err.stage(), Stage::Synthesize);
        assert_eq!(err.to_string(), "synthesize stage timed out after 3s");
    }

    #[test]
    fn translation_without_source() {
        let err = PipelineError::translation("empty statement", Some("```sql\n```".into()));
        assert_eq!(err.stage(), Stage::Translate);
        assert!(std::error::Error::source(&err).is_none());
        assert_eq!(err.detail(), "translation failed: empty statement");
    }
}
