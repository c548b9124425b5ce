//! A model bound to one role in the pipeline: model name, sampling
//! temperature, per-attempt timeout and retry policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::{ChatModel, CompletionRequest, LlmError};

/// Bounded retry with exponential backoff.  Only errors for which
/// [`LlmError::is_transient`] holds are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub async fn run<F, Fut, T>(&self, operation: &str, mut attempt_fn: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0u32;
        let mut delay = self.initial_delay;

        loop {
            attempt += 1;
            match attempt_fn().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt <= self.max_retries => {
                    warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "transient model failure, retrying"
                    );
                    sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Clone)]
pub struct ModelHandle {
    client: Arc<dyn ChatModel>,
    model: String,
    temperature: f32,
    timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ModelHandle {
    pub fn new(client: Arc<dyn ChatModel>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Run one completion.  Each attempt is bounded by the handle's timeout;
    /// an attempt that overruns yields [`LlmError::Timeout`].
    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            temperature: self.temperature,
        };
        let client = &self.client;
        let limit = self.timeout;
        self.retry
            .run(&self.model, move || async move {
                match timeout(limit, client.complete(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout(limit)),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn passes_model_and_temperature_through() {
        let model = Arc::new(ScriptedModel::new(["SELECT 1"]));
        let handle = ModelHandle::new(model.clone(), "sql-model", 0.0);
        assert_eq!(handle.complete("prompt").await.unwrap(), "SELECT 1");

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "sql-model");
        assert_eq!(calls[0].temperature, 0.0);
        assert_eq!(calls[0].prompt, "prompt");
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        model.push_err(LlmError::Status { status: 503, body: "busy".into() });
        model.push_err(LlmError::Status { status: 429, body: "slow down".into() });
        model.push_ok("ok");

        let handle = ModelHandle::new(model.clone(), "m", 0.4).with_retry(fast_retry(2));
        assert_eq!(handle.complete("p").await.unwrap(), "ok");
        assert_eq!(model.calls().len(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        for _ in 0..5 {
            model.push_err(LlmError::Status { status: 500, body: String::new() });
        }
        let handle = ModelHandle::new(model.clone(), "m", 0.4).with_retry(fast_retry(1));
        assert!(handle.complete("p").await.is_err());
        assert_eq!(model.calls().len(), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        model.push_err(LlmError::Status { status: 401, body: "bad key".into() });
        model.push_ok("never reached");
        let handle = ModelHandle::new(model.clone(), "m", 0.0).with_retry(fast_retry(3));
        assert!(matches!(
            handle.complete("p").await,
            Err(LlmError::Status { status: 401, .. })
        ));
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let model = Arc::new(
            ScriptedModel::new(["late"]).with_delay(Duration::from_millis(200)),
        );
        let handle = ModelHandle::new(model, "m", 0.0)
            .with_timeout(Duration::from_millis(10))
            .with_retry(RetryPolicy::none());
        let err = handle.complete("p").await.unwrap_err();
        assert!(err.is_timeout());
    }
}
