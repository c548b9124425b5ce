//! In-process [`ChatModel`] fakes for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::{ChatModel, CompletionRequest, LlmError};

/// Owned copy of a [`CompletionRequest`] as seen by a fake.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
}

impl From<CompletionRequest<'_>> for RecordedCall {
    fn from(request: CompletionRequest<'_>) -> Self {
        Self {
            model: request.model.to_string(),
            prompt: request.prompt.to_string(),
            temperature: request.temperature,
        }
    }
}

/// Replies from a queue in order; fails with [`LlmError::Unavailable`] once
/// the queue is empty.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(&self, reply: impl Into<String>) {
        self.lock_replies().push_back(Ok(reply.into()));
    }

    pub fn push_err(&self, err: LlmError) {
        self.lock_replies().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, LlmError>>> {
        match self.replies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, LlmError> {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(request.into()),
            Err(poisoned) => poisoned.into_inner().push(request.into()),
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.lock_replies()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Unavailable("script exhausted".to_string())))
    }
}

/// Computes each reply from the request, for fakes that need to react to
/// prompt content.
pub struct FnModel<F> {
    reply: F,
}

impl<F> FnModel<F>
where
    F: Fn(CompletionRequest<'_>) -> Result<String, LlmError> + Send + Sync,
{
    pub fn new(reply: F) -> Self {
        Self { reply }
    }
}

#[async_trait]
impl<F> ChatModel for FnModel<F>
where
    F: Fn(CompletionRequest<'_>) -> Result<String, LlmError> + Send + Sync,
{
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, LlmError> {
        (self.reply)(request)
    }
}
