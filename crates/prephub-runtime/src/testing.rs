//! Scripted providers and stores for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheRecord, DurableStore, StoreError};
use crate::config::ProviderProfile;
use crate::pool::{Backend, BackendId, ProviderPool};
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, ProviderKind,
    TokenUsage,
};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
}

/// Shared record of which provider was called, in order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Provider that plays back a script. The last reply repeats forever.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Reply>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    log: Option<CallLog>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn script(replies: Vec<Reply>) -> Self {
        let last = replies
            .last()
            .cloned()
            .unwrap_or_else(|| Reply::Fail("empty script".to_string()));
        Self {
            name: "scripted".to_string(),
            script: Mutex::new(replies.into()),
            last: Mutex::new(last),
            delay: None,
            calls: AtomicUsize::new(0),
            log: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: impl Into<String>) -> Self {
        Self::script(vec![Reply::Text(text.into())])
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::script(vec![Reply::Fail(message.into())])
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_log(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn next_reply(&self) -> Reply {
        match self.script.lock().pop_front() {
            Some(reply) => {
                *self.last.lock() = reply.clone();
                reply
            }
            None => self.last.lock().clone(),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().push(self.name.clone());
        }
        self.prompts
            .lock()
            .extend(messages.into_iter().map(|m| m.content));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply() {
            Reply::Text(content) => Ok(CompletionResponse {
                content,
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            }),
            Reply::Fail(message) => Err(ProviderError::HttpError(message)),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Backend with default settings wrapping `provider`.
pub fn backend(kind: ProviderKind, index: usize, provider: Arc<dyn LlmProvider>) -> Backend {
    Backend::new(
        BackendId { kind, index },
        &ProviderProfile::defaults_for(kind),
        provider,
    )
}

/// Pool of Groq backends, one per provider, in the given order.
pub fn pool_of(providers: &[Arc<ScriptedProvider>]) -> ProviderPool {
    ProviderPool::new(
        providers
            .iter()
            .enumerate()
            .map(|(i, p)| backend(ProviderKind::Groq, i + 1, p.clone()))
            .collect(),
    )
}

/// Durable store whose reads and writes always fail.
pub struct BrokenStore;

#[async_trait]
impl DurableStore for BrokenStore {
    async fn find_one(&self, _key: &str) -> Result<Option<CacheRecord>, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn upsert(
        &self,
        _key: &str,
        _value: &Value,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }
}
