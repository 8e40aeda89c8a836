//! AI Decision Gateway: yes/no fit classification and focused summaries.
//!
//! `classify` owns the retry contract: transport errors, empty answers and
//! malformed bodies are retried with backoff, and exhaustion yields
//! `Classification::Unknown`, never a silent NO.
//!
//! `FilterChain` holds an `Arc<dyn DecisionGateway>`; tests swap in fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::llm_client::prompts::{classify_prompt, summarize_prompt};
use crate::llm_client::{ChatCompletion, ChatRequest, LlmError};
use crate::retry::{retry_with_backoff, BackoffPolicy, RetryOutcome};

pub const AFFIRMATIVE: &str = "YES";
pub const SUMMARY_WARNING_PREFIX: &str = "AI_WARNING:";
pub const SUMMARY_ERROR_PREFIX: &str = "AI_ERROR:";

const CLASSIFY_MAX_TOKENS: u32 = 65_535;
const CLASSIFY_REASONING_EFFORT: &str = "medium";
const SUMMARY_MAX_TOKENS: u32 = 1_024;
const SUMMARY_TEMPERATURE: f32 = 0.1;
const SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Yes,
    No,
    /// Retries exhausted; the caller must treat this as inconclusive.
    Unknown,
}

impl Classification {
    /// Any occurrence of the affirmative token, case-insensitive, is a YES.
    pub fn from_answer(answer: &str) -> Self {
        if answer.to_uppercase().contains(AFFIRMATIVE) {
            Classification::Yes
        } else {
            Classification::No
        }
    }
}

#[async_trait]
pub trait DecisionGateway: Send + Sync {
    async fn classify(&self, document: &str, criteria: &str) -> Classification;

    /// Never fails: problems come back as text starting with
    /// `SUMMARY_WARNING_PREFIX` or `SUMMARY_ERROR_PREFIX`.
    async fn summarize(&self, document: &str, focus: &str) -> String;
}

/// Gateway backed by a chat-completion transport.
pub struct LlmGateway {
    transport: Arc<dyn ChatCompletion>,
    model: String,
    policy: BackoffPolicy,
}

impl LlmGateway {
    pub fn new(transport: Arc<dyn ChatCompletion>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            policy: BackoffPolicy::exponential(3, Duration::from_secs(1)),
        }
    }
}

#[async_trait]
impl DecisionGateway for LlmGateway {
    async fn classify(&self, document: &str, criteria: &str) -> Classification {
        let request = ChatRequest::user(
            &self.model,
            classify_prompt(criteria, document),
            CLASSIFY_MAX_TOKENS,
        )
        .with_reasoning_effort(CLASSIFY_REASONING_EFFORT);

        let outcome = retry_with_backoff(&self.policy, "AI classification", |_| {
            self.transport.complete(&request)
        })
        .await;

        match outcome {
            RetryOutcome::Success { value, attempts } => {
                let verdict = Classification::from_answer(&value);
                debug!("AI classification {verdict:?} after {attempts} attempt(s)");
                verdict
            }
            RetryOutcome::Exhausted { last_error, attempts } => {
                warn!("AI classification gave up after {attempts} attempts: {last_error}");
                Classification::Unknown
            }
        }
    }

    async fn summarize(&self, document: &str, focus: &str) -> String {
        let request = ChatRequest::user(
            &self.model,
            summarize_prompt(document, focus),
            SUMMARY_MAX_TOKENS,
        )
        .with_temperature(SUMMARY_TEMPERATURE)
        .with_timeout(SUMMARY_TIMEOUT);

        match self.transport.complete(&request).await {
            Ok(text) => text,
            Err(LlmError::EmptyContent) => format!("{SUMMARY_WARNING_PREFIX} 返回内容为空。"),
            Err(e) => {
                warn!("AI summary failed: {e}");
                format!("{SUMMARY_ERROR_PREFIX} {e}")
            }
        }
    }
}
