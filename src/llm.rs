//! LLM service boundary.
//!
//! The rest of the crate sees a single blocking text-in/text-out call through
//! [`LlmClient`]. [`HttpLlmClient`] talks to an OpenAI-compatible chat
//! completions endpoint; tests use a scripted double instead.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::Role;

pub const SYSTEM_PROMPT: &str = "You are CyberBud, a cybersecurity learning tool.

Be direct and concise. No fluff, no motivational phrases, no praise. Only useful information.

When explaining a concept:
1. **Define it** - plain terms first, then the technical definition
2. **Why it matters** - real-world relevance in security work
3. **How it works** - technical detail appropriate to the question
4. **Related concepts** - two or three terms to explore next

Use analogies only when they genuinely clarify. Prefer practical examples from real \
security scenarios. End with the content, not with offers to help further.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Reply text plus the history extended with this exchange.
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub text: String,
    pub history: Vec<Turn>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("rate limited by the LLM service")]
    RateLimited,

    #[error("LLM usage quota exceeded")]
    QuotaExceeded,

    #[error("LLM service error: {0}")]
    Service(String),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("no API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,
}

impl LlmError {
    pub fn is_usage_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited | LlmError::QuotaExceeded)
    }

    /// User-facing text. Usage limits get their own advice.
    pub fn advisory(&self) -> &'static str {
        match self {
            LlmError::QuotaExceeded => {
                "CyberBud has reached its usage limit. Please try again another day."
            }
            LlmError::RateLimited => {
                "CyberBud is getting too many requests right now. Please wait a minute and try again."
            }
            LlmError::MissingApiKey => {
                "No API key configured. Set OPENAI_API_KEY or add it to the config file."
            }
            LlmError::Service(_) | LlmError::Timeout(_) => {
                "Something went wrong with the AI service. Please try again in a moment."
            }
        }
    }
}

pub trait LlmClient {
    fn run(&self, prompt: &str, history: &[Turn]) -> Result<LlmReply, LlmError>;
}

/// Map a failed HTTP response onto the error taxonomy.
pub fn classify_http_error(status: u16, body: &str) -> LlmError {
    let code = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("code"))
                .and_then(|c| c.as_str())
                .map(String::from)
        });

    match code.as_deref() {
        Some("insufficient_quota") | Some("billing_hard_limit_reached") => {
            LlmError::QuotaExceeded
        }
        _ if status == 429 => LlmError::RateLimited,
        _ => LlmError::Service(format!("HTTP {}", status)),
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct HttpLlmClient {
    config: LlmConfig,
    client: reqwest::blocking::Client,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Service(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }
}

impl LlmClient for HttpLlmClient {
    fn run(&self, prompt: &str, history: &[Turn]) -> Result<LlmReply, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT,
        });
        messages.extend(history.iter().map(|t| ChatMessage {
            role: t.role.as_str(),
            content: &t.content,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        tracing::debug!(
            model = %self.config.model,
            history = history.len(),
            prompt_chars = prompt.len(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(self.url())
            .bearer_auth(api_key)
            .json(&ChatRequest {
                model: &self.config.model,
                messages,
            })
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout_secs)
                } else {
                    LlmError::Service(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let err = classify_http_error(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), error = %err, "LLM request failed");
            return Err(err);
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::Service(format!("invalid response body: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LlmError::Service("empty response".to_string()))?;

        let mut updated = history.to_vec();
        updated.push(Turn::user(prompt));
        updated.push(Turn::assistant(text.clone()));

        Ok(LlmReply {
            text,
            history: updated,
        })
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Replays queued replies in order and records every prompt it was sent.
    pub struct ScriptedLlm {
        replies: RefCell<VecDeque<Result<String, LlmError>>>,
        prompts: RefCell<Vec<String>>,
        calls: Cell<usize>,
    }

    impl ScriptedLlm {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                prompts: RefCell::new(Vec::new()),
                calls: Cell::new(0),
            }
        }

        pub fn replying(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
        }

        pub fn call_count(&self) -> usize {
            self.calls.get()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.borrow().clone()
        }
    }

    impl LlmClient for ScriptedLlm {
        fn run(&self, prompt: &str, history: &[Turn]) -> Result<LlmReply, LlmError> {
            self.calls.set(self.calls.get() + 1);
            self.prompts.borrow_mut().push(prompt.to_string());

            let text = self
                .replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Service("script exhausted".to_string())))?;

            let mut updated = history.to_vec();
            updated.push(Turn::user(prompt));
            updated.push(Turn::assistant(text.clone()));
            Ok(LlmReply {
                text,
                history: updated,
            })
        }
    }

    /// A reply in the exact format the quiz prompt asks for.
    pub fn well_formed_quiz(correct: char) -> String {
        format!(
            "QUESTION: What does a stateful firewall track?\n\
             A) Connection state\n\
             B) CPU temperature\n\
             C) Disk quotas\n\
             D) Screen brightness\n\
             CORRECT: {}\n\
             CORRECT_EXPLANATION: Stateful firewalls track connections.\n\
             A_EXPLANATION: Connection tracking is the defining feature.\n\
             B_EXPLANATION: Hardware sensors are unrelated.\n\
             C_EXPLANATION: Quotas belong to the filesystem.\n\
             D_EXPLANATION: Display settings are unrelated.",
            correct
        )
    }
}
