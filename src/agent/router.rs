//! Reasoning providers and failover routing
//!
//! Both providers speak the OpenAI-compatible chat-completions dialect, so
//! one client covers Groq (primary, low latency) and OpenAI (fallback). The
//! router tries the primary first and fails over on any provider error;
//! latency and token cost are measured per call for the session metrics.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One message in the chat-completions dialect
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<serde_json::Value>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

/// A tool call requested by the model, arguments still raw JSON text
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

/// What a single provider call produced
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
}

/// Chat-completions provider
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider name for logs and metrics
    fn name(&self) -> &'static str;

    /// Estimated cost in USD for a call with this usage
    fn cost_usd(&self, usage: TokenUsage) -> f64;

    /// Run one completion over the message history, optionally offering a
    /// tool catalog
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
    ) -> Result<ProviderReply>;
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    name: &'static str,
    base_url: &'static str,
    api_key: String,
    model: String,
    /// USD per million prompt / completion tokens
    pricing: (f64, f64),
}

impl OpenAiCompatProvider {
    /// Groq endpoint (primary)
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn groq(api_key: String, model: String) -> Result<Self> {
        Self::new(
            "groq",
            "https://api.groq.com/openai/v1/chat/completions",
            api_key,
            model,
            (0.59, 0.79),
        )
    }

    /// `OpenAI` endpoint (fallback)
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn openai(api_key: String, model: String) -> Result<Self> {
        Self::new(
            "openai",
            "https://api.openai.com/v1/chat/completions",
            api_key,
            model,
            (0.15, 0.60),
        )
    }

    fn new(
        name: &'static str,
        base_url: &'static str,
        api_key: String,
        model: String,
        pricing: (f64, f64),
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!("{name} API key required")));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            name,
            base_url,
            api_key,
            model,
            pricing,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    id: String,
    function: RawFunction,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    arguments: String,
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn cost_usd(&self, usage: TokenUsage) -> f64 {
        let (prompt_rate, completion_rate) = self.pricing;
        f64::from(usage.prompt_tokens) / 1_000_000.0 * prompt_rate
            + f64::from(usage.completion_tokens) / 1_000_000.0 * completion_rate
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
    ) -> Result<ProviderReply> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.7,
        });
        if let Some(tools) = tools {
            body["tools"] = tools.clone();
            body["tool_choice"] = serde_json::json!("auto");
        }

        let response = self
            .client
            .post(self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Reasoning(format!(
                "{} returned {status}: {body}",
                self.name
            )));
        }

        let parsed: CompletionResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Reasoning(format!("{} returned no choices", self.name)))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ProviderReply {
            content: choice.message.content,
            tool_calls,
            usage: parsed.usage.unwrap_or_default(),
        })
    }
}

/// What one routed reasoning call produced
#[derive(Debug, Clone)]
pub struct RouterResponse {
    pub content: Option<String>,
    pub tool_invocations: Vec<ToolCallRequest>,
    /// Provider that actually served the call
    pub provider: &'static str,
    pub latency_ms: u64,
    pub usage: TokenUsage,
    pub cost_usd: f64,
}

/// Primary-with-fallback reasoning router
pub struct ReasoningRouter {
    primary: Arc<dyn ChatProvider>,
    fallback: Option<Arc<dyn ChatProvider>>,
}

impl ReasoningRouter {
    /// Create a router over a primary and optional fallback provider
    #[must_use]
    pub fn new(primary: Arc<dyn ChatProvider>, fallback: Option<Arc<dyn ChatProvider>>) -> Self {
        Self { primary, fallback }
    }

    /// Run a reasoning call offering the tool catalog
    ///
    /// # Errors
    ///
    /// Returns error if every configured provider fails
    pub async fn submit(
        &self,
        messages: &[ChatMessage],
        catalog: &serde_json::Value,
    ) -> Result<RouterResponse> {
        self.route(messages, Some(catalog)).await
    }

    /// Run a follow-up reasoning call after tool results, without
    /// re-offering the catalog, so the model must produce spoken text
    ///
    /// # Errors
    ///
    /// Returns error if every configured provider fails
    pub async fn submit_follow_up(&self, messages: &[ChatMessage]) -> Result<RouterResponse> {
        self.route(messages, None).await
    }

    async fn route(
        &self,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
    ) -> Result<RouterResponse> {
        match self.call_one(&*self.primary, messages, tools).await {
            Ok(response) => Ok(response),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(primary_err);
                };
                tracing::warn!(
                    provider = self.primary.name(),
                    error = %primary_err,
                    "primary reasoning provider failed, trying fallback"
                );
                self.call_one(&**fallback, messages, tools).await
            }
        }
    }

    async fn call_one(
        &self,
        provider: &dyn ChatProvider,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
    ) -> Result<RouterResponse> {
        let started = Instant::now();
        let reply = provider.complete(messages, tools).await?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::debug!(
            provider = provider.name(),
            latency_ms,
            tool_calls = reply.tool_calls.len(),
            "reasoning call completed"
        );

        Ok(RouterResponse {
            cost_usd: provider.cost_usd(reply.usage),
            content: reply.content,
            tool_invocations: reply.tool_calls,
            provider: provider.name(),
            latency_ms,
            usage: reply.usage,
        })
    }
}
