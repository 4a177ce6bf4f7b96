//! Reasoning engine
//!
//! Chat-completion providers behind a trait, a router that fails over from
//! the primary to the fallback, and the prompt text the conversation runs on.

pub mod prompt;
pub mod router;

pub use router::{
    ChatMessage, ChatProvider, OpenAiCompatProvider, ProviderReply, ReasoningRouter,
    RouterResponse, TokenUsage, ToolCallRequest,
};
