//! Per-call session state
//!
//! One `CallSession` exists per phone call, created on the transport start
//! event and destroyed after the call log is persisted. History is
//! append-only; the appointment draft fills incrementally and never rolls
//! back within a call.

pub mod orchestrator;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::agent::{ChatMessage, RouterResponse, ToolCallRequest};

pub use orchestrator::{Orchestrator, SessionDeps, SessionEvent};

/// Lifecycle of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    AwaitingStart,
    Initializing,
    Listening,
    Thinking,
    Speaking,
    Terminating,
    Closed,
}

impl CallState {
    /// Whether moving to `next` is a legal transition
    #[must_use]
    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::AwaitingStart, Self::Initializing)
                | (Self::Initializing, Self::Listening)
                | (Self::Listening, Self::Thinking)
                | (Self::Thinking, Self::Speaking | Self::Listening)
                | (Self::Speaking, Self::Listening)
                | (
                    Self::Initializing | Self::Listening | Self::Thinking | Self::Speaking,
                    Self::Terminating
                )
                | (Self::Terminating, Self::Closed)
        )
    }
}

/// One exchange unit in conversation history
#[derive(Debug, Clone)]
pub enum Turn {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        /// Raw wire tool calls, echoed back to the provider on the
        /// follow-up turn
        invocations: Vec<ToolCallRequest>,
    },
    ToolResult {
        invocation_id: String,
        payload: serde_json::Value,
    },
}

/// Who said a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Caller,
    Assistant,
}

impl Speaker {
    const fn label(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Assistant => "assistant",
        }
    }
}

/// One line of the post-call transcript
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Appointment data assembled over the course of the call
#[derive(Debug, Clone, Default)]
pub struct AppointmentDraft {
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub preferred_date: Option<String>,
    pub preferred_time: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub timezone_offset_minutes: Option<i32>,
    pub caller_local_time: Option<String>,
    pub caller_timezone: Option<Tz>,
    pub booked: bool,
    pub appointment_id: Option<String>,
    pub provider_event_id: Option<String>,
}

/// Reasoning-cost counters accumulated over the call
#[derive(Debug, Clone, Default)]
pub struct CallMetrics {
    pub reasoning_calls: u32,
    pub total_latency_ms: u64,
    pub total_cost_usd: f64,
    pub last_provider: Option<&'static str>,
}

/// Complete state of one phone call
#[derive(Debug)]
pub struct CallSession {
    pub call_id: String,
    pub stream_id: String,
    pub caller_number: String,
    pub callee_number: String,
    pub started_at: DateTime<Utc>,
    pub history: Vec<Turn>,
    pub transcript: Vec<TranscriptEntry>,
    pub draft: AppointmentDraft,
    pub metrics: CallMetrics,
}

impl CallSession {
    /// Create a session from the transport start event
    #[must_use]
    pub fn new(
        call_id: String,
        stream_id: String,
        caller_number: String,
        callee_number: String,
    ) -> Self {
        let draft = AppointmentDraft {
            caller_phone: Some(caller_number.clone()),
            ..AppointmentDraft::default()
        };
        Self {
            call_id,
            stream_id,
            caller_number,
            callee_number,
            started_at: Utc::now(),
            history: Vec::new(),
            transcript: Vec::new(),
            draft,
            metrics: CallMetrics::default(),
        }
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    pub fn log_utterance(&mut self, speaker: Speaker, text: &str) {
        self.transcript.push(TranscriptEntry {
            speaker,
            text: text.to_string(),
            at: Utc::now(),
        });
    }

    pub fn record_reasoning(&mut self, response: &RouterResponse) {
        self.metrics.reasoning_calls += 1;
        self.metrics.total_latency_ms += response.latency_ms;
        self.metrics.total_cost_usd += response.cost_usd;
        self.metrics.last_provider = Some(response.provider);
    }

    /// Render history in the chat-completions dialect for the router
    #[must_use]
    pub fn render_history(&self) -> Vec<ChatMessage> {
        self.history
            .iter()
            .map(|turn| match turn {
                Turn::System { content } => ChatMessage::System {
                    content: content.clone(),
                },
                Turn::User { content } => ChatMessage::User {
                    content: content.clone(),
                },
                Turn::Assistant {
                    content,
                    invocations,
                } => ChatMessage::Assistant {
                    content: content.clone(),
                    tool_calls: if invocations.is_empty() {
                        None
                    } else {
                        Some(serde_json::Value::Array(
                            invocations
                                .iter()
                                .map(|call| {
                                    serde_json::json!({
                                        "id": call.id,
                                        "type": "function",
                                        "function": {
                                            "name": call.name,
                                            "arguments": call.arguments,
                                        }
                                    })
                                })
                                .collect(),
                        ))
                    },
                },
                Turn::ToolResult {
                    invocation_id,
                    payload,
                } => ChatMessage::Tool {
                    content: payload.to_string(),
                    tool_call_id: invocation_id.clone(),
                },
            })
            .collect()
    }

    /// Speaker-tagged transcript, one line per utterance
    #[must_use]
    pub fn transcript_text(&self) -> String {
        self.transcript
            .iter()
            .map(|entry| format!("{}: {}", entry.speaker.label(), entry.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_is_enforced() {
        use CallState::{
            AwaitingStart, Closed, Initializing, Listening, Speaking, Terminating, Thinking,
        };

        assert!(AwaitingStart.can_transition(Initializing));
        assert!(Initializing.can_transition(Listening));
        assert!(Listening.can_transition(Thinking));
        assert!(Thinking.can_transition(Speaking));
        assert!(Thinking.can_transition(Listening)); // apology path
        assert!(Speaking.can_transition(Listening));
        assert!(Thinking.can_transition(Terminating));
        assert!(Terminating.can_transition(Closed));

        assert!(!AwaitingStart.can_transition(Listening));
        assert!(!Listening.can_transition(Speaking));
        assert!(!Closed.can_transition(Terminating));
        assert!(!Terminating.can_transition(Listening));
    }

    #[test]
    fn session_seeds_draft_phone_from_caller() {
        let session = CallSession::new(
            "CA1".to_string(),
            "MZ1".to_string(),
            "+15550001111".to_string(),
            "+15559990000".to_string(),
        );
        assert_eq!(session.draft.caller_phone.as_deref(), Some("+15550001111"));
        assert!(!session.draft.booked);
    }

    #[test]
    fn transcript_renders_speaker_tagged_lines() {
        let mut session = CallSession::new(
            "CA1".to_string(),
            "MZ1".to_string(),
            "+15550001111".to_string(),
            "+15559990000".to_string(),
        );
        session.log_utterance(Speaker::Assistant, "How can I help?");
        session.log_utterance(Speaker::Caller, "I need a cleaning");

        assert_eq!(
            session.transcript_text(),
            "assistant: How can I help?\ncaller: I need a cleaning"
        );
    }
}
