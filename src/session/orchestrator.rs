//! Per-call event loop
//!
//! One orchestrator runs per phone call, consuming a single event channel
//! fed by the telephony transport and the transcription stream. Turn
//! processing is strictly sequential; audio ingestion is continuous and
//! independent of the turn loop.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tokio::sync::mpsc;

use crate::agent::{prompt, ReasoningRouter};
use crate::audio::{decode_slice, encode_slice, ringback_pattern, send_paced, FramePacer, FrameSink};
use crate::config::Config;
use crate::db::{CallLog, CallLogRepo};
use crate::session::{CallSession, CallState, Speaker, Turn};
use crate::tools::{catalog, ToolExecutor};
use crate::voice::{SpeechSynth, SpeechToText, SttSession};
use crate::{Error, Result};

/// Queued events per session; at 20 ms per media frame this is about ten
/// seconds of backpressure before the transport reader stalls
const EVENT_BUFFER: usize = 512;

/// Trailing delay after the wrap-up tool fires, so the goodbye finishes
/// playing before the streams close
const END_CALL_GRACE: Duration = Duration::from_secs(6);

/// Times the transcription stream may be reopened within one call before
/// the session gives up and winds down
const MAX_STT_REOPENS: u8 = 2;

/// Events feeding one call session
#[derive(Debug)]
pub enum SessionEvent {
    /// Transport opened the duplex media session
    Start {
        call_id: String,
        stream_id: String,
        caller_number: String,
        callee_number: String,
    },
    /// One inbound µ-law frame, already base64-decoded
    Media { payload: Vec<u8> },
    /// A finalized utterance from the transcription stream
    Transcript { text: String },
    /// The transcription stream ended on its own, mid-call
    TranscriptsClosed,
    /// Ringback playback finished; synthesis may now connect
    FillerComplete,
    /// Transport closed the session
    Stop,
}

/// Shared adapters injected into every session
#[derive(Clone)]
pub struct SessionDeps {
    pub config: Arc<Config>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn SpeechSynth>,
    pub router: Arc<ReasoningRouter>,
    pub executor: Arc<ToolExecutor>,
    pub call_logs: CallLogRepo,
}

/// Drives one call session from start event to call-log persistence
pub struct Orchestrator {
    deps: SessionDeps,
    events: mpsc::Receiver<SessionEvent>,
    events_tx: mpsc::Sender<SessionEvent>,
    outbound: FrameSink,
    state: CallState,
    session: Option<CallSession>,
    stt_session: Option<SttSession>,
    stt_reopens: u8,
    /// Latest utterance spoken over the ringback, replayed once LISTENING
    pending_transcript: Option<String>,
    end_after_speaking: bool,
}

impl Orchestrator {
    /// Create an orchestrator; the returned sender is handed to the
    /// transport to feed events in
    #[must_use]
    pub fn new(deps: SessionDeps, outbound: FrameSink) -> (mpsc::Sender<SessionEvent>, Self) {
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let orchestrator = Self {
            deps,
            events,
            events_tx: events_tx.clone(),
            outbound,
            state: CallState::AwaitingStart,
            session: None,
            stt_session: None,
            stt_reopens: 0,
            pending_transcript: None,
            end_after_speaking: false,
        };
        (events_tx, orchestrator)
    }

    /// Run the session to completion
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
            if self.state == CallState::Closed {
                return;
            }
        }
        // Transport dropped the channel without a stop event
        self.finalize().await;
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Start {
                call_id,
                stream_id,
                caller_number,
                callee_number,
            } => {
                if self.state == CallState::AwaitingStart {
                    if let Err(error) = self
                        .initialize(call_id, stream_id, caller_number, callee_number)
                        .await
                    {
                        tracing::error!(%error, "session initialization failed");
                        self.finalize().await;
                    }
                } else {
                    tracing::warn!(state = ?self.state, "duplicate start event ignored");
                }
            }
            SessionEvent::Media { payload } => self.ingest_audio(&payload).await,
            SessionEvent::FillerComplete => {
                if self.state == CallState::Initializing {
                    self.greet().await;
                }
            }
            SessionEvent::Transcript { text } => match self.state {
                CallState::Listening => self.turn(text).await,
                CallState::Initializing => {
                    tracing::debug!("caller spoke over the filler; holding the utterance");
                    self.pending_transcript = Some(text);
                }
                state => {
                    tracing::debug!(?state, "transcript outside LISTENING dropped");
                }
            },
            SessionEvent::TranscriptsClosed => self.recover_transcription().await,
            SessionEvent::Stop => self.finalize().await,
        }
    }

    async fn initialize(
        &mut self,
        call_id: String,
        stream_id: String,
        caller_number: String,
        callee_number: String,
    ) -> Result<()> {
        tracing::info!(%call_id, %caller_number, "call started");

        let mut session = CallSession::new(call_id, stream_id, caller_number, callee_number);
        session.push_turn(Turn::System {
            content: prompt::system_prompt(
                &self.deps.config.business,
                &session.caller_number,
                Utc::now(),
            ),
        });
        self.session = Some(session);
        self.advance(CallState::Initializing);

        self.open_transcription().await?;

        // Ringback fills the line while setup completes. Synthesis connects
        // only after it finishes: its transport idle-timeout is shorter than
        // the ringback interval.
        let outbound = self.outbound.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let pattern = encode_slice(&ringback_pattern());
            if let Err(error) = send_paced(&outbound, &pattern).await {
                tracing::debug!(%error, "ringback playback cut short");
            }
            let _ = events_tx.send(SessionEvent::FillerComplete).await;
        });

        Ok(())
    }

    /// Open the transcription stream and forward its finalized utterances
    /// into the session event channel, so the loop stays single-threaded.
    /// Stream termination comes back through the same channel.
    async fn open_transcription(&mut self) -> Result<()> {
        if let Some(old) = self.stt_session.take() {
            old.close();
        }

        let mut stt_session = self.deps.stt.start_stream().await?;
        let transcripts = stt_session
            .take_transcripts()
            .ok_or_else(|| Error::Session("transcript stream already taken".to_string()))?;
        self.stt_session = Some(stt_session);

        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let mut transcripts = transcripts;
            while let Some(text) = transcripts.recv().await {
                if events_tx.send(SessionEvent::Transcript { text }).await.is_err() {
                    return;
                }
            }
            let _ = events_tx.send(SessionEvent::TranscriptsClosed).await;
        });

        Ok(())
    }

    /// The transcription stream died mid-call. Reopen it a bounded number
    /// of times; past that, say goodbye and wind the call down rather than
    /// leave the caller talking to a dead line.
    async fn recover_transcription(&mut self) {
        if matches!(
            self.state,
            CallState::AwaitingStart | CallState::Terminating | CallState::Closed
        ) {
            return;
        }

        if self.stt_reopens < MAX_STT_REOPENS {
            self.stt_reopens += 1;
            match self.open_transcription().await {
                Ok(()) => {
                    tracing::warn!(attempt = self.stt_reopens, "transcription stream reopened");
                    return;
                }
                Err(error) => tracing::error!(%error, "transcription reopen failed"),
            }
        } else {
            tracing::error!("transcription stream lost after repeated reopens");
        }

        self.speak(prompt::HEARING_TROUBLE).await;
        self.finalize().await;
    }

    async fn greet(&mut self) {
        let greeting = prompt::greeting(&self.deps.config.business.name);
        self.speak(&greeting).await;
        self.advance(CallState::Listening);

        if let Some(text) = self.pending_transcript.take() {
            self.turn(text).await;
        }
    }

    async fn ingest_audio(&mut self, payload: &[u8]) {
        if matches!(
            self.state,
            CallState::AwaitingStart | CallState::Terminating | CallState::Closed
        ) {
            return;
        }
        let Some(stt) = &self.stt_session else { return };

        let pcm = decode_slice(payload);
        let mut bytes = Vec::with_capacity(pcm.len() * 2);
        for sample in pcm {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        if stt.audio_tx.send(bytes).await.is_err() {
            tracing::debug!("stt audio channel closed");
        }
    }

    async fn turn(&mut self, text: String) {
        tracing::debug!(transcript = %text, "caller utterance");
        if let Some(session) = self.session.as_mut() {
            session.log_utterance(Speaker::Caller, &text);
            session.push_turn(Turn::User { content: text });
        }
        self.advance(CallState::Thinking);

        let reply = match self.think().await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(%error, "turn failed, apologizing");
                let apology = prompt::APOLOGY.to_string();
                if let Some(session) = self.session.as_mut() {
                    session.push_turn(Turn::Assistant {
                        content: Some(apology.clone()),
                        invocations: Vec::new(),
                    });
                }
                apology
            }
        };

        self.advance(CallState::Speaking);
        self.speak(&reply).await;

        if self.end_after_speaking {
            self.advance(CallState::Terminating);
            tokio::time::sleep(END_CALL_GRACE).await;
            self.finalize().await;
        } else {
            self.advance(CallState::Listening);
        }
    }

    /// The two-stage reasoning flow: one call with the tool catalog, then —
    /// when tools were invoked — a follow-up call without it so the model
    /// narrates the outcomes instead of speaking tool mechanics
    async fn think(&mut self) -> Result<String> {
        let tool_catalog = catalog();
        let history = self.session_ref()?.render_history();
        let first = self.deps.router.submit(&history, &tool_catalog).await?;
        self.session_mut()?.record_reasoning(&first);

        if first.tool_invocations.is_empty() {
            let content = non_empty_or_apology(sanitize(first.content.as_deref().unwrap_or("")));
            self.session_mut()?.push_turn(Turn::Assistant {
                content: Some(content.clone()),
                invocations: Vec::new(),
            });
            return Ok(content);
        }

        let invocations = first.tool_invocations.clone();
        self.session_mut()?.push_turn(Turn::Assistant {
            content: first.content.clone(),
            invocations: invocations.clone(),
        });

        let executor = Arc::clone(&self.deps.executor);
        let now = Utc::now();
        let mut ending = false;
        {
            let session = self
                .session
                .as_mut()
                .ok_or_else(|| Error::Session("no active session".to_string()))?;
            for request in &invocations {
                let result = executor
                    .execute_request(request, &mut session.draft, now)
                    .await;
                ending |= result.end_call;
                session.push_turn(Turn::ToolResult {
                    invocation_id: result.invocation_id,
                    payload: result.payload,
                });
            }
        }
        self.end_after_speaking |= ending;

        let history = self.session_ref()?.render_history();
        let follow = self.deps.router.submit_follow_up(&history).await?;
        self.session_mut()?.record_reasoning(&follow);

        let content = non_empty_or_apology(sanitize(follow.content.as_deref().unwrap_or("")));
        self.session_mut()?.push_turn(Turn::Assistant {
            content: Some(content.clone()),
            invocations: Vec::new(),
        });
        Ok(content)
    }

    /// Synthesize and play one utterance, pacing each sample chunk out as
    /// it arrives so the caller hears the opening of a long reply while the
    /// tail is still being synthesized
    async fn speak(&mut self, text: &str) {
        if let Some(session) = self.session.as_mut() {
            session.log_utterance(Speaker::Assistant, text);
        }

        self.deps.tts.refresh_if_idle().await;
        let mut chunks = match self.deps.tts.synthesize(text).await {
            Ok(chunks) => chunks,
            Err(error) => {
                tracing::warn!(%error, "synthesis failed, utterance skipped");
                return;
            }
        };

        let mut pacer = FramePacer::new();
        while let Some(samples) = chunks.recv().await {
            let payload = encode_slice(&samples);
            if let Err(error) = pacer.send(&self.outbound, &payload).await {
                tracing::warn!(%error, "outbound playback failed");
                return;
            }
        }
        if let Err(error) = pacer.finish(&self.outbound).await {
            tracing::warn!(%error, "outbound playback failed");
        }
    }

    /// Close streams, persist the call log, and move to CLOSED. Safe to call
    /// repeatedly; anything after the first call is a no-op.
    async fn finalize(&mut self) {
        if self.state == CallState::Closed {
            return;
        }
        if self.state == CallState::AwaitingStart {
            // Stop before start: nothing to persist
            self.state = CallState::Closed;
            return;
        }
        if self.state != CallState::Terminating {
            self.advance(CallState::Terminating);
        }

        if let Some(stt) = self.stt_session.take() {
            stt.close();
        }

        if let Some(session) = self.session.take() {
            let ended_at = Utc::now();
            let log = CallLog {
                id: String::new(),
                call_id: session.call_id.clone(),
                caller_number: session.caller_number.clone(),
                callee_number: session.callee_number.clone(),
                started_at: session.started_at,
                ended_at,
                duration_seconds: (ended_at - session.started_at).num_seconds(),
                transcript: session.transcript_text(),
                appointment_booked: session.draft.booked,
                appointment_id: session.draft.appointment_id.clone(),
                reasoning_calls: session.metrics.reasoning_calls,
                total_latency_ms: session.metrics.total_latency_ms,
                total_cost_usd: session.metrics.total_cost_usd,
                last_provider: session.metrics.last_provider.map(str::to_string),
            };
            match self.deps.call_logs.create(&log) {
                Ok(id) => tracing::info!(
                    call_id = %log.call_id,
                    log_id = %id,
                    duration_s = log.duration_seconds,
                    booked = log.appointment_booked,
                    reasoning_calls = log.reasoning_calls,
                    cost_usd = log.total_cost_usd,
                    "call completed"
                ),
                Err(error) => tracing::error!(%error, "call log persistence failed"),
            }
        }

        self.advance(CallState::Closed);
    }

    fn advance(&mut self, next: CallState) {
        if self.state.can_transition(next) {
            tracing::debug!(from = ?self.state, to = ?next, "session state");
            self.state = next;
        } else {
            tracing::warn!(from = ?self.state, to = ?next, "illegal transition ignored");
        }
    }

    fn session_ref(&self) -> Result<&CallSession> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::Session("no active session".to_string()))
    }

    fn session_mut(&mut self) -> Result<&mut CallSession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Session("no active session".to_string()))
    }
}

fn tool_syntax() -> &'static Regex {
    static TOOL_SYNTAX: OnceLock<Regex> = OnceLock::new();
    TOOL_SYNTAX.get_or_init(|| {
        Regex::new(
            r#"(?s)<function[^>]*>.*?(</function>|$)|<tool_call>.*?(</tool_call>|$)|<\|[^|]+\|>|\{\s*"name"\s*:\s*"[A-Za-z_]+"\s*,\s*"arguments"\s*:[^}]*\}\s*\}?"#,
        )
        .expect("tool-syntax pattern is valid")
    })
}

/// Strip structured-call syntax the model sometimes leaks into spoken text
fn sanitize(content: &str) -> String {
    let stripped = tool_syntax().replace_all(content, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty_or_apology(content: String) -> String {
    if content.is_empty() {
        prompt::APOLOGY.to_string()
    } else {
        content
    }
}
