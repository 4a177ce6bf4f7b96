//! Shared fakes for driving a call session without any network

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Semaphore};

use bookline::agent::{ChatMessage, ChatProvider, ProviderReply, ReasoningRouter, TokenUsage, ToolCallRequest};
use bookline::booking::{Calendar, InMemoryCalendar};
use bookline::config::{BusinessConfig, Config, ProviderConfig};
use bookline::db::{init_memory, AppointmentRepo, CallLogRepo};
use bookline::session::SessionDeps;
use bookline::tools::ToolExecutor;
use bookline::voice::{SpeechSynth, SpeechToText, SttSession, SynthStream};
use bookline::{Error, Result};

/// Transcription fake; transcripts are injected straight into the session
/// event channel by tests, so the stream itself just swallows audio
pub struct FakeStt {
    keepalive: Mutex<Option<mpsc::Sender<String>>>,
}

impl FakeStt {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            keepalive: Mutex::new(None),
        })
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn start_stream(&self) -> Result<SttSession> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
        tokio::spawn(async move { while audio_rx.recv().await.is_some() {} });

        let (transcript_tx, transcript_rx) = mpsc::channel(16);
        *self.keepalive.lock().await = Some(transcript_tx);
        Ok(SttSession::from_parts(audio_tx, transcript_rx))
    }
}

/// Transcription fake handing each stream's transcript sender to the test,
/// so live streams can be fed or killed at will; `start_stream` attempts
/// beyond `streams_allowed` fail
pub struct ManualStt {
    pub senders: Mutex<Vec<mpsc::Sender<String>>>,
    streams_allowed: usize,
    opened: Mutex<usize>,
}

impl ManualStt {
    pub fn new(streams_allowed: usize) -> Arc<Self> {
        Arc::new(Self {
            senders: Mutex::new(Vec::new()),
            streams_allowed,
            opened: Mutex::new(0),
        })
    }
}

#[async_trait]
impl SpeechToText for ManualStt {
    async fn start_stream(&self) -> Result<SttSession> {
        let mut opened = self.opened.lock().await;
        if *opened >= self.streams_allowed {
            return Err(Error::Stt("socket refused".to_string()));
        }
        *opened += 1;

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
        tokio::spawn(async move { while audio_rx.recv().await.is_some() {} });

        let (transcript_tx, transcript_rx) = mpsc::channel(16);
        self.senders.lock().await.push(transcript_tx);
        Ok(SttSession::from_parts(audio_tx, transcript_rx))
    }
}

/// Synthesis fake recording everything the agent speaks; each utterance
/// streams back as a single short chunk
#[derive(Default)]
pub struct FakeTts {
    pub spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSynth for FakeTts {
    async fn refresh_if_idle(&self) {}

    async fn synthesize(&self, text: &str) -> Result<SynthStream> {
        self.spoken.lock().await.push(text.to_string());
        let (tx, rx) = mpsc::channel(4);
        let _ = tx.send(vec![0i16; 160]).await;
        Ok(rx)
    }
}

/// Synthesis fake that yields an opening chunk immediately and holds the
/// tail of every utterance until the test releases a permit
pub struct GatedTts {
    pub release: Arc<Semaphore>,
    pub spoken: Mutex<Vec<String>>,
}

impl GatedTts {
    pub fn new(release: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            release,
            spoken: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SpeechSynth for GatedTts {
    async fn refresh_if_idle(&self) {}

    async fn synthesize(&self, text: &str) -> Result<SynthStream> {
        self.spoken.lock().await.push(text.to_string());
        let (tx, rx) = mpsc::channel(4);
        let release = self.release.clone();
        tokio::spawn(async move {
            // Three frames up front, the rest after the gate opens
            if tx.send(vec![0i16; 480]).await.is_err() {
                return;
            }
            let Ok(permit) = release.acquire().await else {
                return;
            };
            permit.forget();
            let _ = tx.send(vec![0i16; 160]).await;
        });
        Ok(rx)
    }
}

/// Reasoning fake serving a fixed script of replies in order
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ProviderReply>>,
    /// Whether each call offered the tool catalog, in call order
    pub catalog_offered: Mutex<Vec<bool>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ProviderReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            catalog_offered: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn cost_usd(&self, _usage: TokenUsage) -> f64 {
        0.0
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
    ) -> Result<ProviderReply> {
        self.catalog_offered.lock().await.push(tools.is_some());
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| Error::Reasoning("script exhausted".to_string()))
    }
}

/// A scripted text-only reply
pub fn say(text: &str) -> ProviderReply {
    ProviderReply {
        content: Some(text.to_string()),
        tool_calls: Vec::new(),
        usage: TokenUsage::default(),
    }
}

/// A scripted reply invoking one tool
pub fn invoke(id: &str, name: &str, arguments: &str) -> ProviderReply {
    ProviderReply {
        content: None,
        tool_calls: vec![ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
        usage: TokenUsage::default(),
    }
}

pub fn business() -> BusinessConfig {
    BusinessConfig {
        name: "Lakeside Dental".to_string(),
        timezone: "America/New_York".to_string(),
        open_hour: 9,
        close_hour: 17,
        default_duration_minutes: 30,
    }
}

/// Everything a scenario test needs to drive and observe a session
pub struct Harness {
    pub deps: SessionDeps,
    pub tts: Arc<FakeTts>,
    pub provider: Arc<ScriptedProvider>,
    pub appointments: AppointmentRepo,
    pub call_logs: CallLogRepo,
}

pub fn harness(replies: Vec<ProviderReply>) -> Harness {
    let pool = init_memory().expect("memory db");
    let appointments = AppointmentRepo::new(pool.clone());
    let call_logs = CallLogRepo::new(pool);

    let provider = ScriptedProvider::new(replies);
    let router = Arc::new(ReasoningRouter::new(provider.clone(), None));

    let calendar: Arc<dyn Calendar> =
        Arc::new(InMemoryCalendar::new(&business()).expect("calendar"));
    let executor = Arc::new(
        ToolExecutor::new(calendar, None, appointments.clone(), business()).expect("executor"),
    );

    let tts = Arc::new(FakeTts::default());
    let config = Config {
        business: business(),
        providers: ProviderConfig {
            groq_api_key: Some("test".to_string()),
            ..ProviderConfig::default()
        },
        data_dir: std::path::PathBuf::from("."),
    };

    let deps = SessionDeps {
        config: Arc::new(config),
        stt: FakeStt::new(),
        tts: tts.clone(),
        router,
        executor,
        call_logs: call_logs.clone(),
    };

    Harness {
        deps,
        tts,
        provider,
        appointments,
        call_logs,
    }
}

/// Poll until the agent has spoken at least `count` utterances
pub async fn wait_for_spoken(spoken: &Mutex<Vec<String>>, count: usize) -> Vec<String> {
    for _ in 0..400 {
        {
            let spoken = spoken.lock().await;
            if spoken.len() >= count {
                return spoken.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("agent never spoke {count} utterances");
}
