//! Streaming speech-to-text over the Deepgram live socket
//!
//! Audio flows in continuously for the lifetime of a call; finalized
//! utterances flow back out on an mpsc channel. Interim results are
//! dropped at the adapter so the session loop only ever sees complete
//! utterances.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::{Error, Result};

/// A live transcription stream for one call
pub struct SttSession {
    /// Raw 8 kHz linear PCM bytes (little-endian i16) go in here
    pub audio_tx: mpsc::Sender<Vec<u8>>,
    transcripts: Option<mpsc::Receiver<String>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl SttSession {
    /// Assemble a session from raw channel halves; used by in-process
    /// transcription fakes
    #[must_use]
    pub const fn from_parts(
        audio_tx: mpsc::Sender<Vec<u8>>,
        transcripts: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            audio_tx,
            transcripts: Some(transcripts),
            reader: None,
            writer: None,
        }
    }

    /// Take the finalized-transcript receiver; yields `None` after the
    /// first call
    pub fn take_transcripts(&mut self) -> Option<mpsc::Receiver<String>> {
        self.transcripts.take()
    }

    /// Tear the stream down; safe to call after the tasks have exited
    pub fn close(&self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
        if let Some(writer) = &self.writer {
            writer.abort();
        }
    }
}

/// Streaming transcription provider
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Open a live transcription stream
    async fn start_stream(&self) -> Result<SttSession>;
}

/// Deepgram live transcription client
pub struct DeepgramStt {
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct LiveResponse {
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
    channel: Option<LiveChannel>,
}

#[derive(Debug, Deserialize)]
struct LiveChannel {
    alternatives: Vec<LiveAlternative>,
}

#[derive(Debug, Deserialize)]
struct LiveAlternative {
    transcript: String,
}

impl DeepgramStt {
    /// Create a new Deepgram client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "Deepgram API key required for STT".to_string(),
            ));
        }
        Ok(Self { api_key, model })
    }

    fn stream_url(&self) -> String {
        format!(
            "wss://api.deepgram.com/v1/listen\
             ?encoding=linear16&sample_rate=8000&channels=1\
             &model={}&smart_format=true&interim_results=true&endpointing=300",
            self.model
        )
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn start_stream(&self) -> Result<SttSession> {
        let mut request = self
            .stream_url()
            .into_client_request()
            .map_err(|e| Error::Stt(format!("invalid stream url: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key))
            .map_err(|e| Error::Stt(format!("invalid API key header: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| Error::Stt(format!("Deepgram connect failed: {e}")))?;
        let (mut ws_tx, mut ws_rx) = socket.split();

        tracing::debug!(model = %self.model, "deepgram stream opened");

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
        let (transcript_tx, transcripts) = mpsc::channel::<String>(16);

        let writer = tokio::spawn(async move {
            while let Some(chunk) = audio_rx.recv().await {
                if ws_tx.send(Message::Binary(chunk)).await.is_err() {
                    tracing::warn!("deepgram socket closed while sending audio");
                    return;
                }
            }
            // Audio side hung up; ask Deepgram to flush and close.
            let _ = ws_tx
                .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()))
                .await;
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = ws_rx.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };

                let Ok(parsed) = serde_json::from_str::<LiveResponse>(&text) else {
                    continue;
                };
                if let Some(utterance) = finalized_transcript(&parsed) {
                    if transcript_tx.send(utterance).await.is_err() {
                        break;
                    }
                }
            }
            tracing::debug!("deepgram stream ended");
        });

        Ok(SttSession {
            audio_tx,
            transcripts: Some(transcripts),
            reader: Some(reader),
            writer: Some(writer),
        })
    }
}

/// Extract the utterance text from a finalized result, if any
fn finalized_transcript(response: &LiveResponse) -> Option<String> {
    if !response.is_final || !response.speech_final {
        return None;
    }
    let transcript = response
        .channel
        .as_ref()?
        .alternatives
        .first()?
        .transcript
        .trim();
    if transcript.is_empty() {
        None
    } else {
        Some(transcript.to_string())
    }
}
