//! Streaming text-to-speech via `ElevenLabs`
//!
//! Synthesis yields raw 8 kHz linear PCM chunk by chunk as the provider
//! streams it, ready for µ-law companding; playback starts on the first
//! chunk rather than after the last. The provider drops connections that
//! sit idle, so the client tracks its last use and rebuilds the connection
//! pool when a threshold has passed.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::{Error, Result};

/// Rebuild the connection pool after this much idle time
const IDLE_REFRESH: Duration = Duration::from_secs(20);

/// In-flight sample chunks before the decoder task backpressures
const CHUNK_BUFFER: usize = 32;

/// Sample chunks emitted as synthesis progresses; the channel closes when
/// the utterance is complete or the stream fails
pub type SynthStream = mpsc::Receiver<Vec<i16>>;

/// Streaming synthesis provider
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Rebuild the underlying connection if it has sat idle too long.
    /// Called before synthesis so the first chunk is not delayed by a
    /// stale-connection retry.
    async fn refresh_if_idle(&self);

    /// Synthesize text to 8 kHz linear PCM, emitting sample chunks as they
    /// arrive from the provider
    async fn synthesize(&self, text: &str) -> Result<SynthStream>;
}

/// `ElevenLabs` streaming TTS client
pub struct ElevenLabsTts {
    client: Mutex<reqwest::Client>,
    last_use: Mutex<Instant>,
    api_key: String,
    voice_id: String,
    model: String,
}

impl ElevenLabsTts {
    /// Create a new `ElevenLabs` client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, voice_id: String) -> Result<Self> {
        Self::new_with_model(api_key, voice_id, "eleven_turbo_v2_5".to_string())
    }

    /// Create a new `ElevenLabs` client with a custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_with_model(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: Mutex::new(reqwest::Client::new()),
            last_use: Mutex::new(Instant::now()),
            api_key,
            voice_id,
            model,
        })
    }
}

#[async_trait]
impl SpeechSynth for ElevenLabsTts {
    async fn refresh_if_idle(&self) {
        let mut last_use = self.last_use.lock().await;
        if last_use.elapsed() >= IDLE_REFRESH {
            tracing::debug!(
                idle_secs = last_use.elapsed().as_secs(),
                "rebuilding tts connection pool"
            );
            *self.client.lock().await = reqwest::Client::new();
        }
        *last_use = Instant::now();
    }

    async fn synthesize(&self, text: &str) -> Result<SynthStream> {
        #[derive(serde::Serialize)]
        struct SynthesisRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}/stream?output_format=pcm_8000",
            self.voice_id
        );

        let client = self.client.lock().await.clone();
        let response = client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&SynthesisRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs error {status}: {body}")));
        }

        *self.last_use.lock().await = Instant::now();

        // Decode and forward each HTTP chunk as it lands; the receiver can
        // start playback while the rest of the utterance is still in flight
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_BUFFER);
        let chars = text.len();
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut carry: Option<u8> = None;
            let mut total = 0usize;
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        tracing::warn!(%error, "synthesis stream error");
                        return;
                    }
                };
                let mut samples = Vec::with_capacity(chunk.len() / 2 + 1);
                accumulate_pcm(&mut samples, &mut carry, &chunk);
                if samples.is_empty() {
                    continue;
                }
                total += samples.len();
                if chunk_tx.send(samples).await.is_err() {
                    return;
                }
            }
            tracing::debug!(chars, samples = total, "synthesized");
        });

        Ok(chunk_rx)
    }
}

/// Fold a chunk of little-endian i16 bytes into the sample buffer.
/// Chunk boundaries can split a sample; the odd byte carries over.
fn accumulate_pcm(samples: &mut Vec<i16>, carry: &mut Option<u8>, chunk: &[u8]) {
    let mut bytes = chunk;
    if let Some(low) = carry.take() {
        if let Some((&high, rest)) = bytes.split_first() {
            samples.push(i16::from_le_bytes([low, high]));
            bytes = rest;
        } else {
            *carry = Some(low);
            return;
        }
    }

    let mut pairs = bytes.chunks_exact(2);
    for pair in &mut pairs {
        samples.push(i16::from_le_bytes([pair[0], pair[1]]));
    }
    if let [odd] = pairs.remainder() {
        *carry = Some(*odd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_accumulation_survives_split_samples() {
        let full: Vec<u8> = [100i16, -200, 300, -400]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        // One shot
        let mut samples = Vec::new();
        let mut carry = None;
        accumulate_pcm(&mut samples, &mut carry, &full);
        assert_eq!(samples, vec![100, -200, 300, -400]);
        assert!(carry.is_none());

        // Split mid-sample at every possible boundary
        for split in 0..full.len() {
            let mut samples = Vec::new();
            let mut carry = None;
            accumulate_pcm(&mut samples, &mut carry, &full[..split]);
            accumulate_pcm(&mut samples, &mut carry, &full[split..]);
            assert_eq!(samples, vec![100, -200, 300, -400], "split at {split}");
        }
    }

    #[test]
    fn missing_api_key_is_rejected() {
        assert!(ElevenLabsTts::new(String::new(), "voice".to_string()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_threshold_is_respected() {
        let tts = ElevenLabsTts::new("xi_key".to_string(), "voice".to_string()).unwrap();

        // Fresh client: refresh is a no-op but bumps last_use
        tts.refresh_if_idle().await;
        let before = *tts.last_use.lock().await;

        tokio::time::advance(IDLE_REFRESH + Duration::from_secs(1)).await;
        tts.refresh_if_idle().await;
        let after = *tts.last_use.lock().await;
        assert!(after > before);
    }
}
