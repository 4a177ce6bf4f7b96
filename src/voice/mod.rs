//! Speech adapters
//!
//! Streaming transcription and synthesis sit behind narrow traits so the
//! session loop can run against fakes in tests.

pub mod stt;
pub mod tts;

pub use stt::{DeepgramStt, SpeechToText, SttSession};
pub use tts::{ElevenLabsTts, SpeechSynth, SynthStream};
