//! Audio codec adapter for the telephony transport
//!
//! The transport carries 8-bit G.711 µ-law at 8 kHz; the speech services
//! speak 16-bit linear PCM. Conversion runs in both directions in fixed
//! 20 ms frames paced to real time.

pub mod frame;
pub mod ringback;
pub mod ulaw;

pub use frame::{send_paced, FramePacer, FrameSink, FRAME_BYTES, FRAME_INTERVAL};
pub use ringback::ringback_pattern;
pub use ulaw::{decode_slice, encode_slice, ulaw_decode, ulaw_encode};

/// Telephony sample rate in Hz
pub const SAMPLE_RATE: u32 = 8000;
