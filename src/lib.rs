//! Bookline - voice-driven appointment booking gateway
//!
//! Answers phone calls, converses with the caller, and books appointments:
//! telephony audio is bridged through streaming transcription, a tool-using
//! reasoning loop, and streaming synthesis, while a per-call orchestrator
//! keeps dialogue and booking state consistent.

pub mod agent;
pub mod audio;
pub mod booking;
pub mod config;
pub mod db;
pub mod error;
pub mod session;
pub mod telephony;
pub mod timezone;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{CallSession, CallState, Orchestrator, SessionDeps, SessionEvent};
