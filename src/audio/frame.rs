//! Fixed-size outbound framing with real-time pacing
//!
//! The transport expects 20 ms µ-law frames (160 bytes at 8 kHz) delivered
//! no faster than playback; overrunning it drops audio on the far end.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::{Error, Result};

use super::ulaw::SILENCE;

/// Bytes per outbound frame (20 ms of 8 kHz µ-law)
pub const FRAME_BYTES: usize = 160;

/// Real-time interval between outbound frames
pub const FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// Outbound frame channel feeding the transport writer
pub type FrameSink = mpsc::Sender<Vec<u8>>;

/// Paces frames out of audio that arrives in arbitrary-sized chunks
///
/// Bytes are buffered across pushes so frame boundaries stay independent of
/// chunk boundaries, and every frame rides the same 20 ms cadence. The first
/// complete frame leaves as soon as it is buffered; nothing waits for the
/// source to finish.
pub struct FramePacer {
    interval: tokio::time::Interval,
    pending: Vec<u8>,
}

impl FramePacer {
    #[must_use]
    pub fn new() -> Self {
        let mut interval = tokio::time::interval(FRAME_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self {
            interval,
            pending: Vec::new(),
        }
    }

    /// Append payload bytes and send every complete frame now buffered
    ///
    /// # Errors
    ///
    /// Returns error if the sink is closed before all frames are sent.
    pub async fn send(&mut self, sink: &FrameSink, payload: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(payload);
        while self.pending.len() >= FRAME_BYTES {
            self.interval.tick().await;
            let frame: Vec<u8> = self.pending.drain(..FRAME_BYTES).collect();
            sink.send(frame)
                .await
                .map_err(|_| Error::Transport("outbound frame sink closed".to_string()))?;
        }
        Ok(())
    }

    /// Flush any tail bytes as a final silence-padded frame
    ///
    /// # Errors
    ///
    /// Returns error if the sink is closed.
    pub async fn finish(mut self, sink: &FrameSink) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.interval.tick().await;
        self.pending.resize(FRAME_BYTES, SILENCE);
        sink.send(self.pending)
            .await
            .map_err(|_| Error::Transport("outbound frame sink closed".to_string()))
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new()
    }
}

/// Send a complete µ-law payload as paced 20 ms frames
///
/// The final frame is padded with µ-law silence. Returns once every frame
/// has been handed to the sink.
///
/// # Errors
///
/// Returns error if the sink is closed before all frames are sent.
pub async fn send_paced(sink: &FrameSink, payload: &[u8]) -> Result<()> {
    let mut pacer = FramePacer::new();
    pacer.send(sink, payload).await?;
    pacer.finish(sink).await
}
