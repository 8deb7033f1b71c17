//! Duplicates incoming client audio to the recognizer and the raw session log.

use bytes::Bytes;
use cue_core::speech::AudioStream;
use tokio::{fs::File, io::AsyncWriteExt, sync::mpsc};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The raw audio log could not be written or flushed.
    #[error("problem logging audio: {0}")]
    Log(#[from] std::io::Error),
    /// The recognizer stopped consuming audio.
    #[error("recognizer stopped accepting audio")]
    RecognizerClosed,
    #[error("audio sink is closed")]
    Closed,
}

/// Fan-out writer feeding the recognition stream and the raw audio log.
///
/// The recognizer side is an unbounded channel, so a slow recognizer never
/// holds up the log and vice versa. Both consumers see the same bytes in
/// the same order.
pub struct AudioSink {
    recognizer: Option<mpsc::UnboundedSender<Bytes>>,
    log: Option<File>,
    bytes_written: u64,
}

impl AudioSink {
    /// Creates a sink logging to `log` and returns the stream for the recognizer.
    pub fn new(log: File) -> (Self, AudioStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                recognizer: Some(tx),
                log: Some(log),
                bytes_written: 0,
            },
            rx,
        )
    }

    /// Writes a chunk to both consumers.
    ///
    /// The chunk is logged before it is handed to the recognizer, so a
    /// `RecognizerClosed` error still leaves the log complete.
    pub async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        let log = self.log.as_mut().ok_or(SinkError::Closed)?;
        log.write_all(&chunk).await?;
        self.bytes_written += chunk.len() as u64;

        let recognizer = self.recognizer.as_ref().ok_or(SinkError::Closed)?;
        recognizer
            .send(chunk)
            .map_err(|_| SinkError::RecognizerClosed)
    }

    /// Ends the recognizer stream and flushes the log. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<(), SinkError> {
        self.recognizer.take();
        if let Some(mut log) = self.log.take() {
            log.flush().await?;
            log.sync_all().await?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.log.is_none()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
