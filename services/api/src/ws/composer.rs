//! Builds the outbound answer: one JSON text frame followed by spoken audio.

use super::{protocol::RESPONSE_AUDIO_FORMAT, session::Connection};
use anyhow::{Context, Result};
use cue_core::{
    model::AnswerEnvelope,
    speech::{SpeechSynthesizer, SynthesisRequest, express_as},
};
use futures_util::StreamExt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Sends the single answer of a session.
///
/// `respond` consumes the composer, so a session can only ever answer once.
pub struct ResponseComposer<'a> {
    synthesizer: &'a dyn SpeechSynthesizer,
    voice: &'a str,
    json_log: PathBuf,
}

impl<'a> ResponseComposer<'a> {
    pub fn new(synthesizer: &'a dyn SpeechSynthesizer, voice: &'a str, json_log: PathBuf) -> Self {
        Self {
            synthesizer,
            voice,
            json_log,
        }
    }

    /// Delivers `envelope` and its spoken rendering.
    ///
    /// The serialized envelope is sent and written to the JSON log
    /// concurrently, from the same string. Synthesis failures end the answer
    /// early without an error; only transport failures are returned.
    pub async fn respond(self, conn: &mut Connection, envelope: &AnswerEnvelope) -> Result<()> {
        info!(status = %envelope.status, message = %envelope.message, "sending answer");
        let json = envelope.to_json().context("serializing answer")?;

        let (sent, logged) = tokio::join!(
            conn.send_text(json.clone()),
            tokio::fs::write(&self.json_log, json.as_bytes()),
        );
        if let Err(e) = logged {
            warn!(error = %e, "problem logging json");
        }
        sent.context("sending answer envelope")?;

        let request = SynthesisRequest {
            text: express_as(&envelope.message, envelope.status),
            voice: self.voice.to_string(),
            accept: RESPONSE_AUDIO_FORMAT.to_string(),
        };
        let mut audio = match self.synthesizer.synthesize(request).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "problem with TTS service");
                return Ok(());
            }
        };

        let mut frames = 0usize;
        while let Some(chunk) = audio.next().await {
            match chunk {
                Ok(data) => {
                    conn.send_binary(data).await.context("streaming answer audio")?;
                    frames += 1;
                }
                Err(e) => {
                    warn!(error = %e, frames, "problem with TTS stream");
                    return Ok(());
                }
            }
        }
        debug!(frames, "answer audio complete");
        Ok(())
    }
}
