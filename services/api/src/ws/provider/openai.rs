//! Streams session audio to the OpenAI Realtime API for transcription.

use crate::audio_utils::{self, StreamResampler};
use async_trait::async_trait;
use cue_core::{
    model::{Hypothesis, LanguageConfig, PhraseHints, Transcript, best_hypothesis},
    speech::{AudioStream, RecognitionError, SpeechRecognizer},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

// --- Local Realtime transcription event types ---
mod realtime_types {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    #[serde(tag = "type")]
    pub(super) enum ServerEvent {
        #[serde(rename = "conversation.item.input_audio_transcription.delta")]
        TranscriptionDelta { delta: String },
        #[serde(rename = "conversation.item.input_audio_transcription.completed")]
        TranscriptionCompleted {
            transcript: String,
            #[serde(default)]
            logprobs: Option<Vec<LogProb>>,
        },
        #[serde(rename = "error")]
        Error { error: ApiError },
        #[serde(other)]
        Other,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct LogProb {
        pub logprob: f64,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ApiError {
        pub message: String,
    }
}

use realtime_types::{LogProb, ServerEvent};

/// Recognizer that forwards audio to OpenAI as it arrives.
///
/// Client audio is resampled from 16 kHz to the 24 kHz the API expects. The
/// input buffer is committed once the audio stream ends, and the session
/// finishes with the first completed transcription after that.
pub struct RealtimeTranscriber {
    url: String,
    api_key: String,
    model: String,
}

impl RealtimeTranscriber {
    const DEFAULT_URL: &'static str = "wss://api.openai.com/v1/realtime?intent=transcription";

    pub fn new(api_key: String, model: String) -> Self {
        Self {
            url: Self::DEFAULT_URL.to_string(),
            api_key,
            model,
        }
    }

    fn session_update(&self, hints: &PhraseHints, language: &LanguageConfig) -> serde_json::Value {
        let language = language
            .language_code
            .split('-')
            .next()
            .unwrap_or("en")
            .to_lowercase();
        json!({
            "type": "transcription_session.update",
            "session": {
                "input_audio_format": "pcm16",
                "input_audio_transcription": {
                    "model": self.model,
                    "language": language,
                    "prompt": hints.phrases().join(", "),
                },
                "turn_detection": null,
                "include": ["item.input_audio_transcription.logprobs"],
            }
        })
    }
}

/// Confidence of a transcription as the geometric mean token probability.
fn confidence_from_logprobs(logprobs: Option<&[LogProb]>) -> f32 {
    match logprobs {
        Some(probs) if !probs.is_empty() => {
            let mean = probs.iter().map(|p| p.logprob).sum::<f64>() / probs.len() as f64;
            mean.exp().clamp(0.0, 1.0) as f32
        }
        _ => 1.0,
    }
}

fn unavailable(e: impl std::fmt::Display) -> RecognitionError {
    RecognitionError::Unavailable(e.to_string())
}

fn append_event(samples: &[i16]) -> WsMessage {
    let event = json!({
        "type": "input_audio_buffer.append",
        "audio": audio_utils::encode_i16(samples),
    });
    WsMessage::Text(event.to_string().into())
}

#[async_trait]
impl SpeechRecognizer for RealtimeTranscriber {
    async fn recognize(
        &self,
        mut audio: AudioStream,
        hints: &PhraseHints,
        language: &LanguageConfig,
    ) -> Result<Transcript, RecognitionError> {
        let mut request = self.url.as_str().into_client_request().map_err(unavailable)?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", self.api_key).parse().map_err(unavailable)?,
        );
        request
            .headers_mut()
            .insert("OpenAI-Beta", "realtime=v1".parse().map_err(unavailable)?);

        let (ws_stream, _) = connect_async(request).await.map_err(unavailable)?;
        let (mut openai_tx, mut openai_rx) = ws_stream.split();
        info!("Connected to OpenAI Realtime API.");

        let update = self.session_update(hints, language).to_string();
        openai_tx
            .send(WsMessage::Text(update.into()))
            .await
            .map_err(unavailable)?;

        let mut resampler = StreamResampler::new(
            f64::from(language.sample_rate_hertz),
            audio_utils::OPENAI_REALTIME_API_PCM16_SAMPLE_RATE,
        )
        .map_err(|e| RecognitionError::Backend(e.to_string()))?;

        let mut hypotheses: Vec<Hypothesis> = Vec::new();
        let mut committed = false;
        loop {
            tokio::select! {
                chunk = audio.recv(), if !committed => {
                    let end_of_audio = chunk.is_none();
                    let samples = match chunk {
                        Some(data) => resampler.push(&data),
                        None => resampler.finish(),
                    }
                    .map_err(|e| RecognitionError::Backend(e.to_string()))?;
                    if !samples.is_empty() {
                        openai_tx.send(append_event(&samples)).await.map_err(unavailable)?;
                    }
                    if end_of_audio {
                        let commit = json!({ "type": "input_audio_buffer.commit" }).to_string();
                        openai_tx.send(WsMessage::Text(commit.into())).await.map_err(unavailable)?;
                        committed = true;
                        debug!("Audio committed for transcription.");
                    }
                },
                msg = openai_rx.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(ServerEvent::TranscriptionCompleted { transcript, logprobs }) => {
                            hypotheses.push(Hypothesis {
                                confidence: confidence_from_logprobs(logprobs.as_deref()),
                                transcript,
                                is_final: true,
                            });
                            if committed {
                                break;
                            }
                        }
                        Ok(ServerEvent::TranscriptionDelta { delta }) => {
                            hypotheses.push(Hypothesis { transcript: delta, confidence: 0.0, is_final: false });
                        }
                        Ok(ServerEvent::Error { error }) => {
                            warn!(message = %error.message, "OpenAI Realtime API error");
                            return Err(RecognitionError::Backend(error.message));
                        }
                        Ok(ServerEvent::Other) => {}
                        Err(e) => warn!(error = %e, "Unrecognized realtime event."),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!(?frame, "OpenAI closed the transcription session.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(RecognitionError::Backend(e.to_string())),
                    None => break,
                },
            }
        }

        let _ = openai_tx.close().await;
        let best = best_hypothesis(&hypotheses);
        info!(transcript = %best.text, confidence = best.confidence, "recognition complete");
        Ok(best)
    }
}
