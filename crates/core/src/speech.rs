//! Speech Recognition and Synthesis Contracts
//!
//! The session pipeline talks to speech backends only through the
//! `SpeechRecognizer` and `SpeechSynthesizer` traits defined here. Concrete
//! HTTP backends (Google Speech for recognition, Watson for synthesis) live
//! alongside them; streaming backends that need a socket live in the service.

use crate::model::{ErrorCode, Hypothesis, LanguageConfig, PhraseHints, Transcript, best_hypothesis};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Live audio handed to a recognizer. The stream ends when the sender side is dropped.
pub type AudioStream = mpsc::UnboundedReceiver<Bytes>;

/// Synthesized audio, delivered in the order the backend produced it.
pub type SpeechStream = BoxStream<'static, Result<Bytes, SynthesisError>>;

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognition backend unavailable: {0}")]
    Unavailable(String),
    #[error("recognition backend error: {0}")]
    Backend(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("synthesis backend error {status}: {body}")]
    Backend { status: u16, body: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A streaming speech-to-text backend.
///
/// Implementations consume `audio` while it is still being produced and
/// deliver exactly one result per call: the best final hypothesis, or a
/// transcript with zero confidence when there was none.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(
        &self,
        audio: AudioStream,
        hints: &PhraseHints,
        language: &LanguageConfig,
    ) -> Result<Transcript, RecognitionError>;
}

/// What to say, in which voice and format. `text` may carry SSML-like markup.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub accept: String,
}

/// A text-to-speech backend streaming its audio back chunk by chunk.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SpeechStream, SynthesisError>;
}

/// Wraps a message in expressive markup; failures are spoken apologetically.
pub fn express_as(message: &str, status: ErrorCode) -> String {
    let style = if status.is_ok() { "" } else { "Apology" };
    let message = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(r#"<express-as type="{style}">{message}</express-as>"#)
}

// --- Google Speech ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: &'a str,
    speech_contexts: Vec<SpeechContext<'a>>,
}

#[derive(Serialize)]
struct SpeechContext<'a> {
    phrases: &'a [String],
}

#[derive(Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Deserialize, Default)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

/// Recognizer backed by the Google Cloud Speech REST API.
///
/// Audio is drained from the stream as it arrives; the recognition request is
/// issued once the stream ends. Every result of a synchronous request is final.
pub struct GoogleSpeechRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleSpeechRecognizer {
    const DEFAULT_ENDPOINT: &'static str = "https://speech.googleapis.com/v1/speech:recognize";

    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, Self::DEFAULT_ENDPOINT.to_string())
    }

    pub fn with_endpoint(api_key: String, endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for GoogleSpeechRecognizer {
    async fn recognize(
        &self,
        mut audio: AudioStream,
        hints: &PhraseHints,
        language: &LanguageConfig,
    ) -> Result<Transcript, RecognitionError> {
        let mut pcm = Vec::new();
        while let Some(chunk) = audio.recv().await {
            pcm.extend_from_slice(&chunk);
        }
        debug!(audio_bytes = pcm.len(), "audio stream ended, requesting recognition");

        let body = RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: language.sample_rate_hertz,
                language_code: &language.language_code,
                speech_contexts: vec![SpeechContext {
                    phrases: hints.phrases(),
                }],
            },
            audio: RecognitionAudio {
                content: base64::engine::general_purpose::STANDARD.encode(&pcm),
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| RecognitionError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "Google Speech API error");
            return Err(RecognitionError::Backend(format!("{status}: {body}")));
        }

        let result: RecognizeResponse = response.json().await?;
        let hypotheses: Vec<Hypothesis> = result
            .results
            .into_iter()
            .flat_map(|r| r.alternatives)
            .map(|alt| Hypothesis {
                transcript: alt.transcript,
                confidence: alt.confidence,
                is_final: true,
            })
            .collect();

        let best = best_hypothesis(&hypotheses);
        info!(transcript = %best.text, confidence = best.confidence, "recognition complete");
        Ok(best)
    }
}

// --- Watson Text to Speech ---

/// Synthesizer backed by the IBM Watson Text to Speech REST API.
pub struct WatsonSynthesizer {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl WatsonSynthesizer {
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for WatsonSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SpeechStream, SynthesisError> {
        #[derive(Serialize)]
        struct Body<'a> {
            text: &'a str,
        }

        let response = self
            .client
            .post(format!("{}/v1/synthesize", self.url))
            .query(&[("voice", request.voice.as_str())])
            .header(reqwest::header::ACCEPT, request.accept.as_str())
            .basic_auth("apikey", Some(&self.api_key))
            .json(&Body {
                text: &request.text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SynthesisError::from))
            .boxed())
    }
}
