//! Speech recognition backends selectable at startup.

pub mod openai;

use crate::config::{Config, RecognitionProvider};
use anyhow::{Context, Result};
use cue_core::speech::{GoogleSpeechRecognizer, SpeechRecognizer};
use std::sync::Arc;
use tracing::info;

/// Builds the recognizer named by `RECOGNITION_PROVIDER`.
pub fn build_recognizer(config: &Config) -> Result<Arc<dyn SpeechRecognizer>> {
    info!(provider = ?config.recognition_provider, "configuring speech recognition");
    let recognizer: Arc<dyn SpeechRecognizer> = match config.recognition_provider {
        RecognitionProvider::Google => {
            let key = config
                .google_api_key
                .clone()
                .context("GOOGLE_API_KEY is required for google recognition")?;
            Arc::new(GoogleSpeechRecognizer::new(key))
        }
        RecognitionProvider::OpenAI => {
            let key = config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY is required for openai recognition")?;
            Arc::new(openai::RealtimeTranscriber::new(
                key,
                config.transcription_model.clone(),
            ))
        }
    };
    Ok(recognizer)
}
