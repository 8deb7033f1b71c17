//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the process-wide,
//! read-only resources every voice session borrows: the speech and calendar
//! collaborators, the recognition phrase hints and the connection counter.

use crate::config::Config;
use cue_core::{
    calendar::ActionExecutor,
    intent::IntentResolver,
    model::{LanguageConfig, PhraseHints},
    speech::{SpeechRecognizer, SpeechSynthesizer},
};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// Hands out monotonic connection numbers used to correlate log lines.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    counter: AtomicU64,
}

impl SessionRegistry {
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

/// Per-session knobs taken from the configuration.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub log_dir: PathBuf,
    pub voice: String,
    pub stage_timeout: Option<Duration>,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            log_dir: config.log_dir.clone(),
            voice: config.tts_voice.clone(),
            stage_timeout: config.stage_timeout,
        }
    }
}

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub intent_resolver: Arc<dyn IntentResolver>,
    pub executor: Arc<dyn ActionExecutor>,
    pub hints: Arc<PhraseHints>,
    pub language: Arc<LanguageConfig>,
    pub registry: Arc<SessionRegistry>,
    pub settings: Arc<SessionSettings>,
}
