//! Shared fixtures for the service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use cue_api::{
    router::create_router,
    state::{AppState, SessionRegistry, SessionSettings},
};
use cue_core::{
    calendar::{ActionExecutor, ExecuteError},
    intent::PatternIntentResolver,
    model::{Action, LanguageConfig, PhraseHints, ResolvedAction, Transcript},
    speech::{
        AudioStream, RecognitionError, SpeechRecognizer, SpeechStream, SpeechSynthesizer,
        SynthesisError, SynthesisRequest,
    },
};
use futures_util::{SinkExt, StreamExt, stream};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

pub type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// What the fake recognizer does once the audio stream ends.
#[derive(Clone)]
pub enum Recognition {
    Heard(&'static str, f32),
    Unavailable,
    Hang,
}

/// Drains the audio stream like a real backend, then answers as scripted.
pub struct FakeRecognizer {
    pub outcome: Recognition,
    pub received: Arc<Mutex<Vec<u8>>>,
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn recognize(
        &self,
        mut audio: AudioStream,
        _hints: &PhraseHints,
        _language: &LanguageConfig,
    ) -> Result<Transcript, RecognitionError> {
        while let Some(chunk) = audio.recv().await {
            self.received.lock().unwrap().extend_from_slice(&chunk);
        }
        match self.outcome {
            Recognition::Heard(text, confidence) => Ok(Transcript {
                text: text.to_string(),
                confidence,
            }),
            Recognition::Unavailable => Err(RecognitionError::Unavailable("offline".into())),
            Recognition::Hang => std::future::pending().await,
        }
    }
}

/// How the fake synthesizer answers.
#[derive(Clone, Copy, Default)]
pub enum Speech {
    /// Two audio chunks.
    #[default]
    Plays,
    /// The backend refuses the request.
    Unavailable,
    /// One chunk, then the stream fails.
    BreaksOff,
}

fn backend_error() -> SynthesisError {
    SynthesisError::Backend {
        status: 503,
        body: "unavailable".into(),
    }
}

/// Answers as scripted and records what it was asked to say.
#[derive(Default)]
pub struct FakeSynthesizer {
    pub speech: Speech,
    pub requests: Arc<Mutex<Vec<SynthesisRequest>>>,
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SpeechStream, SynthesisError> {
        self.requests.lock().unwrap().push(request);
        let chunks = match self.speech {
            Speech::Plays => vec![
                Ok(Bytes::from_static(b"RIFF")),
                Ok(Bytes::from_static(b"WAVE")),
            ],
            Speech::Unavailable => return Err(backend_error()),
            Speech::BreaksOff => vec![Ok(Bytes::from_static(b"RIFF")), Err(backend_error())],
        };
        Ok(stream::iter(chunks).boxed())
    }
}

/// Accepts or refuses every reminder and records the token it was given.
pub struct FakeExecutor {
    pub accept: bool,
    pub tokens: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ActionExecutor for FakeExecutor {
    async fn execute(&self, token: &str, action: Action) -> Result<ResolvedAction, ExecuteError> {
        self.tokens.lock().unwrap().push(token.to_string());
        if !self.accept {
            return Err(ExecuteError::Save("status 500 Internal Server Error".into()));
        }
        Ok(ResolvedAction {
            recipients: Vec::new(),
            action: action.action,
            due: action.due,
        })
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub log_dir: tempfile::TempDir,
    pub received_audio: Arc<Mutex<Vec<u8>>>,
    pub synthesized: Arc<Mutex<Vec<SynthesisRequest>>>,
    pub tokens: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    /// Serves the real router over fake collaborators on an ephemeral port.
    pub async fn start(outcome: Recognition, accept: bool, stage_timeout: Option<Duration>) -> Self {
        Self::start_with(outcome, accept, stage_timeout, Speech::Plays).await
    }

    pub async fn start_with(
        outcome: Recognition,
        accept: bool,
        stage_timeout: Option<Duration>,
        speech: Speech,
    ) -> Self {
        let log_dir = tempfile::tempdir().unwrap();
        let recognizer = FakeRecognizer {
            outcome,
            received: Arc::default(),
        };
        let synthesizer = FakeSynthesizer {
            speech,
            ..FakeSynthesizer::default()
        };
        let executor = FakeExecutor {
            accept,
            tokens: Arc::default(),
        };
        let received_audio = recognizer.received.clone();
        let synthesized = synthesizer.requests.clone();
        let tokens = executor.tokens.clone();

        let state = Arc::new(AppState {
            recognizer: Arc::new(recognizer),
            synthesizer: Arc::new(synthesizer),
            intent_resolver: Arc::new(PatternIntentResolver),
            executor: Arc::new(executor),
            hints: Arc::new(PhraseHints::from_names(["Alice"])),
            language: Arc::new(LanguageConfig::default()),
            registry: Arc::new(SessionRegistry::default()),
            settings: Arc::new(SessionSettings {
                log_dir: log_dir.path().to_path_buf(),
                voice: "en-US_AllisonVoice".to_string(),
                stage_timeout,
            }),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });

        Self {
            addr,
            log_dir,
            received_audio,
            synthesized,
            tokens,
        }
    }

    pub async fn connect(&self) -> Client {
        let url = format!("ws://{}/ws?authtoken=tok", self.addr);
        let (client, _) = connect_async(url).await.unwrap();
        client
    }

    /// Files in the log directory with the given extension.
    pub fn logs(&self, extension: &str) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(self.log_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == extension))
            .collect()
    }
}

/// Everything the server sent for one request.
pub struct Answer {
    pub json: String,
    pub audio: Vec<Bytes>,
}

impl Answer {
    pub fn envelope(&self) -> serde_json::Value {
        serde_json::from_str(&self.json).unwrap()
    }
}

/// Streams `chunks` followed by the end-of-stream marker and collects the answer.
pub async fn ask(client: &mut Client, chunks: &[&'static [u8]]) -> Answer {
    for chunk in chunks {
        client.send(Message::binary(*chunk)).await.unwrap();
    }
    client.send(Message::text("EOS")).await.unwrap();
    read_answer(client).await
}

pub async fn read_answer(client: &mut Client) -> Answer {
    let mut json = None;
    let mut audio = Vec::new();
    while let Some(msg) = client.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                assert!(json.is_none(), "server sent a second text frame");
                assert!(audio.is_empty(), "text frame arrived after audio");
                json = Some(text.as_str().to_owned());
            }
            Ok(Message::Binary(data)) => audio.push(data),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    Answer {
        json: json.expect("server sent no answer"),
        audio,
    }
}
