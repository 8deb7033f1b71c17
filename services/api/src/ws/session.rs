//! Runs the voice-command session of one WebSocket connection.
//!
//! A session moves strictly forward through its stages:
//! `Connected → Streaming → Recognizing → Interpreting → Executing → Responding → Closed`.
//! Any stage from `Streaming` on may fail instead, which routes straight to
//! `Responding` with the matching error code. A client that goes away before
//! `Responding` abandons the session without an answer.

use super::{
    composer::ResponseComposer,
    protocol::{ClientFrame, ConnectParams},
    sink::{AudioSink, SinkError},
};
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use cue_core::{
    model::{AnswerEnvelope, ErrorCode, Transcript, sanitize_transcript},
    speech::RecognitionError,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use rand::{Rng, distr::Alphanumeric};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a voice session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let token = params.authtoken.unwrap_or_default();
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

/// Entry point for a new connection: opens the session and drives it to completion.
#[instrument(name = "ws_session", skip_all, fields(client, log_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, token: String) {
    let client = state.registry.next();
    Span::current().record("client", client);
    if token.is_empty() {
        warn!("Connection opened without an auth token.");
    }

    let (socket_tx, socket_rx) = socket.split();
    let mut conn = Connection::new(socket_tx);

    match Session::open(state, token).await {
        Ok(session) => {
            Span::current().record("log_id", session.log_id.as_str());
            info!("New voice session.");
            session.run(socket_rx, &mut conn).await;
        }
        Err(e) => {
            error!(error = ?e, "Session could not be opened.");
            conn.close().await;
        }
    }
}

/// Lifecycle stages of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connected,
    Streaming,
    Recognizing,
    Interpreting,
    Executing,
    Failed(ErrorCode),
    Responding,
    Closed,
}

impl Stage {
    fn rank(self) -> u8 {
        match self {
            Stage::Connected => 0,
            Stage::Streaming => 1,
            Stage::Recognizing => 2,
            Stage::Interpreting => 3,
            Stage::Executing => 4,
            Stage::Failed(_) => 5,
            Stage::Responding => 6,
            Stage::Closed => 7,
        }
    }

    /// Stages only ever move forward.
    pub fn can_advance_to(self, next: Stage) -> bool {
        next.rank() > self.rank()
    }
}

/// The client-facing half of the socket. Closing is idempotent.
pub struct Connection {
    tx: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl Connection {
    pub fn new(tx: SplitSink<WebSocket, Message>) -> Self {
        Self { tx, closed: false }
    }

    pub async fn send_text(&mut self, text: String) -> Result<()> {
        self.tx.send(Message::Text(text.into())).await?;
        Ok(())
    }

    pub async fn send_binary(&mut self, data: Bytes) -> Result<()> {
        self.tx.send(Message::Binary(data)).await?;
        Ok(())
    }

    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.tx.close().await {
            debug!(error = %e, "Connection was already gone when closing.");
        }
    }
}

/// How the streaming stage ended.
enum Streamed {
    /// No more input; recognition may still be running.
    Ended,
    /// The audio could not be delivered.
    Failed,
    Disconnected,
}

type Recognition = JoinHandle<Result<Transcript, RecognitionError>>;

struct Session {
    state: Arc<AppState>,
    token: String,
    log_id: String,
    json_log: PathBuf,
    stage: Stage,
    sink: AudioSink,
    recognition: Recognition,
}

impl Session {
    /// Opens the per-session logs and starts recognition on the live audio stream.
    async fn open(state: Arc<AppState>, token: String) -> Result<Self> {
        let log_id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();
        let log_base = state.settings.log_dir.join(&log_id);
        let raw_log = tokio::fs::File::create(log_base.with_extension("raw"))
            .await
            .context("creating raw audio log")?;
        let (sink, audio) = AudioSink::new(raw_log);

        let recognizer = state.recognizer.clone();
        let hints = state.hints.clone();
        let language = state.language.clone();
        let recognition = tokio::spawn(
            async move { recognizer.recognize(audio, &hints, &language).await }
                .instrument(Span::current()),
        );

        Ok(Self {
            state,
            token,
            json_log: log_base.with_extension("json"),
            log_id,
            stage: Stage::Connected,
            sink,
            recognition,
        })
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "stage {:?} cannot move to {:?}",
            self.stage,
            next
        );
        debug!(from = ?self.stage, to = ?next, "stage transition");
        self.stage = next;
    }

    fn fail(
        &mut self,
        code: ErrorCode,
        command: Option<String>,
        confidence: Option<f32>,
    ) -> AnswerEnvelope {
        self.advance(Stage::Failed(code));
        if code == ErrorCode::RecognitionFailed {
            AnswerEnvelope::recognition_failed()
        } else {
            AnswerEnvelope::failure(code, command, confidence)
        }
    }

    async fn run(mut self, mut socket_rx: SplitStream<WebSocket>, conn: &mut Connection) {
        self.advance(Stage::Streaming);

        let streamed = self.stream_audio(&mut socket_rx).await;
        let envelope = match streamed {
            Streamed::Disconnected => return self.abandon(conn).await,
            Streamed::Failed => {
                self.recognition.abort();
                self.fail(ErrorCode::RecognitionFailed, None, None)
            }
            Streamed::Ended => {
                let outcome = tokio::select! {
                    envelope = self.interpret() => Some(envelope),
                    _ = client_gone(&mut socket_rx) => None,
                };
                match outcome {
                    Some(envelope) => envelope,
                    None => return self.abandon(conn).await,
                }
            }
        };

        self.advance(Stage::Responding);
        let composer = ResponseComposer::new(
            self.state.synthesizer.as_ref(),
            &self.state.settings.voice,
            self.json_log.clone(),
        );
        if let Err(e) = composer.respond(conn, &envelope).await {
            warn!(error = ?e, "problem answering");
        }

        self.advance(Stage::Closed);
        conn.close().await;
        info!(status = %envelope.status, "Voice session finished.");
    }

    /// Forwards client audio into the sink until end-of-stream.
    async fn stream_audio(&mut self, socket_rx: &mut SplitStream<WebSocket>) -> Streamed {
        while let Some(msg) = socket_rx.next().await {
            let frame = match msg {
                Ok(msg) => ClientFrame::from(msg),
                Err(e) => {
                    warn!(error = %e, "client connection error");
                    ClientFrame::Closed
                }
            };
            match frame {
                ClientFrame::Audio(data) => match self.sink.write(data).await {
                    Ok(()) => {}
                    Err(SinkError::RecognizerClosed) => {
                        debug!("Recognizer finished before end of stream.");
                        return self.end_stream().await;
                    }
                    Err(e) => {
                        error!(error = %e, "problem passing audio");
                        let _ = self.sink.close().await;
                        return Streamed::Failed;
                    }
                },
                ClientFrame::EndOfStream => return self.end_stream().await,
                ClientFrame::Ignored => debug!("Ignoring non-audio frame while streaming."),
                ClientFrame::Closed => return Streamed::Disconnected,
            }
        }
        Streamed::Disconnected
    }

    async fn end_stream(&mut self) -> Streamed {
        debug!(bytes = self.sink.bytes_written(), "end of audio stream");
        match self.sink.close().await {
            Ok(()) => Streamed::Ended,
            Err(e) => {
                error!(error = %e, "problem closing audio log");
                Streamed::Failed
            }
        }
    }

    /// Recognizing → Interpreting → Executing. Every failure short-circuits
    /// into the envelope for its stage.
    async fn interpret(&mut self) -> AnswerEnvelope {
        let limit = self.state.settings.stage_timeout;

        self.advance(Stage::Recognizing);
        let recognized = bounded(limit, &mut self.recognition).await;
        let transcript = match recognized {
            Some(Ok(Ok(transcript))) if transcript.has_hypothesis() => transcript,
            Some(Ok(Ok(_))) => {
                warn!("Recognition produced no hypothesis.");
                return self.fail(ErrorCode::RecognitionFailed, None, None);
            }
            Some(Ok(Err(e))) => {
                warn!(error = %e, "problem STT");
                return self.fail(ErrorCode::RecognitionFailed, None, None);
            }
            Some(Err(e)) => {
                error!(error = %e, "Recognition task failed.");
                return self.fail(ErrorCode::RecognitionFailed, None, None);
            }
            None => {
                warn!("Recognition timed out.");
                self.recognition.abort();
                return self.fail(ErrorCode::RecognitionFailed, None, None);
            }
        };

        self.advance(Stage::Interpreting);
        let command = sanitize_transcript(&transcript.text);
        let confidence = transcript.confidence;
        info!(%command, confidence, "interpreting");

        let parsed = bounded(limit, self.state.intent_resolver.parse(&command)).await;
        let action = match parsed {
            Some(Ok(action)) => action,
            Some(Err(e)) => {
                info!(error = %e, "problem interpreting");
                return self.fail(ErrorCode::ParseFailed, Some(command), Some(confidence));
            }
            None => {
                warn!("Interpretation timed out.");
                return self.fail(ErrorCode::ParseFailed, Some(command), Some(confidence));
            }
        };

        self.advance(Stage::Executing);
        let executed = bounded(
            limit,
            self.state.executor.execute(&self.token, action.clone()),
        )
        .await;
        match executed {
            Some(Ok(_)) => AnswerEnvelope::success(&action, command, confidence),
            Some(Err(e)) => {
                warn!(error = %e, "problem saving reminder");
                self.fail(ErrorCode::SaveFailed, Some(command), Some(confidence))
            }
            None => {
                warn!("Saving the reminder timed out.");
                self.fail(ErrorCode::SaveFailed, Some(command), Some(confidence))
            }
        }
    }

    /// Drops all outstanding work after the client went away.
    async fn abandon(mut self, conn: &mut Connection) {
        self.recognition.abort();
        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "problem closing audio log");
        }
        self.advance(Stage::Closed);
        conn.close().await;
        info!("Client went away; session abandoned.");
    }
}

/// Resolves once the client closes the connection. Frames arriving meanwhile are dropped.
async fn client_gone(socket_rx: &mut SplitStream<WebSocket>) {
    while let Some(msg) = socket_rx.next().await {
        match msg.map(ClientFrame::from) {
            Ok(ClientFrame::Closed) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Awaits `fut`, giving up after `limit` when one is set.
async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
