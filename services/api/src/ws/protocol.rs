//! Defines the WebSocket wire protocol between a voice client and the server.
//!
//! Client to server: binary frames of raw PCM16 little-endian mono audio at
//! 16 kHz, terminated by a single text frame `EOS`.
//! Server to client: one text frame with the JSON answer envelope, then zero or
//! more binary frames of synthesized WAV audio, then close.

use axum::extract::ws::Message;
use bytes::Bytes;
use serde::Deserialize;

/// Payload of the text frame that marks the end of client audio.
pub const END_OF_STREAM: &str = "EOS";

/// Content type requested from the synthesis backend.
pub const RESPONSE_AUDIO_FORMAT: &str = "audio/wav";

/// Query parameters supplied when the connection is opened.
#[derive(Deserialize, Debug, Default)]
pub struct ConnectParams {
    /// Opaque bearer token forwarded to the calendar service.
    #[serde(default)]
    pub authtoken: Option<String>,
}

/// A client frame, as seen by the session.
#[derive(Debug, PartialEq)]
pub enum ClientFrame {
    Audio(Bytes),
    EndOfStream,
    /// Anything else that keeps the connection open (pings, stray text).
    Ignored,
    Closed,
}

impl From<Message> for ClientFrame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Binary(data) => ClientFrame::Audio(data),
            Message::Text(text) if text.as_str() == END_OF_STREAM => ClientFrame::EndOfStream,
            Message::Close(_) => ClientFrame::Closed,
            Message::Text(_) | Message::Ping(_) | Message::Pong(_) => ClientFrame::Ignored,
        }
    }
}
