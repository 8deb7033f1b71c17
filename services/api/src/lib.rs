//! Cue Voice API Library Crate
//!
//! This library contains the web service side of the voice reminder
//! assistant: configuration, shared state, the HTTP probes, the WebSocket
//! session pipeline and the audio helpers used by streaming recognition.
//! The `api` binary is a thin wrapper around this library.

pub mod audio_utils;
pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
