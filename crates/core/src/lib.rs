//! Core domain logic for the Cue voice-command service.
//!
//! This crate owns the values a voice-command session produces and the
//! contracts it needs from its collaborators (speech recognition, intent
//! extraction, reminder execution, speech synthesis), together with the
//! HTTP-backed implementations of those collaborators.

pub mod calendar;
pub mod intent;
pub mod model;
pub mod speech;
