//! Voice Command Domain Model
//!
//! This module defines the values that flow through a single voice-command
//! session: the recognized transcript, the extracted reminder action, its
//! resolved counterpart, and the answer envelope returned to the client.

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Marker used as the `command` of an answer when recognition never produced text.
pub const UNKNOWN_COMMAND: &str = "<unknown>";

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\w+\]").expect("annotation pattern is valid"));

/// The closed set of outcomes reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    ParseFailed,
    /// Reserved for an execution-stage fault distinct from persistence.
    /// No stage of the current pipeline produces it.
    ExecuteFailed,
    SaveFailed,
    RecognitionFailed,
}

impl ErrorCode {
    /// The numeric value carried in the `status` field of the envelope.
    pub fn code(self) -> u16 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::ParseFailed => 1,
            ErrorCode::ExecuteFailed => 2,
            ErrorCode::SaveFailed => 3,
            ErrorCode::RecognitionFailed => 100,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }

    /// The spoken apology for a failure code. `Ok` has no apology; its message
    /// is the confirmation of the executed action.
    pub fn apology(self) -> Option<&'static str> {
        match self {
            ErrorCode::Ok => None,
            ErrorCode::ParseFailed => Some("I did not understand that. Can you repeat?"),
            ErrorCode::ExecuteFailed => Some("Sorry, I was not able to do that."),
            ErrorCode::SaveFailed => Some("Sorry, I was not able to save this reminder."),
            ErrorCode::RecognitionFailed => {
                Some("Sorry, the service is not available at the moment.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Ok => "OK",
            ErrorCode::ParseFailed => "PARSE_FAILED",
            ErrorCode::ExecuteFailed => "EXECUTE_FAILED",
            ErrorCode::SaveFailed => "SAVE_FAILED",
            ErrorCode::RecognitionFailed => "RECOGNITION_FAILED",
        };
        f.write_str(name)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

/// The single best recognition result of a session.
///
/// A confidence of `0.0` means the backend produced no hypothesis at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

impl Transcript {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }

    /// True when the backend returned something worth interpreting.
    pub fn has_hypothesis(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// One alternative emitted by a recognition backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub transcript: String,
    pub confidence: f32,
    pub is_final: bool,
}

/// Picks the highest-confidence final hypothesis. Interim hypotheses never win.
pub fn best_hypothesis<'a, I>(hypotheses: I) -> Transcript
where
    I: IntoIterator<Item = &'a Hypothesis>,
{
    let mut best = Transcript::empty();
    for hypothesis in hypotheses.into_iter().filter(|h| h.is_final) {
        if best.confidence < hypothesis.confidence {
            best.confidence = hypothesis.confidence;
            best.text = hypothesis.transcript.trim().to_string();
        }
    }
    best
}

/// Removes bracketed non-speech annotations such as `[COUGH]` or `[SMACK]`.
pub fn sanitize_transcript(text: &str) -> String {
    ANNOTATION.replace_all(text, "").into_owned()
}

/// A reminder extracted from a transcript.
///
/// `recipients` holds free-form forenames that still need to be resolved to
/// identities before the reminder can be saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub recipients: Vec<String>,
    pub action: String,
    pub due: Due,
    pub confirmation: String,
}

/// When a reminder is due: epoch milliseconds, or a time expression as spoken.
///
/// Passed through to the reminder store unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Due {
    Timestamp(i64),
    Text(String),
}

impl fmt::Display for Due {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Due::Timestamp(millis) => write!(f, "{millis}"),
            Due::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for Due {
    fn from(text: &str) -> Self {
        Due::Text(text.to_string())
    }
}

impl From<String> for Due {
    fn from(text: String) -> Self {
        Due::Text(text)
    }
}

/// A resolved recipient. Unmatched names serialize as an empty object.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RecipientRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
}

/// An `Action` whose recipients have been resolved; this is the body that is persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAction {
    pub recipients: Vec<RecipientRef>,
    pub action: String,
    pub due: Due,
}

/// The one result object produced per session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerEnvelope {
    pub status: ErrorCode,
    pub message: String,
    pub command: String,
    pub confidence: f32,
}

impl AnswerEnvelope {
    /// A successful outcome. The message is the action's confirmation text.
    pub fn success(action: &Action, command: impl Into<String>, confidence: f32) -> Self {
        Self {
            status: ErrorCode::Ok,
            message: action.confirmation.clone(),
            command: command.into(),
            confidence,
        }
    }

    /// A failed outcome with the canned apology for `status`.
    ///
    /// `command` falls back to [`UNKNOWN_COMMAND`] and `confidence` to `1.0`.
    pub fn failure(status: ErrorCode, command: Option<String>, confidence: Option<f32>) -> Self {
        Self {
            status,
            message: status.apology().unwrap_or_default().to_string(),
            command: command.unwrap_or_else(|| UNKNOWN_COMMAND.to_string()),
            confidence: confidence.unwrap_or(1.0),
        }
    }

    /// Failure of the recognition stage. No transcript exists, so the
    /// command is unknown and the confidence is zero.
    pub fn recognition_failed() -> Self {
        Self::failure(ErrorCode::RecognitionFailed, None, Some(0.0))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Phrases supplied to recognition backends to bias them towards known names.
///
/// Built once at startup and shared read-only by every session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhraseHints(Vec<String>);

impl PhraseHints {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut phrases = Vec::new();
        for name in names {
            let name = name.as_ref();
            phrases.push(format!("Remind {name}"));
            phrases.push(name.to_string());
        }
        Self(phrases)
    }

    pub fn phrases(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fixed properties of the client audio and the recognition language.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageConfig {
    pub language_code: String,
    pub sample_rate_hertz: u32,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
            sample_rate_hertz: 16_000,
        }
    }
}
