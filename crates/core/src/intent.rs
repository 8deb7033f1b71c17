//! Intent Extraction
//!
//! Turns a sanitized transcript into a reminder `Action`. Two resolvers are
//! provided: a built-in grammar for the "remind <who> to <what> <when>"
//! command family, and an LLM-backed resolver for free-form phrasing.

use crate::model::Action;
use anyhow::Context;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    /// The text does not describe a command we know how to execute.
    #[error("unparseable command: {0}")]
    Unparseable(String),
    /// The resolver itself failed (e.g. the language model was unreachable).
    #[error("intent resolver failed: {0}")]
    Resolver(#[from] anyhow::Error),
}

/// Defines the contract for extracting a structured action from text.
///
/// Failures are terminal for the session: they are reported to the user and
/// never retried.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn parse(&self, text: &str) -> Result<Action, IntentError>;
}

static REMINDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*(?:please\s+)?remind\s+
        (?P<who>.+?)\s+to\s+
        (?P<what>.+?)\s+
        (?P<when>(?:at|on|in|by|tomorrow|tonight|today|next|this|every)\b.*?)
        \s*[.!?]?\s*$",
    )
    .expect("reminder grammar is valid")
});

static NAME_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*,\s*(?:and\s+)?|\s+and\s+").expect("separator is valid"));

/// Resolver for the built-in reminder grammar.
#[derive(Debug, Default, Clone)]
pub struct PatternIntentResolver;

impl PatternIntentResolver {
    fn extract(text: &str) -> Option<Action> {
        let caps = REMINDER.captures(text)?;
        let recipients: Vec<String> = NAME_SEPARATOR
            .split(caps.name("who")?.as_str())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if recipients.is_empty() {
            return None;
        }

        let action = collapse_whitespace(caps.name("what")?.as_str());
        let due = collapse_whitespace(caps.name("when")?.as_str());
        let names: Vec<String> = recipients.iter().map(|n| capitalize(n)).collect();
        let confirmation = format!(
            "OK, I will remind {} to {} {}.",
            join_names(&names),
            action,
            due
        );

        Some(Action {
            recipients,
            action,
            due: due.into(),
            confirmation,
        })
    }
}

#[async_trait]
impl IntentResolver for PatternIntentResolver {
    async fn parse(&self, text: &str) -> Result<Action, IntentError> {
        Self::extract(text).ok_or_else(|| IntentError::Unparseable(text.to_string()))
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

const LLM_SYSTEM_PROMPT: &str = "You extract reminders from short voice commands. \
Reply with a single JSON object with the keys \"recipients\" (array of first names), \
\"action\" (what to do, without the recipients), \"due\" (the time expression exactly as spoken, or epoch milliseconds when an exact time is known) \
and \"confirmation\" (one short sentence confirming the reminder to the speaker). \
If the command is not a reminder, reply with {\"error\": \"unparseable\"}.";

#[derive(Deserialize)]
#[serde(untagged)]
enum LlmReply {
    Rejected { error: String },
    Parsed(Action),
}

/// An implementation of `IntentResolver` that uses an OpenAI-compatible chat model.
pub struct LlmIntentResolver {
    client: Client<OpenAIConfig>,
    model: String,
}

impl LlmIntentResolver {
    /// Creates a resolver for the given API configuration and chat model.
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl IntentResolver for LlmIntentResolver {
    async fn parse(&self, text: &str) -> Result<Action, IntentError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .response_format(ResponseFormat::JsonObject)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(LLM_SYSTEM_PROMPT)
                    .build()
                    .context("building system message")?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(text)
                    .build()
                    .context("building user message")?
                    .into(),
            ])
            .build()
            .context("building chat request")?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("chat completion failed")?;
        let answer = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .context("No content in LLM response")?;

        parse_llm_reply(text, answer)
    }
}

fn parse_llm_reply(text: &str, answer: &str) -> Result<Action, IntentError> {
    match serde_json::from_str::<LlmReply>(answer) {
        Ok(LlmReply::Parsed(action)) if !action.recipients.is_empty() => Ok(action),
        Ok(LlmReply::Rejected { error }) => {
            tracing::debug!(%error, "language model rejected the command");
            Err(IntentError::Unparseable(text.to_string()))
        }
        _ => Err(IntentError::Unparseable(text.to_string())),
    }
}
