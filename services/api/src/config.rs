use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported speech recognition backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognitionProvider {
    Google,
    OpenAI,
}

/// Defines how transcripts are turned into reminder actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntentParser {
    /// The built-in reminder grammar.
    Pattern,
    /// An OpenAI chat model.
    Llm,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub log_dir: PathBuf,
    pub user_names_path: PathBuf,
    pub language_code: String,
    pub recognition_provider: RecognitionProvider,
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub transcription_model: String,
    pub intent_parser: IntentParser,
    pub chat_model: String,
    pub tts_url: String,
    pub tts_api_key: String,
    pub tts_voice: String,
    pub cue_api_url: String,
    pub stage_timeout: Option<Duration>,
}

fn required(var: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingVar(var.to_string()))
}

fn or_default(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = or_default("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let recognition_provider = match or_default("RECOGNITION_PROVIDER", "google")
            .to_lowercase()
            .as_str()
        {
            "google" => RecognitionProvider::Google,
            "openai" => RecognitionProvider::OpenAI,
            other => {
                return Err(ConfigError::InvalidValue(
                    "RECOGNITION_PROVIDER".to_string(),
                    format!("'{}' is not one of google, openai", other),
                ));
            }
        };

        let intent_parser = match or_default("INTENT_PARSER", "pattern").to_lowercase().as_str() {
            "pattern" => IntentParser::Pattern,
            "llm" => IntentParser::Llm,
            other => {
                return Err(ConfigError::InvalidValue(
                    "INTENT_PARSER".to_string(),
                    format!("'{}' is not one of pattern, llm", other),
                ));
            }
        };

        let google_api_key = std::env::var("GOOGLE_API_KEY").ok();
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        match recognition_provider {
            RecognitionProvider::Google if google_api_key.is_none() => {
                return Err(ConfigError::MissingVar(
                    "GOOGLE_API_KEY must be set for 'google' recognition".to_string(),
                ));
            }
            RecognitionProvider::OpenAI if openai_api_key.is_none() => {
                return Err(ConfigError::MissingVar(
                    "OPENAI_API_KEY must be set for 'openai' recognition".to_string(),
                ));
            }
            _ => {}
        }
        if intent_parser == IntentParser::Llm && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for the 'llm' intent parser".to_string(),
            ));
        }

        let stage_timeout = match std::env::var("STAGE_TIMEOUT_SECS") {
            Ok(secs) => {
                let secs = secs.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidValue("STAGE_TIMEOUT_SECS".to_string(), e.to_string())
                })?;
                Some(Duration::from_secs(secs))
            }
            Err(_) => None,
        };

        Ok(Self {
            bind_address,
            log_level,
            log_dir: PathBuf::from(or_default("LOG_DIR", "./log")),
            user_names_path: PathBuf::from(or_default("USER_NAMES_PATH", "./user-names.json")),
            language_code: or_default("LANGUAGE_CODE", "en-US"),
            recognition_provider,
            google_api_key,
            openai_api_key,
            transcription_model: or_default("TRANSCRIPTION_MODEL", "gpt-4o-transcribe"),
            intent_parser,
            chat_model: or_default("CHAT_MODEL", "gpt-4o-mini"),
            tts_url: required("TTS_URL")?,
            tts_api_key: required("TTS_API_KEY")?,
            tts_voice: or_default("TTS_VOICE", "en-US_AllisonVoice"),
            cue_api_url: or_default("CUE_API_URL", "https://calendar.knilxof.org"),
            stage_timeout,
        })
    }
}
