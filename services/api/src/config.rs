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

/// The OpenAI-compatible providers the examiner can talk to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    Groq,
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            Provider::Groq => "GROQ_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Provider::Groq => "llama-3.3-70b-versatile",
            Provider::OpenAI => "gpt-4o",
            Provider::Gemini => "gemini-2.0-flash",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub api_key: String,
    pub chat_model: String,
    pub temperature: f32,
    pub llm_timeout: Duration,
    pub data_dir: PathBuf,
    pub topic_catalog_path: Option<PathBuf>,
    pub topics_per_exam: usize,
    pub max_tool_rounds: usize,
    pub log_level: Level,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn at_least_one<T: PartialOrd + From<u8>>(name: &str, value: T) -> Result<T, ConfigError> {
    if value < T::from(1) {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(value)
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "groq".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "groq" => Provider::Groq,
            "openai" => Provider::OpenAI,
            "gemini" => Provider::Gemini,
            other => {
                return Err(ConfigError::InvalidValue(
                    "LLM_PROVIDER".to_string(),
                    format!("'{}' is not one of groq, openai, gemini", other),
                ));
            }
        };

        let api_key = std::env::var(provider.key_var()).map_err(|_| {
            ConfigError::MissingVar(format!(
                "{} must be set for '{}' provider",
                provider.key_var(),
                provider_str.to_lowercase()
            ))
        })?;

        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| provider.default_model().to_string());

        let temperature = parse_var("TEMPERATURE", 0.3f32)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue(
                "TEMPERATURE".to_string(),
                format!("{} is outside 0.0..=2.0", temperature),
            ));
        }

        let llm_timeout_secs =
            at_least_one("LLM_TIMEOUT_SECS", parse_var("LLM_TIMEOUT_SECS", 60u64)?)?;
        let llm_timeout = Duration::from_secs(llm_timeout_secs);

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let topic_catalog_path = std::env::var("TOPIC_CATALOG_PATH").ok().map(PathBuf::from);

        let topics_per_exam =
            at_least_one("TOPICS_PER_EXAM", parse_var("TOPICS_PER_EXAM", 3usize)?)?;
        let max_tool_rounds =
            at_least_one("MAX_TOOL_ROUNDS", parse_var("MAX_TOOL_ROUNDS", 8usize)?)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            provider,
            api_key,
            chat_model,
            temperature,
            llm_timeout,
            data_dir,
            topic_catalog_path,
            topics_per_exam,
            max_tool_rounds,
            log_level,
        })
    }
}
