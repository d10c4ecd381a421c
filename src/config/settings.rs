use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub bot: BotConfig,
    pub llm: LlmConfig,
    pub redis: RedisConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,
    pub greeting: String,
}

impl BotConfig {
    /// Render the configured greeting for a user's display name.
    pub fn greeting_for(&self, username: &str) -> String {
        self.greeting.replace("{{username}}", username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    /// Some hosted models reject the temperature parameter outright;
    /// when false it is omitted from requests entirely.
    pub temperature_supported: bool,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    pub db: i64,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Sliding retention window for persisted conversations, in seconds.
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// When true, every completion request/response body is appended to a
    /// per-process JSONL file under logs/.
    pub log_requests: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .set_default("bot.name", "monty")?
            .set_default(
                "bot.greeting",
                "Hi {{username}}! Send me a message and I'll reply with the power of LLMs.",
            )?
            .set_default("llm.model", "openai/gpt-3.5-turbo")?
            .set_default("llm.temperature", 0.7)?
            .set_default("llm.temperature_supported", true)?
            .set_default("llm.base_url", "https://openrouter.ai/api/v1")?
            .set_default("redis.host", "localhost")?
            .set_default("redis.port", 6379)?
            .set_default("redis.db", 0)?
            .set_default("history.ttl_seconds", 86400)?
            .set_default("logging.level", "info")?
            .set_default("logging.log_requests", false)?
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn api_key() -> Result<String> {
        env::var("OPENROUTER_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY environment variable not set"))
    }
}
