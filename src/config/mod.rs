mod settings;

pub use settings::{BotConfig, HistoryConfig, LlmConfig, LoggingConfig, RedisConfig, Settings};
