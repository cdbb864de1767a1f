pub mod config;
pub mod lang;

pub use config::{BankscanConfig, ConfigError, OcrConfig, TelegramConfig};
pub use lang::LanguageHint;
