use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::lang::LanguageHint;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Runtime configuration for the bot and the OCR pipeline.
///
/// Resolution order: built-in defaults, then the TOML file (if any), then
/// `BANKSCAN_*` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BankscanConfig {
    pub telegram: TelegramConfig,
    pub ocr: OcrConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.token.is_empty() { "" } else { "[redacted]" };
        f.debug_struct("TelegramConfig").field("token", &token).finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract executable, either a bare name resolved via `PATH` or a full path.
    pub tesseract_cmd: PathBuf,
    pub languages: LanguageHint,
    pub tessdata_dir: Option<PathBuf>,
    /// Upper bound on a single recognition call.
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            tesseract_cmd: PathBuf::from("tesseract"),
            languages: LanguageHint::default(),
            tessdata_dir: None,
            timeout_secs: 60,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BankscanConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults (or `path`, when given) overlaid with the process environment, then validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment lookup. Unset or empty variables are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("BANKSCAN_TELEGRAM_TOKEN").or_else(|| get("TELEGRAM_BOT_TOKEN")) {
            self.telegram.token = token;
        }
        if let Some(cmd) = get("BANKSCAN_TESSERACT_CMD") {
            self.ocr.tesseract_cmd = PathBuf::from(cmd);
        }
        if let Some(langs) = get("BANKSCAN_OCR_LANGUAGES") {
            self.ocr.languages = langs.parse().map_err(|message| ConfigError::Invalid {
                key: "BANKSCAN_OCR_LANGUAGES",
                message,
            })?;
        }
        if let Some(dir) = get("BANKSCAN_TESSDATA_DIR") {
            self.ocr.tessdata_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = get("BANKSCAN_OCR_TIMEOUT_SECS") {
            self.ocr.timeout_secs = secs.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "BANKSCAN_OCR_TIMEOUT_SECS",
                message: format!("{e}"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.token.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "telegram.token",
                message: "bot token is required".into(),
            });
        }
        if self.ocr.tesseract_cmd.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "ocr.tesseract_cmd",
                message: "must not be empty".into(),
            });
        }
        if self.ocr.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "ocr.timeout_secs",
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
