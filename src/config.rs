//! Runtime configuration, read once from the environment in `main` and passed
//! down explicitly.
//!
//! | Variable | Default |
//! |---|---|
//! | `OPENAI_API_KEY` | required |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `BOOKGEN_TEXT_MODEL` | `gpt-4o` |
//! | `BOOKGEN_IMAGE_MODEL` | `dall-e-3` |
//! | `BOOKGEN_IMAGE_SIZE` | `1024x1024` |
//! | `BOOKGEN_IMAGE_QUALITY` | `standard` |
//! | `BOOKGEN_IMAGE_DELAY_MS` | `2000` |
//! | `BOOKGEN_LANGUAGE` | `en` |
//! | `BOOKGEN_HTTP_TIMEOUT_SECS` | `120` |
//!
//! A `.env` file in the working directory is loaded first when present.

use crate::models::{ImageQuality, ImageSize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_IMAGE_DELAY_MS: u64 = 2000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set")]
    MissingCredentials,
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for image generation and placeholder synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSettings {
    pub model: String,
    pub size: ImageSize,
    pub quality: ImageQuality,
    /// Pause between consecutive generation calls.
    pub delay: Duration,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_IMAGE_MODEL.to_string(),
            size: ImageSize {
                width: 1024,
                height: 1024,
            },
            quality: ImageQuality::Standard,
            delay: Duration::from_millis(DEFAULT_IMAGE_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub text_model: String,
    pub image: ImageSettings,
    /// BCP 47 language tag written into the EPUB metadata.
    pub language: String,
    /// Upper bound for a single request to the generative service.
    pub http_timeout: Duration,
}

fn parse_u64(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the common case.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::MissingCredentials)?;
        let defaults = ImageSettings::default();

        let size = match get("BOOKGEN_IMAGE_SIZE") {
            Some(value) => value.parse::<ImageSize>().map_err(|reason| ConfigError::Invalid {
                key: "BOOKGEN_IMAGE_SIZE",
                value,
                reason,
            })?,
            None => defaults.size,
        };

        let quality = match get("BOOKGEN_IMAGE_QUALITY") {
            Some(value) => value.parse::<ImageQuality>().map_err(|reason| ConfigError::Invalid {
                key: "BOOKGEN_IMAGE_QUALITY",
                value,
                reason,
            })?,
            None => defaults.quality,
        };

        let delay = match get("BOOKGEN_IMAGE_DELAY_MS") {
            Some(value) => Duration::from_millis(parse_u64("BOOKGEN_IMAGE_DELAY_MS", value)?),
            None => defaults.delay,
        };

        let http_timeout = match get("BOOKGEN_HTTP_TIMEOUT_SECS") {
            Some(value) => match parse_u64("BOOKGEN_HTTP_TIMEOUT_SECS", value.clone())? {
                0 => {
                    return Err(ConfigError::Invalid {
                        key: "BOOKGEN_HTTP_TIMEOUT_SECS",
                        value,
                        reason: "must be greater than zero".to_string(),
                    });
                }
                secs => Duration::from_secs(secs),
            },
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Config {
            api_key,
            api_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            text_model: get("BOOKGEN_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image: ImageSettings {
                model: get("BOOKGEN_IMAGE_MODEL").unwrap_or(defaults.model),
                size,
                quality,
                delay,
            },
            language: get("BOOKGEN_LANGUAGE").unwrap_or_else(|| "en".to_string()),
            http_timeout,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Config {
            api_key: "test-key".to_string(),
            api_url: "http://localhost:9".to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image: ImageSettings {
                size: ImageSize {
                    width: 32,
                    height: 24,
                },
                delay: Duration::ZERO,
                ..ImageSettings::default()
            },
            language: "en".to_string(),
            http_timeout: Duration::from_secs(5),
        }
    }
}
