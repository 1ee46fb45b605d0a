//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::agents::compliance::DEFAULT_REGULATIONS;
use crate::error::ConfigError;

/// Runtime configuration for the intake service.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// HTTP listen port.
    pub port: u16,
    /// libSQL database file for the context store. `None` keeps contexts in memory.
    pub db_path: Option<PathBuf>,
    /// JSON documents with a total above this are routed for review.
    pub high_value_threshold: Decimal,
    /// Number of meaningful lines a PDF summary is built from.
    pub summary_lines: usize,
    /// Hard cap on summary length (PDF summary and email issue summary).
    pub summary_max_chars: usize,
    /// Regulation names the compliance matcher looks for.
    pub regulatory_keywords: Vec<String>,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            db_path: None,
            high_value_threshold: Decimal::from(10_000),
            summary_lines: 3,
            summary_max_chars: 500,
            regulatory_keywords: DEFAULT_REGULATIONS.iter().map(|s| s.to_string()).collect(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl IntakeConfig {
    /// Build configuration from `INTAKE_*` environment variables.
    ///
    /// Unset variables fall back to defaults; set-but-unparseable values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (testable without touching the env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let regulatory_keywords = match lookup("INTAKE_REGULATORY_KEYWORDS") {
            Some(raw) => {
                let list: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if list.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "INTAKE_REGULATORY_KEYWORDS".into(),
                        message: "keyword list is empty".into(),
                    });
                }
                list
            }
            None => defaults.regulatory_keywords,
        };

        Ok(Self {
            port: parse_var(&lookup, "INTAKE_PORT", defaults.port)?,
            db_path: lookup("INTAKE_DB_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            high_value_threshold: parse_var(
                &lookup,
                "INTAKE_HIGH_VALUE_THRESHOLD",
                defaults.high_value_threshold,
            )?,
            summary_lines: parse_var(&lookup, "INTAKE_SUMMARY_LINES", defaults.summary_lines)?,
            summary_max_chars: parse_var(
                &lookup,
                "INTAKE_SUMMARY_MAX_CHARS",
                defaults.summary_max_chars,
            )?,
            regulatory_keywords,
            max_upload_bytes: parse_var(
                &lookup,
                "INTAKE_MAX_UPLOAD_BYTES",
                defaults.max_upload_bytes,
            )?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(default),
    }
}
