//! # Configuration Module
//!
//! This module loads the BFF configuration file and applies environment overrides.
//!
//! ## Key Features
//! - JSON, YAML and TOML configuration files parsed with serde
//! - `ENV.NAME` string values resolved from the environment before typed parsing
//! - Environment variable overrides (`BFF_*`)
//! - Validation that reports every problem at once
//!
//! ## File discovery
//! [`BffConfig::discover`] looks for the first existing of `api-bff.json`,
//! `api-bff.yml`, `api-bff.yaml` and `api-bff.toml` in a directory.

use openapiv3::{Contact, ExternalDocumentation, License, SecurityRequirement, Tag};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::caching::{CacheKind, DEFAULT_CACHING_PATH};
use crate::core::error::{BffError, BffResult};

/// Configuration file names, in lookup order
pub const CONFIG_FILE_NAMES: [&str; 4] = [
    "api-bff.json",
    "api-bff.yml",
    "api-bff.yaml",
    "api-bff.toml",
];

/// Prefix marking a string value as an environment variable reference
pub const ENV_PREFIX: &str = "ENV.";

/// Main BFF configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BffConfig {
    /// Path prefix every route is mounted under (e.g. `/api`)
    pub prefix: String,

    /// Global caching defaults; routes only inherit caching when this is set
    pub caching: Option<CachingConfig>,

    /// API documentation; `false` or absent disables it
    #[serde(deserialize_with = "deserialize_openapi")]
    pub openapi: Option<OpenApiConfig>,

    /// Outbound HTTP client settings
    #[serde(alias = "http_client")]
    pub http_client: HttpClientConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Global caching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachingConfig {
    /// Strategy used by routes that inherit caching
    #[serde(default, alias = "type")]
    pub strategy: CacheKind,

    /// Entry lifetime (`"15s"`, `"5m"`, or milliseconds); no TTL never expires
    #[serde(
        default,
        serialize_with = "humantime_serde::serialize",
        deserialize_with = "deserialize_ttl",
        skip_serializing_if = "Option::is_none"
    )]
    pub ttl: Option<Duration>,

    /// Directory of the persistent strategy
    #[serde(default = "default_caching_path")]
    pub path: PathBuf,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            strategy: CacheKind::Memory,
            ttl: None,
            path: default_caching_path(),
        }
    }
}

fn default_caching_path() -> PathBuf {
    PathBuf::from(DEFAULT_CACHING_PATH)
}

/// Documentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenApiConfig {
    /// Path of the document endpoint, relative to the prefix
    pub path: String,
    pub title: String,
    #[serde(deserialize_with = "deserialize_version")]
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<ExternalDocumentation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityRequirement>,
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self {
            path: "/help".to_string(),
            title: "Api BFF".to_string(),
            version: "1".to_string(),
            description: None,
            contact: None,
            license: None,
            terms_of_service: None,
            tags: Vec::new(),
            external_docs: None,
            security: Vec::new(),
        }
    }
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpClientConfig {
    /// Whole-request timeout; none waits indefinitely
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// User-Agent sent upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = BffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            other => Err(BffError::config(format!("Invalid log format: {}", other))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, text)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> BffResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yml") | Some("yaml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(BffError::config(format!(
                "Unsupported config file extension: {}",
                path.display()
            ))),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OpenApiSetting {
    Toggle(bool),
    Settings(Box<OpenApiConfig>),
}

fn deserialize_openapi<'de, D>(deserializer: D) -> Result<Option<OpenApiConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OpenApiSetting>::deserialize(deserializer)? {
        None | Some(OpenApiSetting::Toggle(false)) => None,
        Some(OpenApiSetting::Toggle(true)) => Some(OpenApiConfig::default()),
        Some(OpenApiSetting::Settings(settings)) => Some(*settings),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Version {
    Text(String),
    Number(serde_json::Number),
}

fn deserialize_version<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Version::deserialize(deserializer)? {
        Version::Text(text) => text,
        Version::Number(number) => number.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Ttl {
    Millis(u64),
    Text(#[serde(with = "humantime_serde")] Duration),
}

fn deserialize_ttl<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Ttl>::deserialize(deserializer)?.map(|ttl| match ttl {
        Ttl::Millis(millis) => Duration::from_millis(millis),
        Ttl::Text(duration) => duration,
    }))
}

/// Replace every `ENV.NAME` string with the value of `NAME`.
///
/// Object fields referencing an unset variable are removed so their defaults apply.
pub fn substitute_env(value: Value) -> Value {
    match value {
        Value::String(text) => match resolve_env(&text) {
            Some(resolved) => resolved.map(Value::String).unwrap_or(Value::Null),
            None => Value::String(text),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(substitute_env).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .filter_map(|(key, value)| {
                    if let Value::String(text) = &value {
                        if let Some(None) = resolve_env(text) {
                            return None;
                        }
                    }
                    Some((key, substitute_env(value)))
                })
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// `None` when `text` is not a reference, `Some(None)` when the variable is unset
fn resolve_env(text: &str) -> Option<Option<String>> {
    text.strip_prefix(ENV_PREFIX)
        .map(|name| std::env::var(name).ok())
}

fn with_leading_slash(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

impl BffConfig {
    /// Parse configuration text in the given format
    pub fn parse(content: &str, format: ConfigFormat) -> BffResult<Self> {
        if content.trim().is_empty() {
            return Self::from_value(Value::Object(Map::new()));
        }

        let raw: Value = match format {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| BffError::config(format!("Failed to parse JSON config: {}", e)))?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| BffError::config(format!("Failed to parse YAML config: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| BffError::config(format!("Failed to parse TOML config: {}", e)))?,
        };

        // A YAML document holding only `~` parses as null
        if raw.is_null() {
            return Self::from_value(Value::Object(Map::new()));
        }
        Self::from_value(raw)
    }

    /// Build configuration from an already parsed document
    pub fn from_value(raw: Value) -> BffResult<Self> {
        let mut config: BffConfig = serde_json::from_value(substitute_env(raw))
            .map_err(|e| BffError::config(format!("API BFF Config not valid: {}", e)))?;

        config.apply_env_overrides()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file; the format follows the extension
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> BffResult<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BffError::config(format!("Failed to read config file: {}", e)))?;

        debug!(path = %path.display(), "Loading configuration");
        Self::parse(&content, format)
    }

    /// Load the first configuration file found in `dir`, if any
    pub async fn discover<P: AsRef<Path>>(dir: P) -> BffResult<Option<Self>> {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.as_ref().join(name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Self::load_from_file(candidate).await.map(Some);
            }
        }
        Ok(None)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Supported variables: `BFF_PREFIX`, `BFF_LOG_LEVEL`, `BFF_LOG_FORMAT` and
    /// `BFF_CACHING_PATH` (only when caching is configured).
    pub fn apply_env_overrides(&mut self) -> BffResult<()> {
        use std::env;

        if let Ok(prefix) = env::var("BFF_PREFIX") {
            self.prefix = prefix;
        }

        if let Ok(level) = env::var("BFF_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("BFF_LOG_FORMAT") {
            self.logging.format = format
                .parse()
                .map_err(|e| BffError::config(format!("Invalid BFF_LOG_FORMAT: {}", e)))?;
        }

        if let Ok(path) = env::var("BFF_CACHING_PATH") {
            if let Some(caching) = self.caching.as_mut() {
                caching.path = PathBuf::from(path);
            }
        }

        Ok(())
    }

    /// Normalise paths: leading slash, no trailing slash
    pub fn normalize(&mut self) {
        self.prefix = with_leading_slash(&self.prefix);
        if let Some(openapi) = self.openapi.as_mut() {
            openapi.path = with_leading_slash(&openapi.path);
        }
    }

    /// Comprehensive configuration validation with detailed error messages
    pub fn validate(&self) -> BffResult<()> {
        let mut errors = Vec::new();

        if self.prefix.contains(':') {
            errors.push(format!("prefix cannot contain path parameters: {}", self.prefix));
        }

        if let Some(caching) = &self.caching {
            if caching.path.as_os_str().is_empty() {
                errors.push("caching.path cannot be empty".to_string());
            }
        }

        if let Some(openapi) = &self.openapi {
            if openapi.path.is_empty() {
                errors.push("openapi.path cannot be empty".to_string());
            }
            if openapi.title.trim().is_empty() {
                errors.push("openapi.title cannot be empty".to_string());
            }
            if openapi.version.trim().is_empty() {
                errors.push("openapi.version cannot be empty".to_string());
            }
        }

        if let Some(timeout) = self.http_client.timeout {
            if timeout.is_zero() {
                errors.push("httpClient.timeout must be greater than 0".to_string());
            }
        }

        match self.logging.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => errors.push(format!("Invalid logging.level: {}", other)),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BffError::config(format!(
                "Configuration validation failed:\n - {}",
                errors.join("\n - ")
            )))
        }
    }
}
