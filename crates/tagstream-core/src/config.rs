//! Configuration management for tagstream.
//!
//! Loads configuration from ${TAGSTREAM_HOME}/config.toml with sensible defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::envelope::{DEFAULT_DELTA_TYPES, Decoder, EnvelopeDecoder};
use crate::parser::vocabulary::{COLLECTION_TAGS, NESTED_TAGS, OPAQUE_TAGS, RESPONSE_TAG, TOP_LEVEL_TAGS};
use crate::parser::TagVocabulary;
use crate::reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectPolicy};
use crate::session::SessionMode;

/// Overrides `channels.events_url`.
pub const EVENTS_URL_ENV: &str = "TAGSTREAM_EVENTS_URL";
/// Overrides `channels.socket_url`.
pub const SOCKET_URL_ENV: &str = "TAGSTREAM_SOCKET_URL";

const EVENTS_PATH: &str = "/api/v1/agents/sse";
const SOCKET_PATH: &str = "/ws";

/// Returns the commented config template written by `init`.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Where the channels connect and what the session requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub backend_url: Option<String>,
    pub events_url: Option<String>,
    pub socket_url: Option<String>,
    pub mode: SessionMode,
    /// Seconds to wait for the session to connect (0 waits forever).
    pub connect_timeout_secs: u64,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            backend_url: Some("http://localhost:8000".to_string()),
            events_url: None,
            socket_url: None,
            mode: SessionMode::Dual,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectStrategy {
    Never,
    Fixed,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub strategy: ReconnectStrategy,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0 retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: ReconnectStrategy::Exponential,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    pub fn build_policy(&self) -> Arc<dyn ReconnectPolicy> {
        let max_attempts = (self.max_attempts > 0).then_some(self.max_attempts);
        let initial = Duration::from_millis(self.initial_delay_ms);
        match self.strategy {
            ReconnectStrategy::Never => Arc::new(NeverReconnect),
            ReconnectStrategy::Fixed => Arc::new(FixedDelay {
                delay: initial,
                max_attempts,
            }),
            ReconnectStrategy::Exponential => Arc::new(ExponentialBackoff {
                initial,
                max: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
                max_attempts,
            }),
        }
    }
}

/// The tag vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsConfig {
    pub envelopes: Vec<String>,
    pub known: Vec<String>,
    pub opaque: Vec<String>,
    /// Collection tag -> entry tag.
    pub collections: BTreeMap<String, String>,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            envelopes: vec![RESPONSE_TAG.to_string()],
            known: TOP_LEVEL_TAGS
                .iter()
                .chain(NESTED_TAGS)
                .map(ToString::to_string)
                .collect(),
            opaque: OPAQUE_TAGS.iter().map(ToString::to_string).collect(),
            collections: COLLECTION_TAGS
                .iter()
                .map(|(name, item)| ((*name).to_string(), (*item).to_string()))
                .collect(),
        }
    }
}

impl TagsConfig {
    pub fn vocabulary(&self) -> TagVocabulary {
        let mut vocabulary = TagVocabulary::new(&self.known);
        for name in &self.envelopes {
            vocabulary = vocabulary.with_envelope(name);
        }
        for name in &self.opaque {
            vocabulary = vocabulary.with_opaque(name);
        }
        for (name, item) in &self.collections {
            vocabulary = vocabulary.with_collection(name, item);
        }
        vocabulary
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Envelope `type` values carrying response text.
    pub delta_types: Vec<String>,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            delta_types: DEFAULT_DELTA_TYPES.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `TAGSTREAM_LOG` is unset.
    pub level: String,
    /// Log to this file (rotated daily) instead of stderr.
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub channels: ChannelsConfig,
    pub reconnect: ReconnectConfig,
    pub tags: TagsConfig,
    pub envelope: EnvelopeConfig,
    pub log: LogConfig,
}

impl Config {
    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn vocabulary(&self) -> TagVocabulary {
        self.tags.vocabulary()
    }

    pub fn decoder(&self) -> Decoder {
        EnvelopeDecoder::new(self.envelope.delta_types.iter().cloned()).into_decoder()
    }

    pub fn reconnect_policy(&self) -> Arc<dyn ReconnectPolicy> {
        self.reconnect.build_policy()
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.channels.connect_timeout_secs > 0)
            .then(|| Duration::from_secs(self.channels.connect_timeout_secs))
    }

    /// Event stream URL: env, then `events_url`, then derived from
    /// `backend_url`.
    pub fn events_url(&self) -> Result<Url> {
        self.events_url_with(|key| std::env::var(key).ok())
    }

    /// Socket URL: env, then `socket_url`, then derived from `backend_url`.
    pub fn socket_url(&self) -> Result<Url> {
        self.socket_url_with(|key| std::env::var(key).ok())
    }

    fn events_url_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Url> {
        if let Some(url) = explicit_url(env(EVENTS_URL_ENV), self.channels.events_url.as_ref()) {
            return parse_url(&url, &["http", "https"]);
        }
        let backend = self.backend_url()?;
        let url = format!("{}{EVENTS_PATH}", backend.as_str().trim_end_matches('/'));
        parse_url(&url, &["http", "https"])
    }

    fn socket_url_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Url> {
        if let Some(url) = explicit_url(env(SOCKET_URL_ENV), self.channels.socket_url.as_ref()) {
            return parse_url(&url, &["ws", "wss"]);
        }
        let mut url = self.backend_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| anyhow::anyhow!("Cannot derive socket URL from {url}"))?;
        url.set_path(SOCKET_PATH);
        url.set_query(None);
        Ok(url)
    }

    fn backend_url(&self) -> Result<Url> {
        let Some(backend) = self.channels.backend_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            bail!("No backend_url configured; set channels.backend_url or the channel URLs");
        };
        parse_url(backend, &["http", "https"])
    }
}

fn explicit_url(env: Option<String>, configured: Option<&String>) -> Option<String> {
    env.filter(|u| !u.trim().is_empty())
        .or_else(|| configured.filter(|u| !u.trim().is_empty()).cloned())
}

/// Parses `raw` and checks its scheme against `schemes`.
pub fn parse_url(raw: &str, schemes: &[&str]) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("Invalid URL '{raw}'"))?;
    if !schemes.contains(&url.scheme()) {
        bail!(
            "URL '{raw}' must use one of: {}",
            schemes.join(", ")
        );
    }
    Ok(url)
}

pub mod paths {
    //! Path resolution for tagstream configuration.
    //!
    //! TAGSTREAM_HOME resolution order:
    //! 1. TAGSTREAM_HOME environment variable (if set)
    //! 2. ~/.config/tagstream (default)
    //! 3. ./.tagstream when no home directory is known

    use std::path::PathBuf;

    /// Returns the tagstream home directory.
    pub fn tagstream_home() -> PathBuf {
        if let Ok(home) = std::env::var("TAGSTREAM_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".tagstream"),
            |h| h.join(".config").join("tagstream"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        tagstream_home().join("config.toml")
    }
}
