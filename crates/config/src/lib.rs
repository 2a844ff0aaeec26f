//! Client configuration: defaults, an optional TOML file, env overrides.
//!
//! Precedence, lowest to highest: built-in defaults, the config file
//! (explicit path or `config.toml` in the platform config dir), then
//! `VELLUM_*` environment variables.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
};

const ENV_URL: &str = "VELLUM_URL";
const ENV_UI_VERSION: &str = "VELLUM_UI_VERSION";
const ENV_TIMEOUT_MS: &str = "VELLUM_TIMEOUT_MS";
const ENV_STRICT_HANDSHAKE: &str = "VELLUM_STRICT_HANDSHAKE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Engine endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Version string reported in the handshake.
    pub ui_version: String,
    /// Per-request timeout in milliseconds; absent waits forever.
    pub request_timeout_ms: Option<u64>,
    /// Reject actions issued before the handshake completes.
    pub strict_handshake: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4000/".into(),
            ui_version: env!("CARGO_PKG_VERSION").into(),
            request_timeout_ms: None,
            strict_handshake: true,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(Error::UnsupportedScheme(other.to_string())),
        }
    }

    /// Apply `VELLUM_*` overrides from `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_URL) {
            self.url = url;
        }
        if let Some(version) = lookup(ENV_UI_VERSION) {
            self.ui_version = version;
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS) {
            match ms.parse() {
                Ok(ms) => self.request_timeout_ms = Some(ms),
                Err(_) => debug!(value = %ms, "ignoring unparseable timeout override"),
            }
        }
        if let Some(strict) = lookup(ENV_STRICT_HANDSHAKE) {
            self.strict_handshake = matches!(strict.as_str(), "1" | "true" | "yes");
        }
    }
}

/// Load configuration. An explicit `path` must exist; the default
/// location may be absent, in which case defaults apply.
pub fn load(path: Option<&Path>) -> Result<ClientConfig> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => match default_path() {
            Some(path) if path.exists() => parse_file(&path)?,
            _ => ClientConfig::default(),
        },
    };
    config.apply_overrides(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

/// `config.toml` in the platform config dir, e.g.
/// `~/.config/vellum/config.toml` on Linux.
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "vellum", "vellum")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn parse_file(path: &Path) -> Result<ClientConfig> {
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error("unsupported url scheme `{0}`; use ws:// or wss://")]
    UnsupportedScheme(String),
}

pub type Result<T> = std::result::Result<T, Error>;
