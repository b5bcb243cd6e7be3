use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Environment variable pointing at an explicit configuration file.
pub const CONFIG_ENV: &str = "MAILFORM_CONFIG";

/// Configuration file looked up in the working directory when
/// [`CONFIG_ENV`] is not set.
pub const CONFIG_FILE: &str = "mailform.toml";

/// Top-level configuration for Mailform.
///
/// Every section is optional, a missing file yields [`Config::default`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub smtp: SmtpConfig,

    #[serde(default)]
    pub message: MessageConfig,
}

/// Remote resource fetching configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Upper bound for a single HTTP GET, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// SMTP client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Name announced in `EHLO`/`HELO`.
    #[serde(default = "default_helo")]
    pub helo: String,

    /// Upgrade the connection when the relay advertises `STARTTLS`.
    #[serde(default = "default_true")]
    pub starttls: bool,

    /// Extra PEM trust anchor, added to the bundled web PKI roots.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            helo: default_helo(),
            starttls: default_true(),
            ca_cert: None,
        }
    }
}

/// Headers generated when the template does not provide them.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageConfig {
    /// Adds a `Date` header.
    #[serde(default = "default_true")]
    pub date: bool,

    /// Adds a `Message-ID` header.
    #[serde(default = "default_true")]
    pub message_id: bool,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            date: default_true(),
            message_id: default_true(),
        }
    }
}

/// Loads configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Resolves the configuration for the current process.
///
/// An explicit [`CONFIG_ENV`] path must exist, while the implicit
/// [`CONFIG_FILE`] is only read when present.
pub fn discover_config() -> Result<Config, ConfigError> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        debug!(path = %path, "Loading configuration from environment");
        return load_config(Path::new(&path));
    }
    let path = Path::new(CONFIG_FILE);
    if path.is_file() {
        debug!(path = %path.display(), "Loading configuration from working directory");
        return load_config(path);
    }
    Ok(Config::default())
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred reading the file.
    #[error("Config I/O error: {0}")]
    Io(#[source] std::io::Error),
    /// A parse error occurred deserializing TOML.
    #[error("Config parse error: {0}")]
    Parse(#[source] toml::de::Error),
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_helo() -> String {
    "localhost".to_string()
}

fn default_true() -> bool {
    true
}
