use std::fmt;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SmtpConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Announced in the greeting and the EHLO reply
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Seconds
    #[serde(default = "default_timeout")]
    pub read_timeout: u64,
    /// Seconds
    #[serde(default = "default_timeout")]
    pub write_timeout: u64,
    /// Bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl SmtpConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            hostname: default_hostname(),
            read_timeout: default_timeout(),
            write_timeout: default_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct DeliveryConfig {
    /// Full URL messages are posted to
    #[serde(default)]
    pub webhook: String,
    #[serde(default = "default_api_user")]
    pub api_user: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook: String::new(),
            api_user: default_api_user(),
            api_key: String::new(),
        }
    }
}

impl fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("webhook", &self.webhook)
            .field("api_user", &self.api_user)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Values given on the command line or through the environment, they win
/// over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<SocketAddr>,
    pub hostname: Option<String>,
    pub read_timeout: Option<u64>,
    pub write_timeout: Option<u64>,
    pub max_message_size: Option<usize>,
    pub webhook: Option<String>,
    pub api_user: Option<String>,
    pub api_key: Option<String>,
}

impl Config {
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            bind_addr,
            hostname,
            read_timeout,
            write_timeout,
            max_message_size,
            webhook,
            api_user,
            api_key,
        } = overrides;

        if let Some(v) = bind_addr {
            self.smtp.bind_addr = v;
        }
        if let Some(v) = hostname {
            self.smtp.hostname = v;
        }
        if let Some(v) = read_timeout {
            self.smtp.read_timeout = v;
        }
        if let Some(v) = write_timeout {
            self.smtp.write_timeout = v;
        }
        if let Some(v) = max_message_size {
            self.smtp.max_message_size = v;
        }
        if let Some(v) = webhook {
            self.delivery.webhook = v;
        }
        if let Some(v) = api_user {
            self.delivery.api_user = v;
        }
        if let Some(v) = api_key {
            self.delivery.api_key = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.delivery.api_key.is_empty() {
            bail!("an API key is required (--api-key or [delivery] api_key)");
        }
        if self.delivery.webhook.is_empty() {
            bail!("a webhook URL is required (--webhook or [delivery] webhook)");
        }
        if self.smtp.max_message_size == 0 {
            bail!("the maximum message size must be greater than zero");
        }
        if self.smtp.read_timeout == 0 || self.smtp.write_timeout == 0 {
            bail!("timeouts must be at least one second");
        }
        Ok(())
    }
}

pub fn read_config(config_file: PathBuf) -> Result<Config> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())
        .with_context(|| format!("unable to open {}", config_file.display()))?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}

/// The file is optional, every setting can come from the overrides.
pub fn load(config_file: Option<PathBuf>, overrides: ConfigOverrides) -> Result<Config> {
    let mut config = match config_file {
        Some(path) => read_config(path)?,
        None => Config::default(),
    };
    config.apply(overrides);
    config.validate()?;
    Ok(config)
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 25))
}

fn default_hostname() -> String {
    "localhost".into()
}

fn default_timeout() -> u64 {
    5
}

fn default_max_message_size() -> usize {
    2 * 1024 * 1024
}

fn default_api_user() -> String {
    "api".into()
}
