//! Configuration loading and defaults for idlewatchd.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outbound mail settings, used only by the SMTP notifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmtpConfig {
    /// SMTP relay host.
    pub host: String,

    /// SMTP port (default: 587).
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Upgrade the connection with STARTTLS (default: true).
    #[serde(default = "default_use_encryption")]
    pub use_encryption: bool,

    /// Sender mailbox, e.g. `idlewatchd <bot@example.com>`.
    pub from: String,

    /// Recipient mailbox.
    pub to: String,

    /// Login name for the relay.
    pub username: String,

    /// Password for the relay.
    pub password: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_encryption() -> bool {
    true
}

/// Main configuration for idlewatchd.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds without input before the machine counts as idle (default: 300).
    pub threshold_seconds: u64,

    /// Milliseconds between idle samples (default: 1000).
    pub check_interval_ms: u64,

    /// Name reported in notifications. Defaults to the hostname.
    pub machine_name: Option<String>,

    /// Log file path. If unset, logs go to stderr.
    pub log_file: Option<PathBuf>,

    /// Dry run mode: log notifications instead of mailing them.
    pub dry_run: bool,

    /// Mail transport settings. Required unless `dry_run` is set.
    pub smtp: Option<SmtpConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold_seconds: 300,
            check_interval_ms: 1000,
            machine_name: None,
            log_file: None,
            dry_run: false,
            smtp: None,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(default_path) = default_path()
            && default_path.exists()
        {
            return Self::load(&default_path);
        }

        Ok(Self::default())
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.threshold_seconds > 0, "threshold_seconds must be greater than 0");
        anyhow::ensure!(self.check_interval_ms > 0, "check_interval_ms must be greater than 0");
        anyhow::ensure!(
            self.dry_run || self.smtp.is_some(),
            "No [smtp] section configured. Add one or run with --dry-run."
        );
        Ok(())
    }

    /// Poll period as a `Duration`.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Machine identity used in notifications.
    pub fn machine_name(&self) -> String {
        match self.machine_name {
            Some(ref name) if !name.trim().is_empty() => name.clone(),
            _ => gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }
}

/// `$XDG_CONFIG_HOME/idlewatchd/config.toml`, if a config dir exists.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("idlewatchd").join("config.toml"))
}
