//! TOML configuration.
//!
//! Every section is optional; a missing file yields the built-in defaults
//! when loaded through [`Config::load_or_default`].
//!
//! ```toml
//! [dispatch]
//! timeout_secs = 30
//!
//! [server]
//! bind = "127.0.0.1:7340"
//!
//! [targets]
//! collector = "http://localhost:5000"
//! knowledge = "http://localhost:5001"
//! database = "http://localhost:5002"
//! transformer = "http://localhost:5003"
//! orchestrator = "http://localhost:5004"
//! ```
//!
//! After the file is read, environment variables override individual
//! values: `ACON_<TARGET>_URL` (e.g. `ACON_KNOWLEDGE_URL`),
//! `ACON_TIMEOUT_SECS` and `ACON_BIND`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::target::Target;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Per-request timeout. Expiry counts as a transport failure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// Base URL per target.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetsConfig {
    #[serde(default = "default_collector_url")]
    pub collector: String,
    #[serde(default = "default_knowledge_url")]
    pub knowledge: String,
    #[serde(default = "default_database_url")]
    pub database: String,
    #[serde(default = "default_transformer_url")]
    pub transformer: String,
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator: String,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            collector: default_collector_url(),
            knowledge: default_knowledge_url(),
            database: default_database_url(),
            transformer: default_transformer_url(),
            orchestrator: default_orchestrator_url(),
        }
    }
}

fn default_collector_url() -> String {
    Target::Collector.info().default_url.to_string()
}
fn default_knowledge_url() -> String {
    Target::Knowledge.info().default_url.to_string()
}
fn default_database_url() -> String {
    Target::Database.info().default_url.to_string()
}
fn default_transformer_url() -> String {
    Target::Transformer.info().default_url.to_string()
}
fn default_orchestrator_url() -> String {
    Target::Orchestrator.info().default_url.to_string()
}

impl TargetsConfig {
    /// Base URL for `target`, without a trailing slash.
    pub fn base_url(&self, target: Target) -> &str {
        match target {
            Target::Collector => &self.collector,
            Target::Knowledge => &self.knowledge,
            Target::Database => &self.database,
            Target::Transformer => &self.transformer,
            Target::Orchestrator => &self.orchestrator,
        }
    }

    fn base_url_mut(&mut self, target: Target) -> &mut String {
        match target {
            Target::Collector => &mut self.collector,
            Target::Knowledge => &mut self.knowledge,
            Target::Database => &mut self.database,
            Target::Transformer => &mut self.transformer,
            Target::Orchestrator => &mut self.orchestrator,
        }
    }

    /// Point every target at the same host; used by tests and local mocks.
    pub fn all(url: &str) -> Self {
        Self {
            collector: url.to_string(),
            knowledge: url.to_string(),
            database: url.to_string(),
            transformer: url.to_string(),
            orchestrator: url.to_string(),
        }
    }
}

impl Config {
    /// Load `path` if it exists, otherwise start from defaults.
    ///
    /// Environment overrides and validation apply in both cases.
    pub fn load_or_default(path: &Path) -> Result<Config> {
        if path.exists() {
            return load_config(path);
        }
        tracing::warn!(
            path = %path.display(),
            "config file not found, using defaults"
        );
        Config::default().finish(|key| std::env::var(key).ok())
    }

    fn finish(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
        self.apply_overrides(lookup);
        self.normalize();
        self.validate()?;
        Ok(self)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for target in Target::ALL {
            let key = format!("ACON_{}_URL", target.id().to_uppercase());
            if let Some(url) = lookup(&key) {
                tracing::debug!(agent = %target, %url, "base url overridden from environment");
                *self.targets.base_url_mut(target) = url;
            }
        }
        if let Some(raw) = lookup("ACON_TIMEOUT_SECS") {
            match raw.parse() {
                Ok(secs) => self.dispatch.timeout_secs = secs,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid ACON_TIMEOUT_SECS"),
            }
        }
        if let Some(bind) = lookup("ACON_BIND") {
            self.server.bind = bind;
        }
    }

    fn normalize(&mut self) {
        for target in Target::ALL {
            let url = self.targets.base_url_mut(target);
            let trimmed = url.trim().trim_end_matches('/').to_string();
            *url = trimmed;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.dispatch.timeout_secs == 0 {
            bail!("dispatch.timeout_secs must be > 0");
        }

        for target in Target::ALL {
            let raw = self.targets.base_url(target);
            let url = reqwest::Url::parse(raw)
                .with_context(|| format!("targets.{} is not a valid URL: '{}'", target, raw))?;
            match url.scheme() {
                "http" | "https" => {}
                other => bail!(
                    "targets.{} must use http or https, got '{}'",
                    target,
                    other
                ),
            }
        }

        Ok(())
    }
}

/// Read, override and validate the configuration at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.finish(|key| std::env::var(key).ok())
}
