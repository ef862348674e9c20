use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use relay_domain::{
    FilterList, MatchPolicy, RuntimeConfig, Server, SignatureScheme, HISTORY_RETENTION,
};

use crate::config::validation::validate_server_name;

pub const CONFIG_ENV: &str = "RELAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./config.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub storage_path: String,
    pub backend: HistoryBackend,
    pub retention: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            storage_path: "./storage".to_string(),
            backend: HistoryBackend::File,
            retention: HISTORY_RETENTION,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 120,
            sweep_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Listen port of older configs; binds all interfaces when set.
    pub port: Option<u16>,
    /// Single-server secret, served at the unnamed webhook path.
    pub secret: Option<String>,
    /// Signature scheme of the single-server `secret`.
    pub signature: SignatureScheme,
    pub servers: BTreeMap<String, Server>,
    pub discord: DiscordConfig,
    pub history: HistoryConfig,
    pub filter: FilterList,
    pub filters_path: Option<String>,
    pub filter_policy: MatchPolicy,
    pub dedup: DedupConfig,
    pub max_body_bytes: u64,
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            port: None,
            secret: None,
            signature: SignatureScheme::default(),
            servers: BTreeMap::new(),
            discord: DiscordConfig::default(),
            history: HistoryConfig::default(),
            filter: FilterList::default(),
            filters_path: None,
            filter_policy: MatchPolicy::default(),
            dedup: DedupConfig::default(),
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 15,
        }
    }
}

impl AppConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path)).await
    }

    /// Reads `path` (TOML, or JSON when the extension is `.json`), then
    /// applies environment overrides, normalization and validation.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            Self::parse(path, &content)?
        } else {
            warn!("{} not found, using defaults", path.display());
            AppConfig::default()
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.resolve_paths(path.parent());
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(content)
                .with_context(|| format!("invalid JSON config {}", path.display()))
        } else {
            toml::from_str(content)
                .with_context(|| format!("invalid TOML config {}", path.display()))
        }
    }

    pub fn normalize(&mut self) {
        if let Some(port) = self.port.take() {
            self.bind_addr = format!("0.0.0.0:{}", port);
        }
        self.secret = blank_to_none(self.secret.take());
        self.discord.webhook_url = blank_to_none(self.discord.webhook_url.take());
        self.filters_path = blank_to_none(self.filters_path.take());
        if self.history.storage_path.trim().is_empty() {
            self.history.storage_path = HistoryConfig::default().storage_path;
        }
        for filter in self.filter.iter_mut() {
            filter.normalize_legacy_format();
        }
    }

    fn resolve_paths(&mut self, base_dir: Option<&Path>) {
        let Some(base) = base_dir else {
            return;
        };
        self.history.storage_path = resolve_path(base, &self.history.storage_path);
        if let Some(path) = &self.filters_path {
            self.filters_path = Some(resolve_path(base, path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|err| anyhow!("invalid bind_addr: {}", err))?;
        if self.secret.is_some() && !self.servers.is_empty() {
            return Err(anyhow!(
                "can not have a secret and servers configured at the same time"
            ));
        }
        for (name, server) in &self.servers {
            validate_server_name(name)?;
            if server.secret.trim().is_empty() {
                return Err(anyhow!("server '{}' has an empty secret", name));
            }
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than 0"));
        }
        if self.history.retention == 0 {
            return Err(anyhow!("history.retention must be greater than 0"));
        }
        if self.dedup.sweep_interval_seconds == 0 {
            return Err(anyhow!("dedup.sweep_interval_seconds must be greater than 0"));
        }
        Ok(())
    }

    /// Servers by routing name. A single-server `secret` is registered under
    /// the empty name.
    pub fn server_map(&self) -> HashMap<String, Server> {
        match &self.secret {
            Some(secret) => HashMap::from([(
                String::new(),
                Server::new(secret.clone()).with_scheme(self.signature),
            )]),
            None => self
                .servers
                .iter()
                .map(|(name, server)| (name.clone(), server.clone()))
                .collect(),
        }
    }

    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: self.bind_addr.clone(),
            servers: self.server_map(),
            max_body_bytes: self.max_body_bytes,
            request_timeout_seconds: self.request_timeout_seconds,
            dedup_ttl_seconds: self.dedup.ttl_seconds,
            dedup_sweep_interval_seconds: self.dedup.sweep_interval_seconds,
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("RELAY_BIND_ADDR") {
            self.bind_addr = value;
            self.port = None;
        }
        if let Some(value) = lookup("RELAY_SECRET") {
            self.secret = Some(value);
        }
        if let Some(value) = lookup("RELAY_DISCORD_WEBHOOK_URL") {
            self.discord.webhook_url = Some(value);
        }
        if let Some(value) = lookup("RELAY_HISTORY_PATH") {
            self.history.storage_path = value;
        }
        if let Some(value) = lookup("RELAY_FILTERS_PATH") {
            self.filters_path = Some(value);
        }
        if let Some(value) = lookup("RELAY_MAX_BODY_BYTES") {
            self.max_body_bytes = value.parse().unwrap_or(self.max_body_bytes);
        }
        if let Some(value) = lookup("RELAY_REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = value.parse().unwrap_or(self.request_timeout_seconds);
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn resolve_path(base: &Path, value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }
    let path = Path::new(trimmed);
    if path.is_absolute() {
        trimmed.to_string()
    } else {
        base.join(path).to_string_lossy().to_string()
    }
}
