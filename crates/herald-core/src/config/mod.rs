mod defaults;


use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::HeraldError;
use defaults::*;

/// Top-level Herald configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub herald: HeraldConfig,
    #[serde(default)]
    pub zulip: ZulipConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
    #[serde(default)]
    pub kita: KitaConfig,
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Zulip connection and authorization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZulipConfig {
    #[serde(default = "default_zulip_site")]
    pub site: String,
    /// Bot account email.
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub api_key: String,
    /// Optional `zuliprc` file; its `[api]` values fill empty fields above.
    #[serde(default)]
    pub zuliprc: Option<String>,
    /// User allowed to remove any subscription and reset token counters.
    #[serde(default)]
    pub admin_id: i64,
}

impl Default for ZulipConfig {
    fn default() -> Self {
        Self {
            site: default_zulip_site(),
            email: String::new(),
            api_key: String::new(),
            zuliprc: None,
            admin_id: 0,
        }
    }
}

impl ZulipConfig {
    /// Fill empty credentials from the configured `zuliprc` file.
    ///
    /// Values already set in config.toml or the environment win.
    pub fn resolve_zuliprc(&mut self) -> Result<(), HeraldError> {
        let Some(ref path) = self.zuliprc else {
            return Ok(());
        };
        let path = shellexpand(path);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| HeraldError::Config(format!("failed to read zuliprc {path}: {e}")))?;
        let api = parse_zuliprc(&content);

        if self.email.is_empty() {
            if let Some(email) = api.email {
                self.email = email;
            }
        }
        if self.api_key.is_empty() {
            if let Some(key) = api.key {
                self.api_key = key;
            }
        }
        if let Some(site) = api.site {
            if self.site == default_zulip_site() {
                self.site = site;
            }
        }
        Ok(())
    }

    /// Whether enough credentials are present to talk to the server.
    pub fn is_configured(&self) -> bool {
        !self.email.is_empty() && !self.api_key.is_empty() && !self.site.is_empty()
    }
}

/// Values read from the `[api]` section of a zuliprc file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ZuliprcApi {
    pub email: Option<String>,
    pub key: Option<String>,
    pub site: Option<String>,
}

/// Parse the `[api]` section of a zuliprc (INI) file.
pub fn parse_zuliprc(content: &str) -> ZuliprcApi {
    let mut api = ZuliprcApi::default();
    let mut in_api = false;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_api = &line[1..line.len() - 1] == "api";
            continue;
        }
        if !in_api {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "email" => api.email = Some(value),
            "key" => api.key = Some(value),
            "site" => api.site = Some(value),
            _ => {}
        }
    }
    api
}

/// Subscription bot ("arxiv") settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivConfig {
    /// JSON snapshot of the subscription registry.
    #[serde(default = "default_arxiv_db_file")]
    pub db_file: String,
    #[serde(default = "default_arxiv_api_url")]
    pub api_url: String,
    /// UTC hour of the daily digest.
    #[serde(default = "default_digest_hour")]
    pub hour: u32,
    /// UTC minute of the daily digest.
    #[serde(default)]
    pub minute: u32,
    /// Newest results fetched per subscription.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Minimum spacing between arXiv API requests.
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            db_file: default_arxiv_db_file(),
            api_url: default_arxiv_api_url(),
            hour: default_digest_hour(),
            minute: 0,
            max_results: default_max_results(),
            min_interval_secs: default_min_interval_secs(),
        }
    }
}

/// Assistant bot ("kita") settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitaConfig {
    /// SQLite database holding the token usage table.
    #[serde(default = "default_kita_db_file")]
    pub db_file: String,
    #[serde(default = "default_kita_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Token ceiling per user before completions are refused.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
    /// Turns kept per conversation.
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,
}

impl Default for KitaConfig {
    fn default() -> Self {
        Self {
            db_file: default_kita_db_file(),
            model: default_kita_model(),
            base_url: default_openai_base_url(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            memory_window: default_memory_window(),
            max_completion_tokens: default_max_completion_tokens(),
        }
    }
}

impl Config {
    /// Apply environment overrides using the given lookup.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("ZULIP_SITE") {
            self.zulip.site = v;
        }
        if let Some(v) = get("ZULIP_EMAIL") {
            self.zulip.email = v;
        }
        if let Some(v) = get("ZULIP_API_KEY") {
            self.zulip.api_key = v;
        }
        if let Some(v) = get("ZULIP_CONFIG") {
            self.zulip.zuliprc = Some(v);
        }
        if let Some(v) = get("ZULIP_ADMIN_ID") {
            match v.parse() {
                Ok(id) => self.zulip.admin_id = id,
                Err(e) => warn!("ignoring ZULIP_ADMIN_ID={v}: {e}"),
            }
        }
        if let Some(v) = get("ARXIV_DB_FILE") {
            self.arxiv.db_file = v;
        }
        if let Some(v) = get("HERALD_DIGEST_HOUR") {
            match v.parse::<u32>() {
                Ok(h) if h < 24 => self.arxiv.hour = h,
                _ => warn!("ignoring HERALD_DIGEST_HOUR={v}: expected 0-23"),
            }
        }
        if let Some(v) = get("KITA_DB_FILE") {
            self.kita.db_file = v;
        }
        if let Some(v) = get("KITA_MODEL") {
            self.kita.model = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.kita.api_key = v;
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), HeraldError> {
        if self.arxiv.hour > 23 || self.arxiv.minute > 59 {
            return Err(HeraldError::Config(format!(
                "invalid digest time {:02}:{:02}",
                self.arxiv.hour, self.arxiv.minute
            )));
        }
        if self.kita.memory_window == 0 {
            return Err(HeraldError::Config(
                "kita.memory_window must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Read `KEY=value` pairs from a dotenv file. A missing file yields nothing.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, HeraldError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| HeraldError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            HeraldError::Config(format!("invalid line in {}: {e}", path.display()))
        })?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Load configuration from a TOML file, then apply environment overrides.
///
/// Overrides come from the process environment, then from `.env` in the
/// working directory. Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, HeraldError> {
    load_with_env_file(path, Path::new(".env"))
}

/// [`load`] with an explicit dotenv file.
pub fn load_with_env_file(path: &str, env_file: &Path) -> Result<Config, HeraldError> {
    let file = Path::new(path);
    let mut config = if file.exists() {
        let content = std::fs::read_to_string(file).map_err(|e| {
            HeraldError::Config(format!("failed to read {}: {}", file.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| HeraldError::Config(format!("failed to parse config: {}", e)))?
    } else {
        info!(
            "Config file not found at {}, using defaults",
            file.display()
        );
        Config::default()
    };

    let dotenv = read_env_file(env_file)?;
    if !dotenv.is_empty() {
        info!("Loaded {} variables from {}", dotenv.len(), env_file.display());
    }
    config.apply_env(|key| std::env::var(key).ok().or_else(|| dotenv.get(key).cloned()));
    config.zulip.resolve_zuliprc()?;
    config.validate()?;
    Ok(config)
}
