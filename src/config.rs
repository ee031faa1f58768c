use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::loader::parser::parse_json_file;

/// Service settings. Defaults match the in-cluster deployment, a JSON file
/// may override them and environment variables override both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api_bind: String,
    pub redis_url: String,
    pub vdag_registry_url: String,
    pub search_server_url: String,
    pub discovery_url: String,
    pub tasks_db_url: String,
    pub policy_executor_url: String,
    pub inputs_queue: String,
    pub task_updates_queue: String,
    pub http_timeout_secs: u64,
    pub connection_cache_capacity: usize,
    pub connection_cache_ttl_secs: u64,
    pub policy_cache_capacity: usize,
    /// 0 keeps cached policies for the lifetime of the process.
    pub policy_cache_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_bind: "0.0.0.0:10500".to_string(),
            redis_url: "redis://localhost:6379/0".to_string(),
            vdag_registry_url: "http://localhost:10501".to_string(),
            search_server_url: "http://localhost:12000".to_string(),
            discovery_url: "http://localhost:20000".to_string(),
            tasks_db_url: "http://localhost:8000".to_string(),
            policy_executor_url: "http://localhost:10350".to_string(),
            inputs_queue: "INPUTS".to_string(),
            task_updates_queue: "TASK_UPDATES".to_string(),
            http_timeout_secs: 30,
            connection_cache_capacity: 128,
            connection_cache_ttl_secs: 600,
            policy_cache_capacity: 64,
            policy_cache_ttl_secs: 0,
        }
    }
}

const ENV_OVERRIDES: &[&str] = &[
    "VDAG_API_BIND",
    "REDIS_HOST_URL",
    "VDAG_DB_API_URL",
    "SEARCH_SERVER_API_URL",
    "ADHOC_INFERENCE_API_URL",
    "GLOBAL_TASKS_DB_URL",
    "POLICY_EXECUTOR_URL",
];

impl Settings {
    /// Defaults, then the optional JSON file, then the process environment.
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let base = match config_file {
            Some(path) => parse_json_file::<Settings>(path)?,
            None => Settings::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Applies overrides from any key/value source (the environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for &key in ENV_OVERRIDES {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                self.apply_override(key, value);
            }
        }
        self
    }

    fn apply_override(&mut self, key: &str, value: String) {
        match key {
            "VDAG_API_BIND" => self.api_bind = value,
            "REDIS_HOST_URL" => self.redis_url = value,
            "VDAG_DB_API_URL" => self.vdag_registry_url = value,
            "SEARCH_SERVER_API_URL" => self.search_server_url = value,
            "ADHOC_INFERENCE_API_URL" => self.discovery_url = value,
            "GLOBAL_TASKS_DB_URL" => self.tasks_db_url = value,
            "POLICY_EXECUTOR_URL" => self.policy_executor_url = value,
            _ => {}
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connection_cache_ttl(&self) -> Option<Duration> {
        ttl(self.connection_cache_ttl_secs)
    }

    pub fn policy_cache_ttl(&self) -> Option<Duration> {
        ttl(self.policy_cache_ttl_secs)
    }
}

fn ttl(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Settings of a single block instance running the packet router.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSettings {
    pub block_id: String,
    /// The block's own queue endpoint (input queue and adhoc `OUTPUT` queue).
    pub redis_url: String,
}

impl BlockSettings {
    pub fn from_env(defaults: &Settings) -> Result<Self> {
        Self::from_lookup(defaults, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(defaults: &Settings, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let block_id = lookup("BLOCK_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Validation("BLOCK_ID environment variable is not set".to_string()))?;
        let redis_url = lookup("BLOCK_REDIS_URL").unwrap_or_else(|| defaults.redis_url.clone());

        Ok(BlockSettings { block_id, redis_url })
    }
}
