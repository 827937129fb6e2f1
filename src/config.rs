//! TOML configuration.
//!
//! ```toml
//! [knowledge_base]
//! id = "STFZ4NQBSR"
//! region = "us-east-1"
//! max_results = 10
//! timeout_secs = 30
//!
//! [server]
//! bind = "127.0.0.1:7331"
//! ```
//!
//! Credentials are not part of the config file; see
//! [`AwsCredentials::from_env`](crate::bedrock::AwsCredentials::from_env).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    /// Opaque knowledge-base identifier, fixed for the process lifetime.
    pub id: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Overrides the regional Bedrock Agent Runtime endpoint.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_results() -> u32 {
    10
}
fn default_timeout_secs() -> u64 {
    30
}

impl KnowledgeBaseConfig {
    /// Region from config, then `AWS_REGION`, then `us-east-1`.
    pub fn resolved_region(&self) -> String {
        self.region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .unwrap_or_else(|| "us-east-1".to_string())
    }
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
    "127.0.0.1:7331".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let kb = &config.knowledge_base;

    if kb.id.trim().is_empty() {
        bail!("knowledge_base.id must not be empty");
    }

    // Bedrock caps numberOfResults at 100
    if !(1..=100).contains(&kb.max_results) {
        bail!("knowledge_base.max_results must be in [1, 100]");
    }

    if kb.timeout_secs == 0 {
        bail!("knowledge_base.timeout_secs must be > 0");
    }

    if let Some(ref url) = kb.endpoint_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!(
                "knowledge_base.endpoint_url must start with http:// or https://, got '{}'",
                url
            );
        }
    }

    Ok(())
}
