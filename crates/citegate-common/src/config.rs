//! Configuration loading for citegate.
//! Reads citegate.toml from the current directory or path in CITEGATE_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CitegateError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoresConfig {
    /// Path to the embedded SQLite cache. None disables the tier.
    pub sqlite_path: Option<String>,
    /// Base URL of the remote source-page store. None disables the tier.
    pub remote_base_url: Option<String>,
    /// Base URL of the resource catalog API. None disables catalog lookups.
    pub catalog_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_session_cache_capacity")]
    pub session_cache_capacity: usize,
    /// Optional HTML→markdown extraction service, tried before the
    /// built-in HTML→text fallback.
    pub markdown_service_url: Option<String>,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_timeout_secs()           -> u64   { 15 }
fn default_max_retries()            -> u32   { 2 }
fn default_session_cache_capacity() -> usize { 500 }
fn default_batch_concurrency()      -> usize { 3 }
fn default_batch_delay_ms()         -> u64   { 1000 }

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            session_cache_capacity: default_session_cache_capacity(),
            markdown_service_url: None,
            batch_concurrency: default_batch_concurrency(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Env var holding the API key for remote backends.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_backend()     -> String { "ollama".to_string() }
fn default_model()       -> String { "llama3:8b".to_string() }
fn default_base_url()    -> String { "http://localhost:11434".to_string() }
fn default_api_key_env() -> String { "CITEGATE_LLM_API_KEY".to_string() }
fn default_max_tokens()  -> u32    { 2048 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    #[serde(default = "default_audit_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_audit_delay_ms")]
    pub delay_ms: u64,
}

fn default_pass_threshold()    -> f64   { 0.8 }
fn default_audit_concurrency() -> usize { 3 }
fn default_audit_delay_ms()    -> u64   { 300 }

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            concurrency: default_audit_concurrency(),
            delay_ms: default_audit_delay_ms(),
        }
    }
}

impl Config {
    /// Load from the given path, or from CITEGATE_CONFIG / ./citegate.toml.
    /// A missing file yields defaults. Also loads .env for API keys.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("CITEGATE_CONFIG")
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|_| std::path::PathBuf::from("citegate.toml")),
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .map_err(|e| CitegateError::Config(format!("read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| CitegateError::Config(format!("parse {}: {e}", path.display())))
    }
}
