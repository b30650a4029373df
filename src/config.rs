//! Engine configuration
//!
//! The values are fixed once an [`crate::inference::Engine`] is built. They can
//! be persisted as JSON so a host can ship its own defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::inference::backend::{ContextParams, ModelParams};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access data directory: {0}")]
    DataDirError(String),
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to serialize/deserialize JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Context window size in tokens
    pub context_size: u32,
    /// Threads used while generating
    pub threads: u32,
    /// Threads used while processing the prompt
    pub batch_threads: u32,
    /// Prompt tokens submitted per decode call
    pub prompt_chunk_size: u32,
    /// Maximum number of tokens to generate
    pub max_new_tokens: u32,
    /// Bytes kept from a single token's text piece
    pub token_piece_capacity: u32,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_size: 1024,
            threads: 4,
            batch_threads: 4,
            prompt_chunk_size: 8,
            max_new_tokens: 256,
            token_piece_capacity: 128,
            gpu_layers: 0,
        }
    }
}

impl EngineConfig {
    /// Replaces zero values with defaults and keeps the chunk inside the window.
    pub fn validate(&mut self) {
        let defaults = Self::default();

        if self.context_size == 0 {
            self.context_size = defaults.context_size;
        }
        if self.threads == 0 {
            self.threads = defaults.threads;
        }
        if self.batch_threads == 0 {
            self.batch_threads = defaults.batch_threads;
        }
        if self.prompt_chunk_size == 0 {
            self.prompt_chunk_size = defaults.prompt_chunk_size;
        }
        if self.max_new_tokens == 0 {
            self.max_new_tokens = defaults.max_new_tokens;
        }
        if self.token_piece_capacity == 0 {
            self.token_piece_capacity = defaults.token_piece_capacity;
        }

        self.prompt_chunk_size = self.prompt_chunk_size.min(self.context_size);
    }

    pub fn context_params(&self) -> ContextParams {
        ContextParams {
            n_ctx: self.context_size,
            n_batch: self.prompt_chunk_size,
            n_threads: self.threads as i32,
            n_threads_batch: self.batch_threads as i32,
        }
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            gpu_layers: self.gpu_layers,
        }
    }
}

/// `config.json` in the platform data directory
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    directories::ProjectDirs::from("dev", "ondevice-llm", "ondevice-llm")
        .map(|dirs| dirs.data_dir().join("config.json"))
        .ok_or_else(|| ConfigError::DataDirError("Could not determine data directory".to_string()))
}

/// Load configuration from disk
///
/// Returns defaults if the file doesn't exist or is corrupted
pub fn load_config(path: &Path) -> EngineConfig {
    match load_config_internal(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            EngineConfig::default()
        }
    }
}

fn load_config_internal(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found, using defaults");
        return Ok(EngineConfig::default());
    }

    let json = fs::read_to_string(path)?;
    let mut config: EngineConfig = serde_json::from_str(&json)?;
    config.validate();

    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn save_config(path: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;

    tracing::debug!("Saved config to {}", path.display());
    Ok(())
}
