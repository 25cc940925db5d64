//! Configuration and models directory management.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::registry::{self, Quantization, DEFAULT_MODEL};

/// Default hub endpoint for model downloads.
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Directory name under the user's home when nothing else is configured.
const DEFAULT_DIR_NAME: &str = ".siglip2_models";

/// Default ONNX Runtime intra-op thread count.
const DEFAULT_INTRA_THREADS: usize = 2;

static MODELS_DIR_OVERRIDE: Lazy<RwLock<Option<PathBuf>>> = Lazy::new(|| RwLock::new(None));

/// Process-wide models root.
///
/// Resolution order: `set_models_dir` override, `SIGLIP2_MODELS_DIR`,
/// then `~/.siglip2_models`.
pub fn models_dir() -> PathBuf {
    if let Some(dir) = MODELS_DIR_OVERRIDE.read().as_ref() {
        return dir.clone();
    }
    if let Ok(dir) = std::env::var("SIGLIP2_MODELS_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}

/// Override the models root for the whole process.
pub fn set_models_dir(path: impl AsRef<Path>) {
    *MODELS_DIR_OVERRIDE.write() = Some(path.as_ref().to_path_buf());
}

/// Drop a previous `set_models_dir` override.
pub fn reset_models_dir() {
    *MODELS_DIR_OVERRIDE.write() = None;
}

/// Top-level SigLIP2 configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SiglipConfig {
    /// Root under which model artifacts are stored.
    pub models_dir: PathBuf,
    /// Base URL of the model hub.
    pub hub_endpoint: String,
    /// Model identifier used when none is given.
    pub model: String,
    /// Quantization used when none is given.
    pub quantization: Quantization,
    /// Intra-op threads per ONNX session.
    pub intra_threads: usize,
}

impl Default for SiglipConfig {
    fn default() -> Self {
        Self {
            models_dir: models_dir(),
            hub_endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            quantization: Quantization::default(),
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}

impl SiglipConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::runtime_from_env()?;

        if let Ok(model) = std::env::var("SIGLIP2_MODEL") {
            registry::resolve(&model)?;
            config.model = model;
        }

        if let Ok(quant) = std::env::var("SIGLIP2_QUANTIZATION") {
            config.quantization = quant.parse()?;
        }

        Ok(config)
    }

    /// Like `from_env`, but only reads the hub endpoint and thread count.
    ///
    /// `model` and `quantization` keep their defaults and
    /// `SIGLIP2_MODEL`/`SIGLIP2_QUANTIZATION` are left unchecked, for
    /// callers that pick the selection themselves.
    pub fn runtime_from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("SIGLIP2_HUB_ENDPOINT") {
            if !endpoint.is_empty() {
                config.hub_endpoint = endpoint;
            }
        }

        if let Ok(threads) = std::env::var("SIGLIP2_INTRA_THREADS") {
            config.intra_threads = threads
                .parse()
                .map_err(|_| Error::Config(format!("Invalid SIGLIP2_INTRA_THREADS: {}", threads)))?;
        }

        Ok(config)
    }
}
