//! Static registry of SigLIP2 checkpoints published as ONNX on the hub.
//!
//! Maps short model identifiers to hub repositories and native image
//! resolutions, and enumerates the quantized weight variants each
//! repository ships.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "base-patch16-224";

/// Resolution used for identifiers without a registry entry.
pub const FALLBACK_RESOLUTION: u32 = 224;

/// One registered checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Short identifier, e.g. `base-patch16-224`.
    pub id: &'static str,
    /// Hub repository holding the ONNX export.
    pub repo: &'static str,
    /// Square input resolution of the vision tower.
    pub image_size: u32,
}

const fn model(id: &'static str, repo: &'static str, image_size: u32) -> ModelInfo {
    ModelInfo { id, repo, image_size }
}

/// All known checkpoints, in listing order.
pub static MODELS: &[ModelInfo] = &[
    // Base
    model("base-patch16-224", "onnx-community/siglip2-base-patch16-224-ONNX", 224),
    model("base-patch16-256", "onnx-community/siglip2-base-patch16-256-ONNX", 256),
    model("base-patch16-384", "onnx-community/siglip2-base-patch16-384-ONNX", 384),
    model("base-patch16-512", "onnx-community/siglip2-base-patch16-512-ONNX", 512),
    model("base-patch32-256", "onnx-community/siglip2-base-patch32-256-ONNX", 256),
    model("base-patch16-naflex", "onnx-community/siglip2-base-patch16-naflex-ONNX", 224),
    // Large
    model("large-patch16-256", "onnx-community/siglip2-large-patch16-256-ONNX", 256),
    model("large-patch16-384", "onnx-community/siglip2-large-patch16-384-ONNX", 384),
    model("large-patch16-512", "onnx-community/siglip2-large-patch16-512-ONNX", 512),
    // Giant (optimized)
    model("giant-opt-patch16-256", "onnx-community/siglip2-giant-opt-patch16-256-ONNX", 256),
    model("giant-opt-patch16-384", "onnx-community/siglip2-giant-opt-patch16-384-ONNX", 384),
    // SO400M
    model("so400m-patch14-224", "onnx-community/siglip2-so400m-patch14-224-ONNX", 224),
    model("so400m-patch14-384", "onnx-community/siglip2-so400m-patch14-384-ONNX", 384),
    model("so400m-patch16-256", "onnx-community/siglip2-so400m-patch16-256-ONNX", 256),
    model("so400m-patch16-384", "onnx-community/siglip2-so400m-patch16-384-ONNX", 384),
    model("so400m-patch16-512", "onnx-community/siglip2-so400m-patch16-512-ONNX", 512),
];

/// Weight precision variant of an ONNX export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    #[default]
    Fp32,
    Fp16,
    Int8,
    Uint8,
    Q4,
    Q4f16,
    Bnb4,
}

impl Quantization {
    /// Every variant, in listing order.
    pub const ALL: [Quantization; 7] = [
        Self::Fp32,
        Self::Fp16,
        Self::Int8,
        Self::Uint8,
        Self::Q4,
        Self::Q4f16,
        Self::Bnb4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fp32 => "fp32",
            Self::Fp16 => "fp16",
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Q4 => "q4",
            Self::Q4f16 => "q4f16",
            Self::Bnb4 => "bnb4",
        }
    }

    /// Suffix the hub appends to graph file names for this variant.
    ///
    /// Full precision graphs carry no suffix (`vision_model.onnx`); the rest
    /// are published as e.g. `vision_model_int8.onnx`.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Fp32 => "",
            Self::Fp16 => "_fp16",
            Self::Int8 => "_int8",
            Self::Uint8 => "_uint8",
            Self::Q4 => "_q4",
            Self::Q4f16 => "_q4f16",
            Self::Bnb4 => "_bnb4",
        }
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quantization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| Error::UnknownQuantization(s.to_string()))
    }
}

/// Look up a registered checkpoint.
pub fn model_info(identifier: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == identifier)
}

/// Resolve an identifier to its hub repository.
pub fn resolve(identifier: &str) -> Result<&'static str> {
    model_info(identifier)
        .map(|m| m.repo)
        .ok_or_else(|| Error::UnknownModel(identifier.to_string()))
}

/// Native image resolution for an identifier, 224 when unlisted.
pub fn default_resolution(identifier: &str) -> u32 {
    model_info(identifier)
        .map(|m| m.image_size)
        .unwrap_or(FALLBACK_RESOLUTION)
}

/// Registered identifiers in listing order.
pub fn list_models() -> Vec<&'static str> {
    MODELS.iter().map(|m| m.id).collect()
}

/// Quantization names in listing order.
pub fn list_quantizations() -> Vec<&'static str> {
    Quantization::ALL.iter().map(|q| q.as_str()).collect()
}
