//! SigLIP2 Core: model registry, artifact layout, configuration, errors.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod registry;

pub use config::{models_dir, reset_models_dir, set_models_dir, SiglipConfig};
pub use descriptor::{artifact_dir, Artifact, ArtifactSet, ModelDescriptor};
pub use error::{Error, Result};
pub use registry::{
    default_resolution, list_models, list_quantizations, model_info, resolve, ModelInfo,
    Quantization, DEFAULT_MODEL,
};
