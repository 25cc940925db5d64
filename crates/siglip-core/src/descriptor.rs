//! Model descriptors and the on-disk artifact layout.
//!
//! Layout: `{models_root}/{model}/{quantization}/{vision_model.onnx,
//! text_model.onnx, tokenizer.json}`. Local file names never change with
//! the quantization; only the remote names carry the variant suffix.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::registry::{self, Quantization};

/// One of the three files every (model, quantization) pair needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    Vision,
    Text,
    Tokenizer,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [Self::Vision, Self::Text, Self::Tokenizer];

    /// File name inside the local model directory.
    pub fn local_name(&self) -> &'static str {
        match self {
            Self::Vision => "vision_model.onnx",
            Self::Text => "text_model.onnx",
            Self::Tokenizer => "tokenizer.json",
        }
    }

    /// Path of the file inside the hub repository.
    pub fn remote_path(&self, quantization: Quantization) -> String {
        match self {
            Self::Vision => format!("onnx/vision_model{}.onnx", quantization.suffix()),
            Self::Text => format!("onnx/text_model{}.onnx", quantization.suffix()),
            Self::Tokenizer => "tokenizer.json".to_string(),
        }
    }
}

/// Local directory for a (model, quantization) pair under `root`.
///
/// Pure: validates both names against the registry and joins paths, never
/// touches the filesystem.
pub fn artifact_dir(root: &Path, identifier: &str, quantization: &str) -> Result<PathBuf> {
    registry::resolve(identifier)?;
    let quantization: Quantization = quantization.parse()?;
    Ok(root.join(identifier).join(quantization.as_str()))
}

/// The artifact files of one model directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSet {
    dir: PathBuf,
}

impl ArtifactSet {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.local_name())
    }

    /// Artifacts not yet on disk, in download order.
    pub fn missing(&self) -> Vec<Artifact> {
        Artifact::ALL
            .into_iter()
            .filter(|a| !self.path(*a).exists())
            .collect()
    }

    /// True iff all three files exist. Content is never inspected.
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// A selected model: registry entry, quantization and local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    id: String,
    repo: &'static str,
    quantization: Quantization,
    dir: PathBuf,
    image_size: u32,
}

impl ModelDescriptor {
    /// Resolve `identifier` and `quantization` under `root`.
    pub fn resolve(root: &Path, identifier: &str, quantization: &str) -> Result<Self> {
        let repo = registry::resolve(identifier)?;
        let dir = artifact_dir(root, identifier, quantization)?;
        Ok(Self {
            id: identifier.to_string(),
            repo,
            quantization: quantization.parse()?,
            dir,
            image_size: registry::default_resolution(identifier),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn repo(&self) -> &'static str {
        self.repo
    }

    pub fn quantization(&self) -> Quantization {
        self.quantization
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn artifacts(&self) -> ArtifactSet {
        ArtifactSet::new(&self.dir)
    }

    /// Download URL for one artifact, relative to a hub endpoint.
    pub fn remote_url(&self, endpoint: &str, artifact: Artifact) -> String {
        format!(
            "{}/{}/resolve/main/{}",
            endpoint.trim_end_matches('/'),
            self.repo,
            artifact.remote_path(self.quantization)
        )
    }
}
