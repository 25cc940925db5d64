//! Subcommand handlers. Each returns the JSON document to print.

use std::path::{Path, PathBuf};

use anyhow::Context;
use ndarray::Array2;
use serde_json::{json, Value};
use tracing::info;

use siglip_core::{SiglipConfig, DEFAULT_MODEL};
use siglip_hub::{artifact_digest, ModelFetcher};
use siglip_infer::EmbeddingModel;

/// Model and quantization picked on the command line or from the
/// environment.
pub struct Selection {
    pub model: String,
    pub quantization: String,
}

pub fn models() -> Value {
    let models: Vec<Value> = siglip_core::registry::MODELS
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "repo": m.repo,
                "image_size": m.image_size,
                "default": m.id == DEFAULT_MODEL,
            })
        })
        .collect();
    Value::Array(models)
}

pub fn quantizations() -> Value {
    json!(siglip_core::list_quantizations())
}

pub fn path(config: &SiglipConfig, selection: &Selection) -> anyhow::Result<Value> {
    let dir = siglip_core::artifact_dir(&config.models_dir, &selection.model, &selection.quantization)?;
    Ok(json!(dir))
}

pub fn status(config: &SiglipConfig, selection: &Selection, digest: bool) -> anyhow::Result<Value> {
    let fetcher = ModelFetcher::from_config(config)?;
    let files = fetcher.inspect(&selection.model, &selection.quantization)?;

    let mut entries = Vec::with_capacity(files.len());
    for file in &files {
        let mut entry = serde_json::to_value(file)?;
        if digest && file.present {
            let sha256 = artifact_digest(&file.path)
                .with_context(|| format!("hashing {}", file.path.display()))?;
            entry["sha256"] = json!(sha256);
        }
        entries.push(entry);
    }

    Ok(json!({
        "model": selection.model,
        "quantization": selection.quantization,
        "complete": files.iter().all(|f| f.present),
        "files": entries,
    }))
}

pub fn download(config: &SiglipConfig, selection: &Selection) -> anyhow::Result<Value> {
    let fetcher = ModelFetcher::from_config(config)?;
    let missing = fetcher.missing_artifacts(&selection.model, &selection.quantization)?;
    let descriptor = fetcher.ensure_downloaded(&selection.model, &selection.quantization)?;
    info!(
        "{}/{} ready at {}",
        selection.model,
        selection.quantization,
        descriptor.dir().display()
    );
    Ok(json!({
        "path": descriptor.dir(),
        "downloaded": missing,
    }))
}

fn open(config: &SiglipConfig, selection: &Selection) -> anyhow::Result<EmbeddingModel> {
    EmbeddingModel::open_with_config(config, &selection.model, &selection.quantization)
        .with_context(|| format!("opening model {}", selection.model))
}

pub fn encode_text(config: &SiglipConfig, selection: &Selection, text: &str) -> anyhow::Result<Value> {
    let embedding = open(config, selection)?.encode_text(text)?;
    Ok(json!(embedding.to_vec()))
}

pub fn encode_image(
    config: &SiglipConfig,
    selection: &Selection,
    image: &Path,
) -> anyhow::Result<Value> {
    let embedding = open(config, selection)?.encode_image(image)?;
    Ok(json!(embedding.to_vec()))
}

pub fn similarity(
    config: &SiglipConfig,
    selection: &Selection,
    text: &str,
    image: &Path,
) -> anyhow::Result<Value> {
    let score = open(config, selection)?.similarity(text, image)?;
    Ok(json!(score))
}

pub fn batch(
    config: &SiglipConfig,
    selection: &Selection,
    texts: &[String],
    images: &[PathBuf],
) -> anyhow::Result<Value> {
    let matrix = open(config, selection)?.batch_similarity(texts, images)?;
    Ok(json!({
        "texts": texts,
        "images": images,
        "scores": rows(&matrix),
    }))
}

fn rows(matrix: &Array2<f32>) -> Vec<Vec<f32>> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}
