//! SigLIP2 embedding model: text and image encoders plus similarity.

use std::path::Path;
use std::time::Duration;

use ndarray::{Array1, Array2, Array4};
use tracing::debug;

use siglip_core::{Artifact, Error, ModelDescriptor, Quantization, Result, SiglipConfig};
use siglip_hub::ModelFetcher;

use crate::backend::{
    select_output, GraphRunner, ModelBackend, ModelInput, NamedOutput, SubwordEncoder,
    ATTENTION_MASK, INPUT_IDS, PIXEL_VALUES,
};
use crate::cache::EmbeddingCache;
use crate::lazy::LazyResource;
use crate::preprocess::ImagePreprocessor;
use crate::similarity::{dot, l2_normalize, similarity_matrix};
use crate::tokenize::{tokenize, TokenBatch, MAX_SEQ_LEN};

/// A SigLIP2 checkpoint ready to embed text and images.
///
/// The tokenizer and both inference sessions are loaded on first use and
/// kept for the lifetime of the model.
pub struct EmbeddingModel {
    descriptor: ModelDescriptor,
    backend: Box<dyn ModelBackend>,
    preprocessor: ImagePreprocessor,
    max_length: usize,
    tokenizer: LazyResource<Box<dyn SubwordEncoder>>,
    text_graph: LazyResource<Box<dyn GraphRunner>>,
    vision_graph: LazyResource<Box<dyn GraphRunner>>,
    text_cache: Option<EmbeddingCache>,
}

impl EmbeddingModel {
    /// Open a model with configuration from the environment, downloading
    /// its artifacts first if any are missing.
    #[cfg(feature = "onnx")]
    pub fn open(identifier: &str, quantization: &str) -> Result<Self> {
        let config = SiglipConfig::from_env()?;
        Self::open_with_config(&config, identifier, quantization)
    }

    /// Open a model under `config`'s models root and hub endpoint.
    #[cfg(feature = "onnx")]
    pub fn open_with_config(
        config: &SiglipConfig,
        identifier: &str,
        quantization: &str,
    ) -> Result<Self> {
        Self::open_with_backend(
            config,
            identifier,
            quantization,
            crate::onnx_backend::OnnxBackend::new(config.intra_threads),
        )
    }

    /// Resolve a model under `config`, download whatever artifacts are
    /// missing from `config.hub_endpoint`, then wire `backend`.
    pub fn open_with_backend(
        config: &SiglipConfig,
        identifier: &str,
        quantization: &str,
        backend: impl ModelBackend + 'static,
    ) -> Result<Self> {
        let fetcher = ModelFetcher::from_config(config)?;
        let descriptor = fetcher.descriptor(identifier, quantization)?;
        if !descriptor.artifacts().is_complete() {
            fetcher.ensure_downloaded(identifier, quantization)?;
        }
        Ok(Self::with_backend(descriptor, backend))
    }

    /// Build a model over already-present artifacts and any backend.
    pub fn with_backend(descriptor: ModelDescriptor, backend: impl ModelBackend + 'static) -> Self {
        let preprocessor = ImagePreprocessor::new(descriptor.image_size());
        Self {
            descriptor,
            backend: Box::new(backend),
            preprocessor,
            max_length: MAX_SEQ_LEN,
            tokenizer: LazyResource::new(),
            text_graph: LazyResource::new(),
            vision_graph: LazyResource::new(),
            text_cache: None,
        }
    }

    /// Cache up to `capacity` text embeddings for `ttl`.
    pub fn with_text_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.text_cache = Some(EmbeddingCache::new(capacity, ttl));
        self
    }

    /// Override the padded token sequence length.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn model_name(&self) -> &str {
        self.descriptor.id()
    }

    pub fn quantization(&self) -> Quantization {
        self.descriptor.quantization()
    }

    pub fn model_path(&self) -> &Path {
        self.descriptor.dir()
    }

    pub fn image_size(&self) -> u32 {
        self.preprocessor.size()
    }

    /// Whether the text tower (tokenizer and session) has been loaded.
    pub fn is_text_loaded(&self) -> bool {
        self.tokenizer.is_loaded() && self.text_graph.is_loaded()
    }

    pub fn is_vision_loaded(&self) -> bool {
        self.vision_graph.is_loaded()
    }

    fn tokenizer(&self) -> Result<&dyn SubwordEncoder> {
        let tokenizer = self.tokenizer.get_or_load(|| {
            let path = self.descriptor.artifacts().path(Artifact::Tokenizer);
            debug!("Loading tokenizer from {}", path.display());
            self.backend.load_tokenizer(&path)
        })?;
        Ok(tokenizer.as_ref())
    }

    fn graph<'a>(
        &'a self,
        slot: &'a LazyResource<Box<dyn GraphRunner>>,
        artifact: Artifact,
    ) -> Result<&'a dyn GraphRunner> {
        let graph = slot.get_or_load(|| {
            let path = self.descriptor.artifacts().path(artifact);
            debug!("Loading {:?} graph from {}", artifact, path.display());
            self.backend.load_graph(&path)
        })?;
        Ok(graph.as_ref())
    }

    /// Token ids and mask exactly as the text graph will receive them.
    pub fn tokenize(&self, text: &str) -> Result<TokenBatch> {
        tokenize(self.tokenizer()?, text, self.max_length)
    }

    /// Unit-norm embedding of `text`.
    pub fn encode_text(&self, text: &str) -> Result<Array1<f32>> {
        if let Some(hit) = self.text_cache.as_ref().and_then(|c| c.get(text)) {
            return Ok(hit);
        }

        let batch = self.tokenize(text)?;
        let graph = self.graph(&self.text_graph, Artifact::Text)?;

        let mut inputs = vec![(INPUT_IDS, ModelInput::Int64(batch.input_ids))];
        if graph.accepts(ATTENTION_MASK) {
            inputs.push((ATTENTION_MASK, ModelInput::Int64(batch.attention_mask)));
        }

        let embedding = embedding_from(graph.run(inputs)?)?;

        if let Some(cache) = &self.text_cache {
            cache.put(text, embedding.clone());
        }
        Ok(embedding)
    }

    /// Unit-norm embedding of the image at `path`.
    pub fn encode_image(&self, path: impl AsRef<Path>) -> Result<Array1<f32>> {
        let pixels = self.preprocessor.preprocess(path)?;
        self.encode_pixels(pixels)
    }

    /// Unit-norm embedding of an encoded image held in memory.
    pub fn encode_image_bytes(&self, bytes: &[u8]) -> Result<Array1<f32>> {
        let pixels = self.preprocessor.preprocess_bytes(bytes)?;
        self.encode_pixels(pixels)
    }

    fn encode_pixels(&self, pixels: Array4<f32>) -> Result<Array1<f32>> {
        let graph = self.graph(&self.vision_graph, Artifact::Vision)?;
        embedding_from(graph.run(vec![(PIXEL_VALUES, ModelInput::Float32(pixels))])?)
    }

    /// Cosine similarity between a caption and an image.
    pub fn similarity(&self, text: &str, image_path: impl AsRef<Path>) -> Result<f32> {
        let text_embedding = self.encode_text(text)?;
        let image_embedding = self.encode_image(image_path)?;
        Ok(dot(&text_embedding, &image_embedding))
    }

    /// `[texts × images]` similarity matrix. Each input is encoded once.
    pub fn batch_similarity<T, P>(&self, texts: &[T], image_paths: &[P]) -> Result<Array2<f32>>
    where
        T: AsRef<str>,
        P: AsRef<Path>,
    {
        let text_embeddings = texts
            .iter()
            .map(|t| self.encode_text(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let image_embeddings = image_paths
            .iter()
            .map(|p| self.encode_image(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(similarity_matrix(&text_embeddings, &image_embeddings))
    }
}

/// Pick the embedding output, flatten it and normalize.
fn embedding_from(outputs: Vec<NamedOutput>) -> Result<Array1<f32>> {
    let output = select_output(outputs)
        .ok_or_else(|| Error::Inference("Model produced no outputs".to_string()))?;
    debug!("Using output {} with shape {:?}", output.name, output.shape);
    Ok(l2_normalize(Array1::from_vec(output.data)))
}
