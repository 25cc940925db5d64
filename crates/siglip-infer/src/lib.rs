//! SigLIP2 Infer: image preprocessing, tokenization, ONNX inference and
//! text/image similarity.
//!
//! `EmbeddingModel` is the entry point. With the `onnx` feature,
//! `EmbeddingModel::open` downloads missing artifacts and runs them through
//! ONNX Runtime. Without it, any `ModelBackend` can be plugged in with
//! `EmbeddingModel::with_backend`.

pub mod backend;
pub mod cache;
pub mod lazy;
pub mod model;
pub mod onnx_backend;
pub mod preprocess;
pub mod similarity;
pub mod tokenize;

pub use backend::{GraphRunner, ModelBackend, ModelInput, NamedOutput, SubwordEncoder};
pub use cache::EmbeddingCache;
pub use lazy::LazyResource;
pub use model::EmbeddingModel;
pub use preprocess::ImagePreprocessor;
pub use similarity::{dot, l2_normalize, similarity_matrix};
pub use tokenize::{TokenBatch, MAX_SEQ_LEN};

#[cfg(feature = "onnx")]
pub use onnx_backend::{OnnxBackend, OnnxGraph};
