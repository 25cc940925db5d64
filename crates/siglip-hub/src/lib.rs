//! SigLIP2 Hub: resolves local model directories and downloads missing
//! ONNX graphs and tokenizers from the model hub.
//!
//! Downloads are blocking, follow a bounded number of redirects, and treat
//! a file's presence on disk as proof that it is complete.

pub mod fetcher;

pub use fetcher::{artifact_digest, ArtifactStatus, ModelFetcher, MAX_REDIRECTS, READ_TIMEOUT};
