//! Error types for SigLIP2.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown quantization: {0}")]
    UnknownQuantization(String),

    #[error("Too many HTTP redirects while downloading {url}")]
    TooManyRedirects { url: String },

    #[error("Failed to download {url}: {status} {message}")]
    DownloadFailed {
        url: String,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
