//! Text to fixed-length token batches.
//!
//! SigLIP2 was trained on lowercased captions padded to 64 tokens, so text
//! is lowercased before encoding and every batch is exactly `max_length`
//! wide.

use ndarray::Array2;

use siglip_core::Result;

use crate::backend::SubwordEncoder;

/// Sequence length the text tower was trained with.
pub const MAX_SEQ_LEN: usize = 64;

/// Id used for right padding.
pub const PAD_TOKEN_ID: i64 = 0;

/// Token ids and attention mask, both `[1, max_length]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
}

impl TokenBatch {
    /// Padded sequence length.
    pub fn seq_len(&self) -> usize {
        self.input_ids.ncols()
    }

    /// Number of real (unpadded) tokens.
    pub fn real_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// Lowercase, encode, then truncate or right-pad to `max_length`.
pub fn tokenize(encoder: &dyn SubwordEncoder, text: &str, max_length: usize) -> Result<TokenBatch> {
    let ids = encoder.encode(&text.to_lowercase())?;
    Ok(pad_or_truncate(&ids, max_length))
}

/// Keep the first `max_length` ids, pad the rest with `PAD_TOKEN_ID`.
pub fn pad_or_truncate(ids: &[u32], max_length: usize) -> TokenBatch {
    let real = ids.len().min(max_length);

    let input_ids = Array2::from_shape_fn((1, max_length), |(_, i)| {
        if i < real {
            ids[i] as i64
        } else {
            PAD_TOKEN_ID
        }
    });
    let attention_mask = Array2::from_shape_fn((1, max_length), |(_, i)| (i < real) as i64);

    TokenBatch {
        input_ids,
        attention_mask,
    }
}
