//! Inference backend seam.
//!
//! `EmbeddingModel` never talks to ONNX Runtime or the tokenizer library
//! directly. It loads its tokenizer and graphs through a `ModelBackend`,
//! so the pipeline runs the same against `OnnxBackend` (feature `onnx`)
//! and against in-process fakes.

use std::path::Path;

use ndarray::{Array2, Array4};

use siglip_core::Result;

/// Text graph input carrying token ids.
pub const INPUT_IDS: &str = "input_ids";

/// Optional text graph input marking real tokens.
pub const ATTENTION_MASK: &str = "attention_mask";

/// Vision graph input carrying the preprocessed image.
pub const PIXEL_VALUES: &str = "pixel_values";

/// Output names tried in order before falling back to the first output.
pub const OUTPUT_CANDIDATES: [&str; 2] = ["pooler_output", "last_hidden_state"];

/// Subword tokenizer loaded from a `tokenizer.json`.
pub trait SubwordEncoder: Send + Sync {
    /// Encode text to token ids, special tokens included.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
}

/// A tensor fed to a graph.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelInput {
    Int64(Array2<i64>),
    Float32(Array4<f32>),
}

impl ModelInput {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Int64(a) => a.shape(),
            Self::Float32(a) => a.shape(),
        }
    }
}

/// One float output of a graph run, flattened row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedOutput {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// A loaded inference graph.
pub trait GraphRunner: Send + Sync {
    /// Input names the graph declares.
    fn input_names(&self) -> &[String];

    /// Run the graph once. Outputs come back in graph order.
    fn run(&self, inputs: Vec<(&'static str, ModelInput)>) -> Result<Vec<NamedOutput>>;

    fn accepts(&self, input: &str) -> bool {
        self.input_names().iter().any(|name| name == input)
    }
}

/// Loads tokenizers and graphs from local artifact files.
pub trait ModelBackend: Send + Sync {
    fn load_tokenizer(&self, path: &Path) -> Result<Box<dyn SubwordEncoder>>;

    fn load_graph(&self, path: &Path) -> Result<Box<dyn GraphRunner>>;
}

/// Pick the embedding output: the first `OUTPUT_CANDIDATES` match, else
/// the first output. `None` only when there are no outputs at all.
pub fn select_output(outputs: Vec<NamedOutput>) -> Option<NamedOutput> {
    let index = OUTPUT_CANDIDATES
        .iter()
        .find_map(|candidate| outputs.iter().position(|o| o.name == *candidate))
        .unwrap_or(0);
    outputs.into_iter().nth(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(name: &str, value: f32) -> NamedOutput {
        NamedOutput {
            name: name.to_string(),
            shape: vec![1, 1],
            data: vec![value],
        }
    }

    #[test]
    fn test_prefers_pooled_output() {
        let outputs = vec![
            output("last_hidden_state", 1.0),
            output("pooler_output", 2.0),
            output("logits", 3.0),
        ];
        assert_eq!(select_output(outputs).unwrap().name, "pooler_output");
    }

    #[test]
    fn test_falls_back_to_hidden_state() {
        let outputs = vec![output("logits", 3.0), output("last_hidden_state", 1.0)];
        assert_eq!(select_output(outputs).unwrap().name, "last_hidden_state");
    }

    #[test]
    fn test_falls_back_to_first_output() {
        let outputs = vec![output("text_embeds", 5.0), output("logits", 3.0)];
        assert_eq!(select_output(outputs).unwrap().data, vec![5.0]);
    }

    #[test]
    fn test_no_outputs() {
        assert!(select_output(Vec::new()).is_none());
    }
}
