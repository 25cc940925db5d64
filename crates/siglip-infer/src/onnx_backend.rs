//! ONNX Runtime backend for SigLIP2 graphs and HuggingFace tokenizers.
//!
//! Requires the `onnx` feature. With `load-dynamic`, `ORT_DYLIB_PATH` must
//! point to `libonnxruntime` at runtime.

#[cfg(feature = "onnx")]
mod inner {
    use std::path::Path;

    use ort::session::Session;
    use ort::value::{DynValue, Tensor};
    use parking_lot::Mutex;
    use tokenizers::Tokenizer;
    use tracing::{debug, info};

    use siglip_core::{Error, Result};

    use crate::backend::{GraphRunner, ModelBackend, ModelInput, NamedOutput, SubwordEncoder};

    /// Loads graphs into ONNX Runtime sessions.
    pub struct OnnxBackend {
        intra_threads: usize,
    }

    impl OnnxBackend {
        pub fn new(intra_threads: usize) -> Self {
            Self { intra_threads }
        }
    }

    impl ModelBackend for OnnxBackend {
        fn load_tokenizer(&self, path: &Path) -> Result<Box<dyn SubwordEncoder>> {
            let tokenizer = Tokenizer::from_file(path)
                .map_err(|e| Error::Tokenizer(format!("Failed to load tokenizer: {}", e)))?;
            info!("Tokenizer loaded: {}", path.display());
            Ok(Box::new(HubTokenizer(tokenizer)))
        }

        fn load_graph(&self, path: &Path) -> Result<Box<dyn GraphRunner>> {
            Ok(Box::new(OnnxGraph::load(path, self.intra_threads)?))
        }
    }

    struct HubTokenizer(Tokenizer);

    impl SubwordEncoder for HubTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            let encoding = self
                .0
                .encode(text, true)
                .map_err(|e| Error::Tokenizer(format!("Tokenization failed: {}", e)))?;
            Ok(encoding.get_ids().to_vec())
        }
    }

    /// One ONNX session. `ort` needs `&mut Session` to run, hence the lock.
    pub struct OnnxGraph {
        session: Mutex<Session>,
        inputs: Vec<String>,
    }

    impl OnnxGraph {
        pub fn load(path: &Path, intra_threads: usize) -> Result<Self> {
            if !path.exists() {
                return Err(Error::Inference(format!("Model not found: {}", path.display())));
            }

            ort::init().commit();

            let session = Session::builder()
                .map_err(|e| Error::Inference(format!("Failed to create session builder: {}", e)))?
                .with_intra_threads(intra_threads)
                .map_err(|e| Error::Inference(format!("Failed to set threads: {}", e)))?
                .commit_from_file(path)
                .map_err(|e| Error::Inference(format!("Failed to load ONNX model: {}", e)))?;

            let inputs: Vec<String> = session
                .inputs()
                .iter()
                .map(|input| input.name().to_string())
                .collect();

            info!("ONNX graph loaded: {} (inputs: {:?})", path.display(), inputs);

            Ok(Self {
                session: Mutex::new(session),
                inputs,
            })
        }
    }

    /// Build a tensor from a (shape, row-major data) tuple.
    fn to_value(input: ModelInput) -> Result<DynValue> {
        let value = match input {
            ModelInput::Int64(array) => {
                let (rows, cols) = array.dim();
                let data: Vec<i64> = array.iter().copied().collect();
                Tensor::from_array(([rows, cols], data)).map(|t| t.into_dyn())
            }
            ModelInput::Float32(array) => {
                let (n, c, h, w) = array.dim();
                let data: Vec<f32> = array.iter().copied().collect();
                Tensor::from_array(([n, c, h, w], data)).map(|t| t.into_dyn())
            }
        };
        value.map_err(|e| Error::Inference(format!("Failed to create input tensor: {}", e)))
    }

    impl GraphRunner for OnnxGraph {
        fn input_names(&self) -> &[String] {
            &self.inputs
        }

        fn run(&self, inputs: Vec<(&'static str, ModelInput)>) -> Result<Vec<NamedOutput>> {
            let mut values: Vec<(&'static str, DynValue)> = Vec::with_capacity(inputs.len());
            for (name, input) in inputs {
                debug!("Input {} shape {:?}", name, input.shape());
                values.push((name, to_value(input)?));
            }

            let mut session = self.session.lock();
            let outputs = session
                .run(values)
                .map_err(|e| Error::Inference(format!("ONNX inference failed: {}", e)))?;

            let mut collected = Vec::new();
            for (name, value) in outputs.iter() {
                let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
                    Error::Inference(format!("Failed to extract output {}: {}", name, e))
                })?;
                collected.push(NamedOutput {
                    name: name.to_string(),
                    shape: shape.iter().map(|&d| d as usize).collect(),
                    data: data.to_vec(),
                });
            }

            Ok(collected)
        }
    }
}

#[cfg(feature = "onnx")]
pub use inner::{OnnxBackend, OnnxGraph};
