//! End-to-end pipeline tests against an in-process fake backend.
//!
//! The fake text graph turns token ids into a small vector and the fake
//! vision graph turns per-channel pixel means into one, so embeddings are
//! deterministic and differ between inputs without any model files.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::{Rgb, RgbImage};
use ndarray::Array1;
use siglip_core::{Artifact, Error, ModelDescriptor, Result, SiglipConfig};
use siglip_infer::backend::{ATTENTION_MASK, INPUT_IDS, PIXEL_VALUES};
use siglip_infer::{
    dot, EmbeddingModel, GraphRunner, ModelBackend, ModelInput, NamedOutput, SubwordEncoder,
};
use tempfile::TempDir;

#[derive(Default)]
struct Counters {
    tokenizer_loads: AtomicUsize,
    graph_loads: AtomicUsize,
    text_runs: AtomicUsize,
    vision_runs: AtomicUsize,
    /// Input names seen by the last text run.
    last_text_inputs: Mutex<Vec<String>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Outputs {
    /// `last_hidden_state` then `pooler_output`.
    Standard,
    /// A single all-zero output.
    Zeros,
    Empty,
}

#[derive(Clone)]
struct FakeBackend {
    counters: Arc<Counters>,
    text_declares_mask: bool,
    outputs: Outputs,
    fail_graph_load: bool,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            text_declares_mask: true,
            outputs: Outputs::Standard,
            fail_graph_load: false,
        }
    }
}

/// One id per character code, plus an end token.
struct CharTokenizer;

impl SubwordEncoder for CharTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = text.chars().map(|c| c as u32).collect();
        ids.push(1);
        Ok(ids)
    }
}

struct FakeGraph {
    is_text: bool,
    inputs: Vec<String>,
    outputs: Outputs,
    counters: Arc<Counters>,
}

impl FakeGraph {
    fn embed(&self, inputs: &[(&'static str, ModelInput)]) -> Vec<f32> {
        if self.is_text {
            let ids = inputs
                .iter()
                .find(|(name, _)| *name == INPUT_IDS)
                .map(|(_, input)| input.clone());
            let Some(ModelInput::Int64(ids)) = ids else {
                panic!("text graph run without input_ids");
            };
            let mut v = vec![0.0f32; 4];
            for (i, &id) in ids.iter().enumerate() {
                v[i % 4] += id as f32 * (1.0 + i as f32 * 0.01);
            }
            v
        } else {
            let Some((_, ModelInput::Float32(pixels))) =
                inputs.iter().find(|(name, _)| *name == PIXEL_VALUES)
            else {
                panic!("vision graph run without pixel_values");
            };
            let (_, channels, h, w) = pixels.dim();
            let area = (h * w) as f32;
            let mut v: Vec<f32> = (0..channels)
                .map(|c| {
                    let sum: f32 = pixels
                        .slice(ndarray::s![0, c, .., ..])
                        .iter()
                        .map(|x| x + 1.0)
                        .sum();
                    sum / area
                })
                .collect();
            v.push(0.25);
            v
        }
    }
}

impl GraphRunner for FakeGraph {
    fn input_names(&self) -> &[String] {
        &self.inputs
    }

    fn run(&self, inputs: Vec<(&'static str, ModelInput)>) -> Result<Vec<NamedOutput>> {
        if self.is_text {
            self.counters.text_runs.fetch_add(1, Ordering::SeqCst);
            *self.counters.last_text_inputs.lock().unwrap() =
                inputs.iter().map(|(name, _)| name.to_string()).collect();
        } else {
            self.counters.vision_runs.fetch_add(1, Ordering::SeqCst);
        }

        let data = self.embed(&inputs);
        let dim = data.len();
        Ok(match self.outputs {
            Outputs::Standard => vec![
                NamedOutput {
                    name: "last_hidden_state".into(),
                    shape: vec![1, dim],
                    data: vec![9.0; dim],
                },
                NamedOutput {
                    name: "pooler_output".into(),
                    shape: vec![1, dim],
                    data,
                },
            ],
            Outputs::Zeros => vec![NamedOutput {
                name: "embeds".into(),
                shape: vec![1, dim],
                data: vec![0.0; dim],
            }],
            Outputs::Empty => Vec::new(),
        })
    }
}

impl ModelBackend for FakeBackend {
    fn load_tokenizer(&self, _path: &Path) -> Result<Box<dyn SubwordEncoder>> {
        self.counters.tokenizer_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CharTokenizer))
    }

    fn load_graph(&self, path: &Path) -> Result<Box<dyn GraphRunner>> {
        self.counters.graph_loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_graph_load {
            return Err(Error::Inference(format!("corrupt graph: {}", path.display())));
        }
        let is_text = path.ends_with("text_model.onnx");
        let inputs = if is_text {
            let mut names = vec![INPUT_IDS.to_string()];
            if self.text_declares_mask {
                names.push(ATTENTION_MASK.to_string());
            }
            names
        } else {
            vec![PIXEL_VALUES.to_string()]
        };
        Ok(Box::new(FakeGraph {
            is_text,
            inputs,
            outputs: self.outputs,
            counters: Arc::clone(&self.counters),
        }))
    }
}

fn model_with(backend: FakeBackend) -> (TempDir, EmbeddingModel) {
    let root = TempDir::new().unwrap();
    let descriptor = ModelDescriptor::resolve(root.path(), "base-patch16-224", "fp32").unwrap();
    (root, EmbeddingModel::with_backend(descriptor, backend))
}

fn write_image(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(40, 30, Rgb(color)).save(&path).unwrap();
    path
}

fn norm(v: &Array1<f32>) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[test]
fn test_nothing_loads_until_first_use() {
    let backend = FakeBackend::new();
    let counters = Arc::clone(&backend.counters);
    let (root, model) = model_with(backend);

    assert_eq!(model.model_name(), "base-patch16-224");
    assert_eq!(model.image_size(), 224);
    assert!(model.model_path().starts_with(root.path()));
    assert!(!model.is_text_loaded());
    assert!(!model.is_vision_loaded());
    assert_eq!(counters.graph_loads.load(Ordering::SeqCst), 0);

    model.encode_text("a photo of a cat").unwrap();
    assert!(model.is_text_loaded());
    assert!(!model.is_vision_loaded());

    let image = write_image(root.path(), "red.png", [255, 0, 0]);
    model.encode_image(&image).unwrap();
    model.encode_image(&image).unwrap();
    model.encode_text("a photo of a dog").unwrap();

    assert!(model.is_vision_loaded());
    assert_eq!(counters.tokenizer_loads.load(Ordering::SeqCst), 1);
    assert_eq!(counters.graph_loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_embeddings_are_unit_norm_and_deterministic() {
    let (root, model) = model_with(FakeBackend::new());

    let a = model.encode_text("a photo of a cat").unwrap();
    let b = model.encode_text("a photo of a cat").unwrap();
    assert_eq!(a, b);
    assert!((norm(&a) - 1.0).abs() < 1e-3);

    let image = write_image(root.path(), "blue.png", [0, 0, 255]);
    let i = model.encode_image(&image).unwrap();
    assert_eq!(i, model.encode_image(&image).unwrap());
    assert!((norm(&i) - 1.0).abs() < 1e-3);
}

#[test]
fn test_text_is_case_insensitive() {
    let (_root, model) = model_with(FakeBackend::new());
    let upper = model.encode_text("A PHOTO OF A CAT").unwrap();
    let lower = model.encode_text("a photo of a cat").unwrap();
    assert_eq!(upper, lower);
}

#[test]
fn test_tokenize_shape() {
    let (_root, model) = model_with(FakeBackend::new());
    let batch = model.tokenize("cat").unwrap();
    assert_eq!(batch.input_ids.shape(), &[1, 64]);
    assert_eq!(batch.real_tokens(), 4);

    let (_root, short) = model_with(FakeBackend::new());
    let short = short.with_max_length(2);
    assert_eq!(short.tokenize("cat").unwrap().seq_len(), 2);
}

#[test]
fn test_attention_mask_fed_only_when_declared() {
    let backend = FakeBackend::new();
    let counters = Arc::clone(&backend.counters);
    let (_root, model) = model_with(backend);
    model.encode_text("with mask").unwrap();
    assert_eq!(
        *counters.last_text_inputs.lock().unwrap(),
        vec![INPUT_IDS.to_string(), ATTENTION_MASK.to_string()]
    );

    let mut backend = FakeBackend::new();
    backend.text_declares_mask = false;
    let counters = Arc::clone(&backend.counters);
    let (_root, model) = model_with(backend);
    model.encode_text("without mask").unwrap();
    assert_eq!(
        *counters.last_text_inputs.lock().unwrap(),
        vec![INPUT_IDS.to_string()]
    );
}

#[test]
fn test_pooled_output_preferred() {
    let (_root, model) = model_with(FakeBackend::new());
    let v = model.encode_text("cat").unwrap();
    // `last_hidden_state` is constant, so picking it would give a flat vector
    assert!(v.iter().any(|&x| (x - v[0]).abs() > 1e-6));
}

#[test]
fn test_similarity_matches_dot_of_embeddings() {
    let (root, model) = model_with(FakeBackend::new());
    let image = write_image(root.path(), "green.png", [0, 200, 0]);

    let s = model.similarity("a green square", &image).unwrap();
    let t = model.encode_text("a green square").unwrap();
    let i = model.encode_image(&image).unwrap();
    assert_eq!(s, dot(&t, &i));
    assert!((-1.0..=1.0).contains(&s));
}

#[test]
fn test_batch_matches_pairwise_and_encodes_once() {
    let backend = FakeBackend::new();
    let counters = Arc::clone(&backend.counters);
    let (root, model) = model_with(backend);

    let texts = ["a red square", "a blue square", "a cat"];
    let images = vec![
        write_image(root.path(), "red.png", [255, 0, 0]),
        write_image(root.path(), "blue.png", [0, 0, 255]),
    ];

    let matrix = model.batch_similarity(&texts, &images).unwrap();
    assert_eq!(matrix.shape(), &[3, 2]);
    assert_eq!(counters.text_runs.load(Ordering::SeqCst), 3);
    assert_eq!(counters.vision_runs.load(Ordering::SeqCst), 2);

    for (i, text) in texts.iter().enumerate() {
        for (j, image) in images.iter().enumerate() {
            assert_eq!(matrix[[i, j]], model.similarity(text, image).unwrap());
        }
    }
}

#[test]
fn test_batch_with_no_texts() {
    let (root, model) = model_with(FakeBackend::new());
    let images = vec![write_image(root.path(), "red.png", [255, 0, 0])];
    let matrix = model.batch_similarity::<&str, _>(&[], &images).unwrap();
    assert_eq!(matrix.shape(), &[0, 1]);
}

#[test]
fn test_image_bytes_match_file() {
    let (root, model) = model_with(FakeBackend::new());
    let image = write_image(root.path(), "red.png", [255, 0, 0]);
    let bytes = std::fs::read(&image).unwrap();
    assert_eq!(
        model.encode_image_bytes(&bytes).unwrap(),
        model.encode_image(&image).unwrap()
    );
}

#[test]
fn test_zero_output_returned_unchanged() {
    let mut backend = FakeBackend::new();
    backend.outputs = Outputs::Zeros;
    let (_root, model) = model_with(backend);
    let v = model.encode_text("nothing").unwrap();
    assert!(v.iter().all(|&x| x == 0.0));
    assert!(v.iter().all(|x| x.is_finite()));
}

#[test]
fn test_no_outputs_is_inference_error() {
    let mut backend = FakeBackend::new();
    backend.outputs = Outputs::Empty;
    let (_root, model) = model_with(backend);
    assert!(matches!(model.encode_text("cat"), Err(Error::Inference(_))));
}

#[test]
fn test_load_failure_propagates_and_is_not_cached() {
    let mut backend = FakeBackend::new();
    backend.fail_graph_load = true;
    let counters = Arc::clone(&backend.counters);
    let (_root, model) = model_with(backend);

    assert!(matches!(model.encode_text("cat"), Err(Error::Inference(_))));
    assert!(matches!(model.encode_text("cat"), Err(Error::Inference(_))));
    assert!(!model.is_text_loaded());
    assert_eq!(counters.graph_loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_missing_image_is_image_error() {
    let (root, model) = model_with(FakeBackend::new());
    let err = model.encode_image(root.path().join("missing.png")).unwrap_err();
    assert!(matches!(err, Error::Image(_)));
}

#[test]
fn test_text_cache_skips_rerun() {
    let backend = FakeBackend::new();
    let counters = Arc::clone(&backend.counters);
    let (_root, model) = model_with(backend);
    let model = model.with_text_cache(16, Duration::from_secs(60));

    let first = model.encode_text("a photo of a cat").unwrap();
    let second = model.encode_text("a photo of a cat").unwrap();
    assert_eq!(first, second);
    assert_eq!(counters.text_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shared_across_threads() {
    let backend = FakeBackend::new();
    let counters = Arc::clone(&backend.counters);
    let (_root, model) = model_with(backend);
    let model = Arc::new(model);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let model = Arc::clone(&model);
            std::thread::spawn(move || model.encode_text("concurrent").unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(counters.tokenizer_loads.load(Ordering::SeqCst), 1);
    assert_eq!(counters.graph_loads.load(Ordering::SeqCst), 1);
}

/// Serves a small body for every path and counts requests.
fn spawn_hub() -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let paths = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&paths);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            serve_artifact(stream, &log);
        }
    });

    (endpoint, paths)
}

fn serve_artifact(mut stream: TcpStream, log: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
            break;
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
    let body = format!("artifact {}", path);
    log.lock().unwrap().push(path);

    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).unwrap();
    stream.write_all(body.as_bytes()).unwrap();
}

#[test]
fn test_open_downloads_missing_artifacts_once() {
    let (endpoint, paths) = spawn_hub();
    let root = TempDir::new().unwrap();
    let config = SiglipConfig {
        models_dir: root.path().to_path_buf(),
        hub_endpoint: endpoint,
        ..SiglipConfig::default()
    };

    let model =
        EmbeddingModel::open_with_backend(&config, "base-patch16-256", "q4", FakeBackend::new())
            .unwrap();
    assert_eq!(model.image_size(), 256);
    assert_eq!(model.model_path(), root.path().join("base-patch16-256").join("q4"));
    for artifact in Artifact::ALL {
        assert!(model.model_path().join(artifact.local_name()).exists());
    }

    let mut fetched = paths.lock().unwrap().clone();
    fetched.sort();
    let repo = "/onnx-community/siglip2-base-patch16-256-ONNX/resolve/main";
    assert_eq!(
        fetched,
        vec![
            format!("{}/onnx/text_model_q4.onnx", repo),
            format!("{}/onnx/vision_model_q4.onnx", repo),
            format!("{}/tokenizer.json", repo),
        ]
    );

    let reopened =
        EmbeddingModel::open_with_backend(&config, "base-patch16-256", "q4", FakeBackend::new())
            .unwrap();
    assert_eq!(paths.lock().unwrap().len(), 3);
    assert!(reopened.encode_text("a photo of a cat").is_ok());
}

#[test]
fn test_open_rejects_unknown_selection_without_requests() {
    let (endpoint, paths) = spawn_hub();
    let root = TempDir::new().unwrap();
    let config = SiglipConfig {
        models_dir: root.path().to_path_buf(),
        hub_endpoint: endpoint,
        ..SiglipConfig::default()
    };

    let err = EmbeddingModel::open_with_backend(&config, "tiny-patch99", "fp32", FakeBackend::new())
        .err()
        .unwrap();
    assert!(matches!(err, Error::UnknownModel(_)));
    assert!(paths.lock().unwrap().is_empty());
}
