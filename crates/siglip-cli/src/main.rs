//! siglip2: manage SigLIP2 ONNX checkpoints and compute embeddings.
//!
//! Results go to stdout as JSON, logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "siglip2")]
#[command(version)]
#[command(about = "SigLIP2 text and image embeddings via ONNX Runtime")]
#[command(propagate_version = true)]
struct Cli {
    /// Root directory for downloaded models
    #[arg(long, global = true, env = "SIGLIP2_MODELS_DIR")]
    models_dir: Option<PathBuf>,

    /// Model identifier, e.g. base-patch16-224
    #[arg(long, short, global = true, env = "SIGLIP2_MODEL")]
    model: Option<String>,

    /// Weight variant: fp32, fp16, int8, uint8, q4, q4f16, bnb4
    #[arg(long, short, global = true, env = "SIGLIP2_QUANTIZATION")]
    quantization: Option<String>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known model identifiers
    Models,
    /// List quantization variants
    Quantizations,
    /// Print the local directory of the selected model
    Path,
    /// Show which artifact files are present locally
    Status {
        /// Also compute the SHA-256 of each present file
        #[arg(long)]
        digest: bool,
    },
    /// Download any missing artifacts of the selected model
    Download,
    /// Print the embedding of a caption
    EncodeText { text: String },
    /// Print the embedding of an image file
    EncodeImage { image: PathBuf },
    /// Print the cosine similarity of a caption and an image
    Similarity { text: String, image: PathBuf },
    /// Print the [texts × images] similarity matrix
    Batch {
        /// Caption (repeatable)
        #[arg(long = "text", required = true)]
        texts: Vec<String>,
        /// Image file (repeatable)
        #[arg(long = "image", required = true)]
        images: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(dir) = &cli.models_dir {
        siglip_core::set_models_dir(dir);
    }

    // Flags already fall back to SIGLIP2_MODEL / SIGLIP2_QUANTIZATION.
    // Both are validated only by the commands that use them.
    let selection = commands::Selection {
        model: cli
            .model
            .unwrap_or_else(|| siglip_core::DEFAULT_MODEL.to_string()),
        quantization: cli
            .quantization
            .unwrap_or_else(|| siglip_core::Quantization::default().to_string()),
    };

    let mut config = siglip_core::SiglipConfig::runtime_from_env()?;
    config.models_dir = siglip_core::models_dir();

    let output = match cli.command {
        Commands::Models => commands::models(),
        Commands::Quantizations => commands::quantizations(),
        Commands::Path => commands::path(&config, &selection)?,
        Commands::Status { digest } => commands::status(&config, &selection, digest)?,
        Commands::Download => commands::download(&config, &selection)?,
        Commands::EncodeText { text } => commands::encode_text(&config, &selection, &text)?,
        Commands::EncodeImage { image } => commands::encode_image(&config, &selection, &image)?,
        Commands::Similarity { text, image } => {
            commands::similarity(&config, &selection, &text, &image)?
        }
        Commands::Batch { texts, images } => {
            commands::batch(&config, &selection, &texts, &images)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
