//! Model artifact download and local storage.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper::ext::ReasonPhrase;
use reqwest::blocking::{Client, Response};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::Url;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use siglip_core::config::DEFAULT_HUB_ENDPOINT;
use siglip_core::{Artifact, Error, ModelDescriptor, Result, SiglipConfig};

/// Maximum HTTP requests spent on one file, redirects included.
pub const MAX_REDIRECTS: usize = 10;

/// Read timeout for hub requests.
pub const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Presence report for one artifact file.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    pub artifact: Artifact,
    pub path: PathBuf,
    pub present: bool,
    pub size_bytes: Option<u64>,
}

/// Resolves local model directories and downloads missing artifacts.
pub struct ModelFetcher {
    root: PathBuf,
    endpoint: String,
    client: Client,
}

impl ModelFetcher {
    /// Create a fetcher storing models under `root`, downloading from the
    /// default hub.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            root: root.as_ref().to_path_buf(),
            endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            client,
        })
    }

    /// Create a fetcher from the models root and endpoint of `config`.
    pub fn from_config(config: &SiglipConfig) -> Result<Self> {
        Ok(Self::new(&config.models_dir)?.with_endpoint(&config.hub_endpoint))
    }

    /// Download from a different hub (mirror, proxy, test server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Resolve a model selection under this fetcher's root.
    pub fn descriptor(&self, identifier: &str, quantization: &str) -> Result<ModelDescriptor> {
        ModelDescriptor::resolve(&self.root, identifier, quantization)
    }

    /// Local directory for a model. Pure, performs no I/O.
    pub fn local_path(&self, identifier: &str, quantization: &str) -> Result<PathBuf> {
        siglip_core::artifact_dir(&self.root, identifier, quantization)
    }

    /// True iff all three artifact files exist locally.
    pub fn artifacts_present(&self, identifier: &str, quantization: &str) -> Result<bool> {
        Ok(self.descriptor(identifier, quantization)?.artifacts().is_complete())
    }

    /// Artifacts that `ensure_downloaded` would fetch.
    pub fn missing_artifacts(&self, identifier: &str, quantization: &str) -> Result<Vec<Artifact>> {
        Ok(self.descriptor(identifier, quantization)?.artifacts().missing())
    }

    /// Per-file presence and size.
    pub fn inspect(&self, identifier: &str, quantization: &str) -> Result<Vec<ArtifactStatus>> {
        let artifacts = self.descriptor(identifier, quantization)?.artifacts();
        Ok(Artifact::ALL
            .into_iter()
            .map(|artifact| {
                let path = artifacts.path(artifact);
                let size_bytes = fs::metadata(&path).ok().map(|m| m.len());
                ArtifactStatus {
                    artifact,
                    present: size_bytes.is_some(),
                    size_bytes,
                    path,
                }
            })
            .collect())
    }

    /// Make sure every artifact of a model exists locally, downloading the
    /// missing ones. Files already on disk are never fetched again.
    pub fn ensure_downloaded(&self, identifier: &str, quantization: &str) -> Result<ModelDescriptor> {
        let descriptor = self.descriptor(identifier, quantization)?;
        let artifacts = descriptor.artifacts();
        let missing = artifacts.missing();

        if missing.is_empty() {
            debug!(
                "Artifacts for {}/{} already present at {}",
                identifier,
                quantization,
                descriptor.dir().display()
            );
            return Ok(descriptor);
        }

        fs::create_dir_all(descriptor.dir())?;

        for artifact in missing {
            let url = descriptor.remote_url(&self.endpoint, artifact);
            let dest = artifacts.path(artifact);
            info!("Downloading {} from {}...", artifact.local_name(), url);
            let bytes = self.download_file(&url, &dest)?;
            info!("Downloaded {} bytes to {}", bytes, dest.display());
        }

        Ok(descriptor)
    }

    /// GET `url` into `dest`, following at most `MAX_REDIRECTS` hops.
    ///
    /// The body is streamed into `<dest>.part` and renamed on completion,
    /// so `dest` only ever appears whole.
    pub fn download_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut current =
            Url::parse(url).map_err(|e| Error::Http(format!("Invalid URL {}: {}", url, e)))?;

        for hop in 0..MAX_REDIRECTS {
            debug!("GET {} (hop {})", current, hop);

            let mut response = self
                .client
                .get(current.clone())
                .send()
                .map_err(|e| Error::Http(format!("Request to {} failed: {}", current, e)))?;
            let status = response.status();

            if status.is_success() {
                return stream_to_file(&mut response, dest);
            }

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| Error::DownloadFailed {
                        url: current.to_string(),
                        status: status.as_u16(),
                        message: "redirect without Location header".to_string(),
                    })?;
                current = current.join(location).map_err(|e| {
                    Error::Http(format!("Invalid redirect target {}: {}", location, e))
                })?;
                continue;
            }

            return Err(Error::DownloadFailed {
                url: current.to_string(),
                status: status.as_u16(),
                message: reason_phrase(&response),
            });
        }

        Err(Error::TooManyRedirects {
            url: url.to_string(),
        })
    }
}

/// Reason phrase as sent by the server, else the canonical one.
///
/// hyper only records the phrase when it differs from the canonical text.
fn reason_phrase(response: &Response) -> String {
    match response.extensions().get::<ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn stream_to_file(response: &mut Response, dest: &Path) -> Result<u64> {
    let part = part_path(dest);
    let result = write_part(response, &part);

    match result {
        Ok(bytes) => {
            fs::rename(&part, dest)?;
            Ok(bytes)
        }
        Err(e) => {
            let _ = fs::remove_file(&part);
            Err(e)
        }
    }
}

fn write_part(body: &mut impl Read, part: &Path) -> Result<u64> {
    let mut writer = BufWriter::new(File::create(part)?);
    let bytes = io::copy(body, &mut writer)?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?
        .sync_all()?;
    Ok(bytes)
}

/// SHA-256 of a local file as lowercase hex.
///
/// Informational only: `ensure_downloaded` trusts presence, not content.
pub fn artifact_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
