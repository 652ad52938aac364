//! Image generation backends.
//!
//! Each backend implements [`ImageGenerator`]: `submit` a request, `poll` a
//! status endpoint while the provider works, and `fetch` the finished output.
//! [`JobRunner`] drives one request through that cycle and stores the result
//! in the content store.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod fetch;
pub mod job;
pub mod openai;
pub mod registry;
pub mod replicate;
pub mod wavespeed;

pub use error::{ImageGenError, Result};
pub use job::{GenerationJob, JobRunner, JobStatus, PollPolicy};
pub use registry::ProviderRegistry;

/// Aspect ratios accepted by the generation tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "9:16")]
    Tall,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Wide,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Tall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Wide => "16:9",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Tall => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = ImageGenError;

    fn from_str(s: &str) -> Result<Self> {
        AspectRatio::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| {
                ImageGenError::Provider(format!(
                    "unsupported aspect ratio '{s}', expected one of 1:1, 16:9, 4:3, 3:4, 9:16"
                ))
            })
    }
}

/// How a backend wants reference images handed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputImageEncoding {
    /// Path on the local filesystem; the backend uploads the file itself.
    FilePath,
    /// `data:<mime>;base64,<bytes>` inline in the request body.
    DataUri,
}

/// A reference image, already encoded for the target backend.
#[derive(Debug, Clone, PartialEq)]
pub enum InputImage {
    Path(PathBuf),
    DataUri(String),
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub aspect_ratio: AspectRatio,
    pub input_image: Option<InputImage>,
}

/// A stored generation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// File id in the content store, e.g. `im_1a2b3c4d.png`.
    pub filename: String,
}

/// Where a finished generation's bytes live.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutput {
    Url(String),
    Bytes(Vec<u8>),
}

impl ProviderOutput {
    /// Read an `output` field that is either a URL or a list of URLs (first
    /// wins). `detail` is the provider's explanation when output is missing.
    pub fn from_value(output: Option<&serde_json::Value>, detail: Option<&str>) -> Result<Self> {
        let url = match output {
            Some(serde_json::Value::String(url)) => Some(url.as_str()),
            Some(serde_json::Value::Array(urls)) => urls.first().and_then(|u| u.as_str()),
            _ => None,
        };
        match (url.filter(|u| !u.is_empty()), detail.filter(|d| !d.is_empty())) {
            (Some(url), _) => Ok(ProviderOutput::Url(url.to_string())),
            (None, Some(detail)) => Err(ImageGenError::Provider(format!(
                "image generation failed: {detail}"
            ))),
            (None, None) => Err(ImageGenError::Provider(
                "image generation failed: no output url found".into(),
            )),
        }
    }
}

/// Result of submitting a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The provider finished within the submit call.
    Completed(ProviderOutput),
    /// Accepted; poll `status_url` for the outcome.
    Pending { status_url: String },
}

/// Result of one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded(ProviderOutput),
    Failed(String),
    Pending,
}

/// One image-generation backend.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Registry key (e.g., "replicate").
    fn id(&self) -> &str;

    fn input_image_encoding(&self) -> InputImageEncoding {
        InputImageEncoding::DataUri
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission>;

    async fn poll(&self, status_url: &str) -> Result<PollOutcome>;

    /// Download the finished output.
    async fn fetch(&self, output: &ProviderOutput) -> Result<Vec<u8>>;
}
