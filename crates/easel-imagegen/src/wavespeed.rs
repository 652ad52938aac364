//! WaveSpeedAI task API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    GenerationRequest, ImageGenError, ImageGenerator, InputImage, PollOutcome, ProviderOutput,
    Result, Submission, fetch,
};

const WAVESPEED_BASE_URL: &str = "https://api.wavespeed.ai/api/v3";

pub struct WaveSpeed {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

/// Every response wraps the task in `data`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Task>,
}

#[derive(Debug, Default, Deserialize)]
struct Task {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    outputs: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    urls: Option<TaskUrls>,
}

#[derive(Debug, Default, Deserialize)]
struct TaskUrls {
    #[serde(default)]
    get: Option<String>,
}

impl Envelope {
    fn into_task(self) -> Result<Task> {
        self.data.ok_or_else(|| {
            ImageGenError::Provider(format!(
                "WaveSpeed response missing task data: {}",
                self.message.unwrap_or_default()
            ))
        })
    }
}

impl Task {
    fn outcome(&self) -> Result<PollOutcome> {
        match self.status.as_deref() {
            Some("completed") => Ok(PollOutcome::Succeeded(ProviderOutput::from_value(
                self.outputs.as_ref(),
                self.error.as_deref(),
            )?)),
            Some("failed") => Ok(PollOutcome::Failed(format!(
                "WaveSpeed generation failed: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            ))),
            _ => Ok(PollOutcome::Pending),
        }
    }
}

impl WaveSpeed {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or(WAVESPEED_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn build_body(request: &GenerationRequest) -> serde_json::Value {
        let mut body = json!({
            "prompt": request.prompt,
            "aspect_ratio": request.aspect_ratio.as_str(),
            "enable_base64_output": false,
            "enable_sync_mode": false,
        });
        if let Some(image) = &request.input_image {
            body["image"] = json!(match image {
                InputImage::DataUri(uri) => uri.clone(),
                InputImage::Path(path) => path.display().to_string(),
            });
        }
        body
    }

    fn interpret_submit(task: Task) -> Result<Submission> {
        match task.outcome()? {
            PollOutcome::Succeeded(output) => Ok(Submission::Completed(output)),
            PollOutcome::Failed(message) => Err(ImageGenError::Provider(message)),
            PollOutcome::Pending => {
                let status_url = task.urls.and_then(|u| u.get).ok_or_else(|| {
                    ImageGenError::Provider("WaveSpeed task started but no get URL provided".into())
                })?;
                Ok(Submission::Pending { status_url })
            }
        }
    }

    async fn read_task(response: reqwest::Response, what: &str) -> Result<Task> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageGenError::Provider(format!(
                "WaveSpeed {what} error {status}: {body}"
            )));
        }
        response.json::<Envelope>().await?.into_task()
    }
}

#[async_trait]
impl ImageGenerator for WaveSpeed {
    fn id(&self) -> &str {
        "wavespeed"
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission> {
        debug!(model = %request.model, "Submitting WaveSpeed task");
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, request.model))
            .bearer_auth(&self.api_key)
            .json(&Self::build_body(request))
            .send()
            .await?;
        Self::interpret_submit(Self::read_task(response, "API").await?)
    }

    async fn poll(&self, status_url: &str) -> Result<PollOutcome> {
        let response = self
            .client
            .get(status_url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::read_task(response, "status").await?.outcome()
    }

    async fn fetch(&self, output: &ProviderOutput) -> Result<Vec<u8>> {
        fetch::download(&self.client, output).await
    }
}
