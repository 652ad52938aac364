//! Replicate predictions API.
//!
//! Submits with `Prefer: wait`, so fast models finish inside the submit call
//! (200). Slower ones come back 201 with a `urls.get` status endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    GenerationRequest, ImageGenError, ImageGenerator, InputImage, PollOutcome, ProviderOutput,
    Result, Submission, fetch,
};

const REPLICATE_BASE_URL: &str = "https://api.replicate.com/v1";

/// Model used whenever a reference image is supplied.
pub const EDIT_MODEL: &str = "black-forest-labs/flux-kontext-pro";

pub struct Replicate {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
struct Prediction {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Default, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

impl Prediction {
    fn error_text(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Null) | None => "Unknown error".into(),
            Some(other) => other.to_string(),
        }
    }

    fn outcome(&self) -> Result<PollOutcome> {
        match self.status.as_deref() {
            Some("succeeded") => Ok(PollOutcome::Succeeded(ProviderOutput::from_value(
                self.output.as_ref(),
                self.detail.as_deref(),
            )?)),
            Some("failed") | Some("canceled") => Ok(PollOutcome::Failed(format!(
                "Replicate generation failed: {}",
                self.error_text()
            ))),
            _ => Ok(PollOutcome::Pending),
        }
    }
}

impl Replicate {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or(REPLICATE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Model and request body. A reference image switches to [`EDIT_MODEL`].
    fn build_input(request: &GenerationRequest) -> (&str, serde_json::Value) {
        let mut input = json!({
            "prompt": request.prompt,
            "aspect_ratio": request.aspect_ratio.as_str(),
        });
        let model = match &request.input_image {
            Some(image) => {
                input["input_image"] = json!(match image {
                    InputImage::DataUri(uri) => uri.clone(),
                    InputImage::Path(path) => path.display().to_string(),
                });
                EDIT_MODEL
            }
            None => request.model.as_str(),
        };
        (model, json!({ "input": input }))
    }

    fn interpret_submit(status: reqwest::StatusCode, prediction: Prediction) -> Result<Submission> {
        if status == reqwest::StatusCode::CREATED {
            return match prediction.outcome()? {
                PollOutcome::Succeeded(output) => Ok(Submission::Completed(output)),
                PollOutcome::Failed(message) => Err(ImageGenError::Provider(message)),
                PollOutcome::Pending => {
                    let status_url = prediction.urls.and_then(|u| u.get).ok_or_else(|| {
                        ImageGenError::Provider(
                            "Replicate job started but no get URL provided".into(),
                        )
                    })?;
                    Ok(Submission::Pending { status_url })
                }
            };
        }
        Ok(Submission::Completed(ProviderOutput::from_value(
            prediction.output.as_ref(),
            prediction.detail.as_deref(),
        )?))
    }
}

#[async_trait]
impl ImageGenerator for Replicate {
    fn id(&self) -> &str {
        "replicate"
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission> {
        let (model, body) = Self::build_input(request);
        debug!(model, "Submitting Replicate prediction");

        let response = self
            .client
            .post(format!("{}/models/{model}/predictions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageGenError::Provider(format!(
                "Replicate API error {status}: {body}"
            )));
        }
        Self::interpret_submit(status, response.json().await?)
    }

    async fn poll(&self, status_url: &str) -> Result<PollOutcome> {
        let response = self
            .client
            .get(status_url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageGenError::Provider(format!(
                "Replicate status error {status}: {body}"
            )));
        }
        let prediction: Prediction = response.json().await?;
        prediction.outcome()
    }

    async fn fetch(&self, output: &ProviderOutput) -> Result<Vec<u8>> {
        fetch::download(&self.client, output).await
    }
}
