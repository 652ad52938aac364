//! OpenAI Images API (`images/generations`, `images/edits`).
//!
//! Synchronous: every request finishes inside `submit`. Reference images are
//! uploaded from disk as multipart, so this backend asks for file paths.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    AspectRatio, GenerationRequest, ImageGenError, ImageGenerator, InputImage,
    InputImageEncoding, PollOutcome, ProviderOutput, Result, Submission, fetch,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiImages {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Closest supported size for an aspect ratio.
pub fn size_for(ratio: AspectRatio) -> &'static str {
    match ratio {
        AspectRatio::Square => "1024x1024",
        AspectRatio::Wide | AspectRatio::Landscape => "1536x1024",
        AspectRatio::Portrait | AspectRatio::Tall => "1024x1536",
    }
}

fn parse_output(response: ImagesResponse) -> Result<ProviderOutput> {
    let datum = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ImageGenError::Provider("OpenAI returned no images".into()))?;
    match (datum.b64_json, datum.url) {
        (Some(b64), _) => Ok(ProviderOutput::Bytes(fetch::decode_base64(&b64)?)),
        (None, Some(url)) => Ok(ProviderOutput::Url(url)),
        (None, None) => Err(ImageGenError::Provider(
            "OpenAI image response has neither b64_json nor url".into(),
        )),
    }
}

impl OpenAiImages {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<reqwest::Response> {
        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "n": 1,
            "size": size_for(request.aspect_ratio),
        });
        // gpt-image models always return base64 and reject response_format.
        if request.model.starts_with("dall-e") {
            body["response_format"] = json!("b64_json");
        }
        Ok(self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?)
    }

    async fn edit(&self, request: &GenerationRequest, image: &InputImage) -> Result<reqwest::Response> {
        let InputImage::Path(path) = image else {
            return Err(ImageGenError::Config(
                "OpenAI image edits need the reference image as a file path".into(),
            ));
        };
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".into());
        let mime = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("image/png");
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new()
            .text("model", request.model.clone())
            .text("prompt", request.prompt.clone())
            .text("size", size_for(request.aspect_ratio))
            .part("image", part);

        Ok(self
            .client
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
    fn id(&self) -> &str {
        "openai"
    }

    fn input_image_encoding(&self) -> InputImageEncoding {
        InputImageEncoding::FilePath
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission> {
        debug!(model = %request.model, edit = request.input_image.is_some(), "Calling OpenAI Images");
        let response = match &request.input_image {
            Some(image) => self.edit(request, image).await?,
            None => self.generate(request).await?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageGenError::Provider(format!(
                "OpenAI Images error {status}: {body}"
            )));
        }
        Ok(Submission::Completed(parse_output(response.json().await?)?))
    }

    async fn poll(&self, _status_url: &str) -> Result<PollOutcome> {
        Err(ImageGenError::Provider(
            "OpenAI Images is synchronous and has no status endpoint".into(),
        ))
    }

    async fn fetch(&self, output: &ProviderOutput) -> Result<Vec<u8>> {
        fetch::download(&self.client, output).await
    }
}
