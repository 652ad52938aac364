//! Image generation tool.
//!
//! Runs a generation job through the configured provider, places the result
//! on the session's canvas, and reports back to the model with a short
//! markdown string. Provider failures are also pushed to the chat client as an
//! `error` event so the user sees them while the model decides what to do.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use easel_canvas::CanvasSynthesizer;
use easel_canvas::element::file_url;
use easel_core::{ClientEvent, EaselError};
use easel_imagegen::fetch::data_uri;
use easel_imagegen::{
    AspectRatio, GeneratedFile, GenerationRequest, InputImage, InputImageEncoding, JobRunner,
};

use crate::{Tool, ToolContext, ToolOutput};

pub struct GenerateImageTool {
    runner: Arc<JobRunner>,
    canvas: CanvasSynthesizer,
}

#[derive(Debug, Deserialize)]
struct GenerateImageInput {
    prompt: String,
    aspect_ratio: String,
    #[serde(default)]
    input_image: Option<String>,
}

/// Text returned to the model after a successful generation.
pub fn success_message(filename: &str) -> String {
    format!(
        "Image generated successfully! ![{filename}]({})",
        file_url(filename)
    )
}

impl GenerateImageTool {
    pub fn new(runner: Arc<JobRunner>, canvas: CanvasSynthesizer) -> Self {
        Self { runner, canvas }
    }

    /// Load a stored reference image and encode it the way `provider` wants.
    async fn reference_image(
        &self,
        provider: &str,
        file_id: &str,
    ) -> easel_imagegen::Result<InputImage> {
        let store = self.runner.store();
        Ok(match self.runner.input_image_encoding(provider)? {
            InputImageEncoding::FilePath => InputImage::Path(store.path(file_id)?),
            InputImageEncoding::DataUri => {
                let bytes = store.read(file_id).await?;
                InputImage::DataUri(data_uri(file_id, &bytes))
            }
        })
    }

    async fn generate(
        &self,
        provider: &str,
        model: &str,
        input: &GenerateImageInput,
    ) -> easel_imagegen::Result<GeneratedFile> {
        let aspect_ratio: AspectRatio = input.aspect_ratio.parse()?;
        let input_image = match input.input_image.as_deref().filter(|id| !id.is_empty()) {
            Some(file_id) => Some(self.reference_image(provider, file_id).await?),
            None => None,
        };
        let request = GenerationRequest {
            prompt: input.prompt.clone(),
            model: model.to_string(),
            aspect_ratio,
            input_image,
        };
        self.runner.submit(provider, &request).await
    }

    /// Merge into the canvas and notify viewers. Failures are logged only.
    async fn place_on_canvas(&self, context: &ToolContext, canvas_id: &str, file: &GeneratedFile) {
        let placed = self
            .canvas
            .place_image(
                canvas_id,
                &file.filename,
                &file.mime_type,
                file.width,
                file.height,
            )
            .await;
        match placed {
            Ok(Some(event)) => {
                context
                    .notifier
                    .broadcast_canvas(&context.session_id, event)
                    .await;
                info!(canvas_id, filename = %file.filename, "Image added to canvas");
            }
            Ok(None) => {}
            Err(e) => warn!(canvas_id, error = %e, "Canvas integration failed"),
        }
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate an image using text prompt or optionally pass an image for reference or for editing"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Required. The prompt for image generation. If you want to edit an image, describe the edit in the prompt."
                },
                "aspect_ratio": {
                    "type": "string",
                    "enum": AspectRatio::ALL.map(|r| r.as_str()),
                    "description": "Required. Aspect ratio of the image. Choose the best fit for the prompt; posters work best at 3:4."
                },
                "input_image": {
                    "type": "string",
                    "description": "Optional. File id of a reference image, e.g. 'im_jurheut7.png'. Use for edits, style transfer, or keeping a character consistent."
                }
            },
            "required": ["prompt", "aspect_ratio"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        let input: GenerateImageInput = serde_json::from_value(params)?;

        let Some(selection) = context.image_model.as_ref() else {
            let err = EaselError::Config("image model is not selected".into());
            warn!(session_id = %context.session_id, "Image generation without a selected model");
            context
                .notifier
                .send_to_session(&context.session_id, ClientEvent::error(err.to_string()))
                .await;
            return Err(err.into());
        };

        info!(
            session_id = %context.session_id,
            tool_call_id = %context.tool_call_id,
            provider = %selection.provider,
            model = %selection.model,
            "Generating image"
        );

        match self
            .generate(&selection.provider, &selection.model, &input)
            .await
        {
            Ok(file) => {
                if let Some(canvas_id) = context.canvas_id.as_deref().filter(|c| !c.is_empty()) {
                    self.place_on_canvas(context, canvas_id, &file).await;
                }
                Ok(ToolOutput::ok(success_message(&file.filename)))
            }
            Err(e) => {
                warn!(session_id = %context.session_id, error = %e, "Image generation failed");
                context
                    .notifier
                    .send_to_session(&context.session_id, ClientEvent::error(e.to_string()))
                    .await;
                Ok(ToolOutput::error(format!("image generation failed: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    use easel_canvas::CanvasEvent;
    use easel_core::config::ImageModelSelection;
    use easel_core::store::{ContentStore, FileStore, PersistenceGateway};
    use easel_imagegen::{
        ImageGenError, ImageGenerator, PollOutcome, ProviderOutput, ProviderRegistry, Submission,
    };

    use crate::{ChannelNotifier, Notification};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::RgbaImage::new(width, height)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    /// Completes immediately, or fails with `error`. Records requests.
    struct FakeGenerator {
        encoding: InputImageEncoding,
        error: Option<String>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl ImageGenerator for FakeGenerator {
        fn id(&self) -> &str {
            "fake"
        }

        fn input_image_encoding(&self) -> InputImageEncoding {
            self.encoding
        }

        async fn submit(&self, request: &GenerationRequest) -> easel_imagegen::Result<Submission> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.error {
                Some(msg) => Err(ImageGenError::Provider(msg.clone())),
                None => Ok(Submission::Completed(ProviderOutput::Url("https://cdn/x".into()))),
            }
        }

        async fn poll(&self, _: &str) -> easel_imagegen::Result<PollOutcome> {
            Ok(PollOutcome::Pending)
        }

        async fn fetch(&self, _: &ProviderOutput) -> easel_imagegen::Result<Vec<u8>> {
            Ok(png(300, 200))
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<FileStore>,
        generator: Arc<FakeGenerator>,
        tool: GenerateImageTool,
    }

    fn harness(encoding: InputImageEncoding, error: Option<&str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().to_path_buf()));
        let generator = Arc::new(FakeGenerator {
            encoding,
            error: error.map(String::from),
            seen: Mutex::new(Vec::new()),
        });
        let mut registry = ProviderRegistry::new();
        registry.register("fake", generator.clone());
        let runner = Arc::new(JobRunner::new(registry, store.clone()));
        let tool = GenerateImageTool::new(runner, CanvasSynthesizer::new(store.clone()));
        Harness {
            _dir: dir,
            store,
            generator,
            tool,
        }
    }

    fn ctx(
        canvas_id: Option<&str>,
        image_model: Option<ImageModelSelection>,
    ) -> (ToolContext, tokio::sync::mpsc::UnboundedReceiver<Notification>) {
        let (notifier, rx) = ChannelNotifier::new();
        let ctx = ToolContext {
            session_id: "s1".into(),
            canvas_id: canvas_id.map(String::from),
            tool_call_id: "call_1".into(),
            image_model,
            notifier: Arc::new(notifier),
        };
        (ctx, rx)
    }

    fn fake_model() -> Option<ImageModelSelection> {
        Some(ImageModelSelection {
            provider: "fake".into(),
            model: "fake/model".into(),
        })
    }

    #[tokio::test]
    async fn test_red_dragon_lands_on_canvas() {
        let h = harness(InputImageEncoding::DataUri, None);
        h.store
            .save_canvas_data("c1", r#"{"elements":[],"appState":{}}"#)
            .await
            .unwrap();
        let (ctx, mut rx) = ctx(Some("c1"), fake_model());

        let out = h
            .tool
            .execute(
                json!({"prompt": "generate a red dragon", "aspect_ratio": "1:1"}),
                &ctx,
            )
            .await
            .unwrap();

        assert!(!out.is_error);
        assert!(out.content.starts_with("Image generated successfully! ![im_"));

        let Notification::Canvas { event, .. } = rx.recv().await.unwrap() else {
            panic!("expected canvas notification");
        };
        let CanvasEvent::ImageGenerated { canvas_id, element, file } = event;
        assert_eq!(canvas_id, "c1");
        assert_eq!((element.x, element.y, element.width), (0.0, 0.0, 300.0));
        assert!(out.content.contains(&file.data_url));
        assert!(h.store.read(&file.id).await.is_ok());

        let saved = h.store.get_canvas_data("c1").await.unwrap().unwrap();
        assert_eq!(saved["elements"][0]["fileId"], file.id.as_str());
    }

    #[tokio::test]
    async fn test_missing_image_model_is_config_error() {
        let h = harness(InputImageEncoding::DataUri, None);
        let (ctx, mut rx) = ctx(None, None);
        let err = h
            .tool
            .execute(json!({"prompt": "x", "aspect_ratio": "1:1"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EaselError>(),
            Some(EaselError::Config(_))
        ));
        assert!(h.generator.seen.lock().unwrap().is_empty());
        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::Session {
                session_id: "s1".into(),
                event: ClientEvent::error(err.to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_provider_error_is_reported_twice() {
        let h = harness(InputImageEncoding::DataUri, Some("quota exceeded"));
        let (ctx, mut rx) = ctx(Some("c1"), fake_model());

        let out = h
            .tool
            .execute(json!({"prompt": "x", "aspect_ratio": "16:9"}), &ctx)
            .await
            .unwrap();

        assert!(out.is_error);
        assert_eq!(out.content, "image generation failed: quota exceeded");
        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::Session {
                session_id: "s1".into(),
                event: ClientEvent::error("quota exceeded"),
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_as_string() {
        let h = harness(InputImageEncoding::DataUri, None);
        let (ctx, mut rx) = ctx(
            None,
            Some(ImageModelSelection {
                provider: "comfyui".into(),
                model: "sdxl".into(),
            }),
        );
        let out = h
            .tool
            .execute(json!({"prompt": "x", "aspect_ratio": "1:1"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.content.contains("comfyui"));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Notification::Session { event: ClientEvent::Error { error }, .. } if error.contains("comfyui")
        ));
    }

    #[tokio::test]
    async fn test_reference_image_as_data_uri() {
        let h = harness(InputImageEncoding::DataUri, None);
        h.store.write("im_ref00001.jpg", b"jpegbytes").await.unwrap();
        let (ctx, _rx) = ctx(None, fake_model());

        h.tool
            .execute(
                json!({"prompt": "make it blue", "aspect_ratio": "3:4", "input_image": "im_ref00001.jpg"}),
                &ctx,
            )
            .await
            .unwrap();

        let seen = h.generator.seen.lock().unwrap();
        let Some(InputImage::DataUri(uri)) = &seen[0].input_image else {
            panic!("expected data uri");
        };
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        assert_eq!(seen[0].aspect_ratio, AspectRatio::Portrait);
    }

    #[tokio::test]
    async fn test_reference_image_as_path() {
        let h = harness(InputImageEncoding::FilePath, None);
        h.store.write("im_ref00002.png", &png(4, 4)).await.unwrap();
        let (ctx, _rx) = ctx(None, fake_model());

        h.tool
            .execute(
                json!({"prompt": "edit", "aspect_ratio": "1:1", "input_image": "im_ref00002.png"}),
                &ctx,
            )
            .await
            .unwrap();

        let seen = h.generator.seen.lock().unwrap();
        assert_eq!(
            seen[0].input_image,
            Some(InputImage::Path(ContentStore::path(h.store.as_ref(), "im_ref00002.png").unwrap()))
        );
    }

    #[tokio::test]
    async fn test_canvas_failure_does_not_fail_tool() {
        let h = harness(InputImageEncoding::DataUri, None);
        // Not an object: merge fails.
        h.store.save_canvas_data("broken", "[1,2,3]").await.unwrap();
        let (ctx, mut rx) = ctx(Some("broken"), fake_model());

        let out = h
            .tool
            .execute(json!({"prompt": "x", "aspect_ratio": "1:1"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error);
        drop(ctx);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_schema_lists_ratios() {
        let h = harness(InputImageEncoding::DataUri, None);
        let schema = h.tool.parameters_schema();
        assert_eq!(schema["properties"]["aspect_ratio"]["enum"].as_array().unwrap().len(), 5);
    }
}
