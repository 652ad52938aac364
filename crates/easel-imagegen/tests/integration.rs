//! Image provider integration tests against real API calls.
//!
//! Skipped when the provider's API key env var is not set.
//! Run with: `cargo test -p easel-imagegen --test integration`

use std::sync::Arc;

use easel_core::store::{ContentStore, FileStore};
use easel_imagegen::replicate::Replicate;
use easel_imagegen::{AspectRatio, GenerationRequest, JobRunner, ProviderRegistry};

fn replicate_key() -> Option<String> {
    std::env::var("REPLICATE_API_TOKEN")
        .ok()
        .filter(|k| !k.is_empty())
}

#[tokio::test]
async fn test_replicate_generation_is_stored() {
    let Some(api_key) = replicate_key() else {
        eprintln!("Skipping: REPLICATE_API_TOKEN not set");
        return;
    };

    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ContentStore> = Arc::new(FileStore::new(dir.path().to_path_buf()));
    let mut registry = ProviderRegistry::new();
    registry.register("replicate", Arc::new(Replicate::new(api_key, None)));
    let runner = JobRunner::new(registry, store.clone());

    let file = runner
        .submit(
            "replicate",
            &GenerationRequest {
                prompt: "a small red square on white".into(),
                model: "black-forest-labs/flux-schnell".into(),
                aspect_ratio: AspectRatio::Square,
                input_image: None,
            },
        )
        .await
        .unwrap();

    assert!(file.filename.starts_with("im_"));
    assert!(file.width > 0 && file.height > 0);
    assert!(!store.read(&file.filename).await.unwrap().is_empty());
}
