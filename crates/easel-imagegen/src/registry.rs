//! Provider key → backend lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use easel_core::config::Config;

use crate::openai::OpenAiImages;
use crate::replicate::Replicate;
use crate::wavespeed::WaveSpeed;
use crate::{ImageGenError, ImageGenerator, Result};

/// Explicit mapping from provider key to backend. Built once and passed to the
/// job runner; there is no global registry.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ImageGenerator>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register backends for every `image.providers` entry that has a key.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        let Some(image) = &config.image else {
            return registry;
        };

        for entry in &image.providers {
            let Some(api_key) = entry.resolve_api_key() else {
                warn!(provider = %entry.id, "Image provider has no API key, skipping");
                continue;
            };
            let base_url = entry.base_url.as_deref();
            let backend: Arc<dyn ImageGenerator> = match entry.id.as_str() {
                "replicate" => Arc::new(Replicate::new(api_key, base_url)),
                "wavespeed" => Arc::new(WaveSpeed::new(api_key, base_url)),
                "openai" => Arc::new(OpenAiImages::new(api_key, base_url)),
                other => {
                    warn!(provider = other, "Unknown image provider, skipping");
                    continue;
                }
            };
            registry.register(entry.id.clone(), backend);
        }
        registry
    }

    pub fn register(&mut self, key: impl Into<String>, generator: Arc<dyn ImageGenerator>) {
        let key = key.into();
        debug!(provider = %key, "Registered image provider");
        self.providers.insert(key, generator);
    }

    /// Look up a backend. Unknown keys are configuration errors.
    pub fn get(&self, key: &str) -> Result<Arc<dyn ImageGenerator>> {
        self.providers.get(key).cloned().ok_or_else(|| {
            ImageGenError::Config(format!("image provider '{key}' is not configured"))
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.providers.keys().cloned().collect();
        keys.sort();
        keys
    }
}
