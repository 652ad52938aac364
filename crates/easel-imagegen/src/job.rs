//! Generation job lifecycle: submit, poll until terminal, fetch, store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use easel_core::config::{Config, PollConfig};
use easel_core::store::ContentStore;

use crate::registry::ProviderRegistry;
use crate::{
    GeneratedFile, GenerationRequest, ImageGenError, ImageGenerator, InputImageEncoding,
    PollOutcome, ProviderOutput, Result, Submission, fetch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

/// Fixed-interval, bounded polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollConfig::default().into()
    }
}

impl From<PollConfig> for PollPolicy {
    fn from(config: PollConfig) -> Self {
        Self {
            interval: config.interval(),
            max_attempts: config.max_attempts,
        }
    }
}

/// One generation request tracked through its states.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub provider: String,
    pub prompt: String,
    pub aspect_ratio: crate::AspectRatio,
    pub has_input_image: bool,
    status: JobStatus,
    attempts: u32,
}

impl GenerationJob {
    pub fn new(provider: impl Into<String>, request: &GenerationRequest) -> Self {
        Self {
            provider: provider.into(),
            prompt: request.prompt.clone(),
            aspect_ratio: request.aspect_ratio,
            has_input_image: request.input_image.is_some(),
            status: JobStatus::Submitted,
            attempts: 0,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Status checks made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn transition(&mut self, to: JobStatus) {
        debug!(provider = %self.provider, from = ?self.status, to = ?to, "Job transition");
        self.status = to;
    }

    fn fail(&mut self, err: ImageGenError) -> ImageGenError {
        self.transition(JobStatus::Failed);
        err
    }

    /// Submit, then poll at `policy.interval` until the provider reports a
    /// terminal status or `policy.max_attempts` checks have been made.
    ///
    /// Dropping the returned future stops polling.
    pub async fn drive(
        &mut self,
        generator: &dyn ImageGenerator,
        request: &GenerationRequest,
        policy: PollPolicy,
    ) -> Result<ProviderOutput> {
        let status_url = match generator.submit(request).await {
            Ok(Submission::Completed(output)) => {
                self.transition(JobStatus::Succeeded);
                return Ok(output);
            }
            Ok(Submission::Pending { status_url }) => status_url,
            Err(e) => return Err(self.fail(e)),
        };

        self.transition(JobStatus::Running);
        while self.attempts < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
            self.attempts += 1;
            match generator.poll(&status_url).await {
                Ok(PollOutcome::Succeeded(output)) => {
                    self.transition(JobStatus::Succeeded);
                    return Ok(output);
                }
                Ok(PollOutcome::Failed(message)) => {
                    return Err(self.fail(ImageGenError::Provider(message)));
                }
                Ok(PollOutcome::Pending) => {
                    debug!(provider = %self.provider, attempt = self.attempts, "Still running");
                }
                Err(e) => return Err(self.fail(e)),
            }
        }

        self.transition(JobStatus::TimedOut);
        warn!(provider = %self.provider, attempts = self.attempts, "Generation timed out");
        Err(ImageGenError::TimedOut {
            attempts: self.attempts,
        })
    }
}

/// Runs generation requests against registered providers and stores results.
pub struct JobRunner {
    registry: ProviderRegistry,
    store: Arc<dyn ContentStore>,
    default_policy: PollPolicy,
    policies: HashMap<String, PollPolicy>,
}

impl JobRunner {
    pub fn new(registry: ProviderRegistry, store: Arc<dyn ContentStore>) -> Self {
        Self {
            registry,
            store,
            default_policy: PollPolicy::default(),
            policies: HashMap::new(),
        }
    }

    /// Build a runner with every configured provider and its poll policy.
    pub fn from_config(config: &Config, store: Arc<dyn ContentStore>) -> Self {
        let registry = ProviderRegistry::from_config(config);
        let mut runner = Self::new(registry, store);
        if let Some(global) = config.image.as_ref().and_then(|i| i.poll) {
            runner.default_policy = global.into();
        }
        for key in runner.registry.keys() {
            let policy = config.poll_policy(&key).into();
            runner.policies.insert(key, policy);
        }
        runner
    }

    pub fn with_default_policy(mut self, policy: PollPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_poll_policy(mut self, provider: impl Into<String>, policy: PollPolicy) -> Self {
        self.policies.insert(provider.into(), policy);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn poll_policy(&self, provider: &str) -> PollPolicy {
        self.policies
            .get(provider)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// How the given provider wants reference images encoded.
    pub fn input_image_encoding(&self, provider: &str) -> Result<InputImageEncoding> {
        Ok(self.registry.get(provider)?.input_image_encoding())
    }

    /// Generate one image and store it. Returns the stored file's descriptor.
    pub async fn submit(
        &self,
        provider: &str,
        request: &GenerationRequest,
    ) -> Result<GeneratedFile> {
        let generator = self.registry.get(provider)?;
        let mut job = GenerationJob::new(provider, request);
        info!(
            provider,
            model = %request.model,
            aspect_ratio = %request.aspect_ratio,
            has_input_image = job.has_input_image,
            "Submitting image generation"
        );

        let output = job
            .drive(generator.as_ref(), request, self.poll_policy(provider))
            .await?;
        let bytes = generator.fetch(&output).await?;
        let file = fetch::persist(self.store.as_ref(), &bytes).await?;

        info!(provider, filename = %file.filename, attempts = job.attempts(), "Image generated");
        Ok(file)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::AspectRatio;
    use crate::fetch::tests::png;

    /// Reports `running` for `pending_polls` checks, then `final_outcome`.
    pub(crate) struct ScriptedGenerator {
        pub submission: Submission,
        pub pending_polls: u32,
        pub final_outcome: PollOutcome,
        pub polls: AtomicU32,
        pub seen: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        pub(crate) fn immediate(url: &str) -> Self {
            Self::polling(0, PollOutcome::Pending, Submission::Completed(ProviderOutput::Url(url.into())))
        }

        pub(crate) fn polling(pending_polls: u32, final_outcome: PollOutcome, submission: Submission) -> Self {
            Self {
                submission,
                pending_polls,
                final_outcome,
                polls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageGenerator for ScriptedGenerator {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn submit(&self, request: &GenerationRequest) -> Result<Submission> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.submission.clone())
        }

        async fn poll(&self, _status_url: &str) -> Result<PollOutcome> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.pending_polls {
                Ok(PollOutcome::Pending)
            } else {
                Ok(self.final_outcome.clone())
            }
        }

        async fn fetch(&self, _output: &ProviderOutput) -> Result<Vec<u8>> {
            Ok(png(40, 30))
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "generate a red dragon".into(),
            model: "black-forest-labs/flux-schnell".into(),
            aspect_ratio: AspectRatio::Square,
            input_image: None,
        }
    }

    fn pending() -> Submission {
        Submission::Pending {
            status_url: "https://api.example/predictions/1".into(),
        }
    }

    fn succeeded() -> PollOutcome {
        PollOutcome::Succeeded(ProviderOutput::Url("https://cdn/out.png".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_skips_polling() {
        let generator = ScriptedGenerator::immediate("https://cdn/out.png");
        let mut job = GenerationJob::new("scripted", &request());
        let output = job
            .drive(&generator, &request(), PollPolicy::default())
            .await
            .unwrap();
        assert_eq!(output, ProviderOutput::Url("https://cdn/out.png".into()));
        assert_eq!(job.status(), JobStatus::Succeeded);
        assert_eq!(generator.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_last_attempt() {
        let generator = ScriptedGenerator::polling(59, succeeded(), pending());
        let mut job = GenerationJob::new("scripted", &request());
        let started = tokio::time::Instant::now();

        let output = job.drive(&generator, &request(), PollPolicy::default()).await;

        assert!(output.is_ok());
        assert_eq!(job.status(), JobStatus::Succeeded);
        assert_eq!(job.attempts(), 60);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixty_running_times_out() {
        let generator = ScriptedGenerator::polling(60, succeeded(), pending());
        let mut job = GenerationJob::new("scripted", &request());

        let err = job
            .drive(&generator, &request(), PollPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ImageGenError::TimedOut { attempts: 60 }));
        assert_eq!(job.status(), JobStatus::TimedOut);
        assert_eq!(generator.polls.load(Ordering::SeqCst), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_carries_message() {
        let generator =
            ScriptedGenerator::polling(2, PollOutcome::Failed("NSFW content".into()), pending());
        let mut job = GenerationJob::new("scripted", &request());

        let err = job
            .drive(&generator, &request(), PollPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "NSFW content");
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy_bounds_attempts() {
        let generator = ScriptedGenerator::polling(10, succeeded(), pending());
        let mut job = GenerationJob::new("scripted", &request());
        let policy = PollPolicy {
            interval: Duration::from_millis(250),
            max_attempts: 4,
        };

        let err = job.drive(&generator, &request(), policy).await.unwrap_err();
        assert!(matches!(err, ImageGenError::TimedOut { attempts: 4 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_stores_output() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ContentStore> =
            Arc::new(easel_core::store::FileStore::new(dir.path().to_path_buf()));
        let mut registry = ProviderRegistry::new();
        registry.register("scripted", Arc::new(ScriptedGenerator::immediate("https://cdn/x.png")));
        let runner = JobRunner::new(registry, store.clone());

        let file = runner.submit("scripted", &request()).await.unwrap();
        assert_eq!(file.mime_type, "image/png");
        assert_eq!((file.width, file.height), (40, 30));
        assert!(store.read(&file.filename).await.is_ok());
    }

    #[tokio::test]
    async fn test_runner_unknown_provider_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ContentStore> =
            Arc::new(easel_core::store::FileStore::new(dir.path().to_path_buf()));
        let runner = JobRunner::new(ProviderRegistry::new(), store);
        let err = runner.submit("comfyui", &request()).await.unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_per_provider_policy_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ContentStore> =
            Arc::new(easel_core::store::FileStore::new(dir.path().to_path_buf()));
        let fast = PollPolicy {
            interval: Duration::from_millis(100),
            max_attempts: 5,
        };
        let runner = JobRunner::new(ProviderRegistry::new(), store).with_poll_policy("wavespeed", fast);
        assert_eq!(runner.poll_policy("wavespeed"), fast);
        assert_eq!(runner.poll_policy("replicate"), PollPolicy::default());
    }
}
